//! sheetsync - mirror spreadsheet tables into a document store.
//!
//! Each configured sheet table is reconciled row by row against a target
//! collection. Rows whose content fingerprint is unchanged are skipped;
//! the rest are created or updated with bounded concurrency, and the
//! resulting record ids and fingerprints are written back to the sheet in
//! batches.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Config file discovery, schema and validation
//! - [`store`] - Sheet and target store traits plus HTTP and in-memory stores
//! - [`sync`] - Normalization, indexes, fingerprints, reconciliation, write-back
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
