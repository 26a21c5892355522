//! Sheet → target-store sync core.
//!
//! Each configured table is mirrored row by row into a target collection:
//!
//! - **Normalize**: raw cells → typed values ([`normalize`])
//! - **Resolve**: business keys → record ids through cross-reference indexes ([`index`])
//! - **Fingerprint**: SHA256 over declared fields for change detection ([`hash`])
//! - **Reconcile**: skip, create or update one row ([`reconcile`])
//! - **Schedule**: bounded concurrency across rows ([`scheduler`])
//! - **Write back**: batched persistence of sync state to the sheet ([`writeback`])
//!
//! # Architecture
//!
//! The sheet is the source of truth. Each table carries three technical
//! columns (record id, last sync timestamp, fingerprint), located by header
//! name. A row whose stored fingerprint matches its fresh one and that already
//! points at a record is skipped; otherwise it is created or updated and its
//! new sync state is queued for write-back.
//!
//! Row failures are isolated: the row keeps its old state and is retried by
//! the next run. Sheet read, index load and write-back failures abort the run.
//!
//! # Example
//!
//! ```ignore
//! use sheetsync::sync::SyncEngine;
//!
//! let engine = SyncEngine::new(&config, &sheets, &target);
//! for report in engine.run(&[]).await? {
//!     println!("{}: {} created", report.table, report.stats.created);
//! }
//! ```

pub mod engine;
pub mod hash;
pub mod index;
pub mod normalize;
pub mod payload;
pub mod reconcile;
pub mod retry;
pub mod row;
pub mod scheduler;
pub mod types;
pub mod writeback;

pub use engine::{SyncEngine, TablePreview, TableReport};
pub use hash::{canonical_json, fingerprint, has_changed, sha256_hex};
pub use index::{CrossReferenceIndex, IndexSet};
pub use normalize::{FieldValue, ImageRef, NormalizedRecord, normalize};
pub use payload::{Icon, Properties, PropertyValue};
pub use reconcile::{PreparedRow, Reconciler};
pub use retry::RetryPolicy;
pub use row::{SheetLayout, SourceRow, SyncState, TechColumnIndexes};
pub use types::{
    Plan, PlanStats, RowAction, RowError, RowFailure, RowResult, RunStats, SyncError, SyncResult,
    WriteBackItem,
};
pub use writeback::WriteBackBatcher;
