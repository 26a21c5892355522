//! External collaborators of the sync core.
//!
//! The core talks to two services through traits:
//!
//! - [`SheetStore`] - the tabular source of truth (read a table, batch-write cells)
//! - [`TargetStore`] - the document store that mirrors rows as records
//!
//! Concrete implementations:
//!
//! - [`memory`] - in-process stores used by tests and embedders
//! - [`notion`] - HTTP target store speaking the Notion REST API
//! - [`sheets`] - HTTP sheet store speaking the Google Sheets v4 API
//!
//! Cell addresses use 1-based spreadsheet notation (`Table!K12`); see
//! [`column_letter`] and [`cell_range`].

pub mod memory;
pub mod notion;
pub mod sheets;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::sync::payload::{Icon, Properties};

/// Result type for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure reported by a sheet or target-store call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The remote answered with a non-success HTTP status.
    #[error("HTTP {status}{}: {message}", code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Http {
        status: u16,
        /// API-level error code, e.g. `rate_limited`.
        code: Option<String>,
        message: String,
    },

    /// The request never produced a response (connect, timeout, TLS).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A referenced table or record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether the call may succeed if repeated later.
    ///
    /// Only rate limiting and temporary unavailability qualify. Validation,
    /// auth and not-found failures are permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, code, .. } => {
                matches!(status, 429 | 503)
                    || matches!(
                        code.as_deref(),
                        Some("rate_limited" | "service_unavailable")
                    )
            }
            Self::Transport(_) | Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                code: None,
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// ── Sheet side ────────────────────────────────────────────────

/// A whole table as read from the sheet: header row plus data rows.
///
/// Data rows may be shorter than the header when trailing cells are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One cell write in a batched update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellUpdate {
    /// A1 range, e.g. `RefForme!K12`.
    pub range: String,
    pub value: String,
}

/// Tabular source of truth.
pub trait SheetStore: Send + Sync {
    /// Read a table: first row is the header, the rest are data rows.
    fn read(&self, table: &str) -> impl Future<Output = StoreResult<SheetData>> + Send;

    /// Write many single cells in one request.
    fn batch_write(&self, updates: &[CellUpdate]) -> impl Future<Output = StoreResult<()>> + Send;
}

// ── Target side ───────────────────────────────────────────────

/// A record read back from the target store, flattened to plain strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRecord {
    pub id: String,
    pub fields: std::collections::HashMap<String, String>,
}

/// One page of a cursor-driven query.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<TargetRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Document store mirroring sheet rows.
pub trait TargetStore: Send + Sync {
    /// Create a record in a collection, returning its id.
    fn create(
        &self,
        collection_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    /// Replace the given properties of an existing record.
    fn update(
        &self,
        record_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Fetch one page of a collection.
    fn query_page(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> impl Future<Output = StoreResult<RecordPage>> + Send;

    /// Fetch every record of a collection, following the cursor until exhausted.
    fn query_all(
        &self,
        collection_id: &str,
    ) -> impl Future<Output = StoreResult<Vec<TargetRecord>>> + Send {
        async move {
            let mut records = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = self.query_page(collection_id, cursor.as_deref()).await?;
                records.extend(page.records);
                match page.next_cursor {
                    Some(next) if page.has_more => cursor = Some(next),
                    _ => break,
                }
            }
            Ok(records)
        }
    }

    /// Make sure a select / multi-select property accepts every value.
    ///
    /// Stores that create options implicitly keep the default no-op.
    fn ensure_options(
        &self,
        _collection_id: &str,
        _property: &str,
        _values: &[String],
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async { Ok(()) }
    }
}

// ── A1 addressing ─────────────────────────────────────────────

/// Spreadsheet column letters for a zero-based column index.
///
/// `0 → A`, `25 → Z`, `26 → AA`, `51 → AZ`, `702 → AAA`.
#[must_use]
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        // rem < 26, so the cast cannot truncate
        #[allow(clippy::cast_possible_truncation)]
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Zero-based column index for spreadsheet column letters.
#[must_use]
pub fn column_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// Quote a table name for A1 notation when it is not a plain identifier.
fn quote_table(table: &str) -> String {
    if !table.is_empty() && table.chars().all(|c| c.is_alphanumeric() || c == '_') {
        table.to_string()
    } else {
        format!("'{}'", table.replace('\'', "''"))
    }
}

/// A1 range of a single cell: zero-based column, 1-based row.
#[must_use]
pub fn cell_range(table: &str, column: usize, row: usize) -> String {
    format!("{}!{}{}", quote_table(table), column_letter(column), row)
}

/// Split an A1 single-cell range back into `(table, column, row)`.
#[must_use]
pub fn parse_cell_range(range: &str) -> Option<(String, usize, usize)> {
    let (table, cell) = range.rsplit_once('!')?;
    let table = match table.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => table.to_string(),
    };
    let split = cell.find(|c: char| c.is_ascii_digit())?;
    let column = column_index(&cell[..split])?;
    let row = cell[split..].parse().ok()?;
    Some((table, column, row))
}
