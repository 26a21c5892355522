//! Sync types shared by the reconciler, scheduler and write-back batcher.

use serde::Serialize;

use crate::store::StoreError;

/// Sync metadata for one successfully written row, queued for write-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBackItem {
    /// 1-based sheet row number.
    pub row: usize,
    pub record_id: String,
    /// ISO8601 timestamp of the successful write.
    pub timestamp: String,
    pub fingerprint: String,
}

/// Terminal state of a row that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// Fingerprint unchanged and a record id is already stored.
    Skipped,
    /// A new record was created.
    Created(WriteBackItem),
    /// The existing record was rewritten.
    Updated(WriteBackItem),
}

impl RowAction {
    /// Write-back payload, if the row touched the target store.
    #[must_use]
    pub fn write_back(&self) -> Option<&WriteBackItem> {
        match self {
            Self::Skipped => None,
            Self::Created(item) | Self::Updated(item) => Some(item),
        }
    }
}

/// Why a single row could not be synced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// The title column is empty; a record cannot be named.
    #[error("title column '{0}' is empty")]
    MissingTitle(String),

    /// The target store rejected the write (after retries, if retryable).
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failed row. Its sync state is left untouched so the next run retries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub title: String,
    pub reason: String,
    #[serde(skip)]
    pub error: RowError,
}

impl RowFailure {
    #[must_use]
    pub fn new(row: usize, title: &str, error: RowError) -> Self {
        Self {
            row,
            title: title.to_string(),
            reason: error.to_string(),
            error,
        }
    }
}

/// Per-row result aggregated by the scheduler.
pub type RowResult = std::result::Result<RowAction, RowFailure>;

/// Counts for one table run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    /// Records created in the target store.
    pub created: usize,
    /// Existing records rewritten.
    pub updated: usize,
    /// Rows already up to date.
    pub skipped: usize,
    /// Rows dropped for this run.
    pub failed: usize,
    /// Batched write-backs issued.
    pub flushes: usize,
    /// Failed rows with reasons.
    pub failures: Vec<RowFailure>,
}

impl RunStats {
    /// Rows that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed
    }

    /// Fold one row result into the counts.
    pub fn record(&mut self, result: &RowResult) {
        match result {
            Ok(RowAction::Skipped) => self.skipped += 1,
            Ok(RowAction::Created(_)) => self.created += 1,
            Ok(RowAction::Updated(_)) => self.updated += 1,
            Err(failure) => {
                self.failed += 1;
                self.failures.push(failure.clone());
            }
        }
    }
}

/// Classification computed without touching the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Skip,
    Create,
    Update,
    /// The row would fail before any write (e.g. empty title).
    Invalid,
}

/// Counts for a status preview.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PlanStats {
    pub to_create: usize,
    pub to_update: usize,
    pub up_to_date: usize,
    pub invalid: usize,
}

impl PlanStats {
    pub fn record(&mut self, plan: Plan) {
        match plan {
            Plan::Skip => self.up_to_date += 1,
            Plan::Create => self.to_create += 1,
            Plan::Update => self.to_update += 1,
            Plan::Invalid => self.invalid += 1,
        }
    }

    /// Rows that a run would write.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.to_create + self.to_update
    }
}

/// Run-level sync errors. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A header required by the configuration is absent.
    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },

    /// A relation names an index that was not declared.
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// A table was requested that the configuration does not declare.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Reading a table failed.
    #[error("Failed to read table '{table}': {source}")]
    SheetRead {
        table: String,
        #[source]
        source: StoreError,
    },

    /// Loading a cross-reference index failed.
    #[error("Failed to load index '{index}': {source}")]
    IndexLoad {
        index: String,
        #[source]
        source: StoreError,
    },

    /// A batched write-back failed; persisted state would be lost.
    #[error("Write-back to '{table}' failed after {written} rows: {source}")]
    WriteBack {
        table: String,
        written: usize,
        #[source]
        source: StoreError,
    },
}

/// Result type for run-level sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn item(row: usize) -> WriteBackItem {
        WriteBackItem {
            row,
            record_id: format!("rec-{row}"),
            timestamp: "2025-01-20T00:00:00.000Z".to_string(),
            fingerprint: "abc".to_string(),
        }
    }

    #[test]
    fn test_run_stats_record() {
        let mut stats = RunStats::default();
        stats.record(&Ok(RowAction::Created(item(2))));
        stats.record(&Ok(RowAction::Updated(item(3))));
        stats.record(&Ok(RowAction::Skipped));
        stats.record(&Ok(RowAction::Skipped));
        stats.record(&Err(RowFailure::new(
            6,
            "",
            RowError::MissingTitle("Nom".into()),
        )));

        assert_eq!(stats.created, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.failures[0].row, 6);
        assert!(stats.failures[0].reason.contains("Nom"));
    }

    #[test]
    fn test_write_back_only_for_writes() {
        assert!(RowAction::Skipped.write_back().is_none());
        assert_eq!(RowAction::Created(item(4)).write_back().unwrap().row, 4);
    }

    #[test]
    fn test_plan_stats() {
        let mut stats = PlanStats::default();
        stats.record(Plan::Create);
        stats.record(Plan::Update);
        stats.record(Plan::Skip);
        stats.record(Plan::Invalid);
        assert_eq!(stats.pending(), 2);
        assert_eq!(stats.up_to_date, 1);
        assert_eq!(stats.invalid, 1);
    }
}
