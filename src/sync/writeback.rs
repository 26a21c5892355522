//! Batched write-back of sync metadata.
//!
//! Reconciled rows arrive on a channel. Whenever `batch_size` rows are
//! pending, one batch of cell updates is sent; once the channel closes the
//! remainder is drained. Each row contributes three cells: record id,
//! timestamp and fingerprint.

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use crate::store::{CellUpdate, SheetStore, cell_range};
use crate::sync::row::TechColumnIndexes;
use crate::sync::types::{SyncError, SyncResult, WriteBackItem};

/// Why a batch was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// `batch_size` rows were pending.
    Count,
    /// The producer finished; pending rows are drained.
    Drain,
}

/// Cell updates persisting one row's sync state.
#[must_use]
pub fn cell_updates(table: &str, tech: TechColumnIndexes, item: &WriteBackItem) -> [CellUpdate; 3] {
    [
        CellUpdate {
            range: cell_range(table, tech.record_id, item.row),
            value: item.record_id.clone(),
        },
        CellUpdate {
            range: cell_range(table, tech.last_sync, item.row),
            value: item.timestamp.clone(),
        },
        CellUpdate {
            range: cell_range(table, tech.fingerprint, item.row),
            value: item.fingerprint.clone(),
        },
    ]
}

/// Drains write-back items for one table into batched sheet writes.
pub struct WriteBackBatcher<'a, S: SheetStore> {
    sheets: &'a S,
    table: &'a str,
    tech: TechColumnIndexes,
    batch_size: usize,
    pending: Vec<WriteBackItem>,
    written: usize,
    flushes: usize,
}

impl<'a, S: SheetStore> WriteBackBatcher<'a, S> {
    #[must_use]
    pub fn new(sheets: &'a S, table: &'a str, tech: TechColumnIndexes, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sheets,
            table,
            tech,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            written: 0,
            flushes: 0,
        }
    }

    /// Consume the channel until every sender is dropped.
    ///
    /// Returns the number of batches sent.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::WriteBack` on the first failed batch. Rows already
    /// written stay written.
    pub async fn run(mut self, mut rx: UnboundedReceiver<WriteBackItem>) -> SyncResult<usize> {
        while let Some(item) = rx.recv().await {
            self.pending.push(item);
            if self.pending.len() >= self.batch_size {
                self.flush(FlushReason::Count).await?;
            }
        }
        while !self.pending.is_empty() {
            self.flush(FlushReason::Drain).await?;
        }
        Ok(self.flushes)
    }

    async fn flush(&mut self, reason: FlushReason) -> SyncResult<()> {
        let take = self.pending.len().min(self.batch_size);
        let batch: Vec<WriteBackItem> = self.pending.drain(..take).collect();

        let updates: Vec<CellUpdate> = batch
            .iter()
            .flat_map(|item| cell_updates(self.table, self.tech, item))
            .collect();

        if let Err(source) = self.sheets.batch_write(&updates).await {
            error!(
                "Write-back to '{}' failed ({} rows pending): {source}",
                self.table,
                batch.len() + self.pending.len()
            );
            return Err(SyncError::WriteBack {
                table: self.table.to_string(),
                written: self.written,
                source,
            });
        }

        self.written += batch.len();
        self.flushes += 1;
        info!(
            "Flushed {} rows to '{}' ({reason:?}), {} total",
            batch.len(),
            self.table,
            self.written
        );
        Ok(())
    }
}
