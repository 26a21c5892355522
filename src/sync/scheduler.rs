//! Bounded-concurrency row scheduling.
//!
//! At most `concurrency` rows are reconciled at once. Rows finish in any
//! order; each successful write is forwarded to the write-back channel as
//! soon as it completes.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::store::TargetStore;
use crate::sync::reconcile::Reconciler;
use crate::sync::row::SourceRow;
use crate::sync::types::{RunStats, WriteBackItem};

/// Reconcile every row, forwarding write-back items through `tx`.
///
/// `tx` is dropped on return, which lets the batcher drain and stop.
pub async fn schedule<T: TargetStore>(
    reconciler: &Reconciler<'_, T>,
    rows: Vec<SourceRow>,
    concurrency: usize,
    tx: UnboundedSender<WriteBackItem>,
) -> RunStats {
    let total = rows.len();
    let mut stats = RunStats::default();

    let mut results = stream::iter(rows)
        .map(|row| reconciler.reconcile(row))
        .buffer_unordered(concurrency.max(1));

    while let Some(result) = results.next().await {
        if let Some(item) = result.as_ref().ok().and_then(|action| action.write_back()) {
            if tx.send(item.clone()).is_err() {
                warn!("Write-back channel closed, row {} not persisted", item.row);
            }
        }
        stats.record(&result);

        let done = stats.total();
        if done % 50 == 0 || done == total {
            info!("{done}/{total} rows processed");
        }
    }

    drop(tx);
    stats
}
