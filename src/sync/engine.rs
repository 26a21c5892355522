//! Table-level orchestration.
//!
//! A table run reads the sheet, loads the indexes its relations need, then
//! runs the scheduler and the write-back batcher side by side. Tables run
//! one after another in configuration order.

use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{SyncConfig, TableSpec};
use crate::store::{SheetStore, TargetStore};
use crate::sync::index::{IndexSet, load_indexes};
use crate::sync::reconcile::Reconciler;
use crate::sync::retry::RetryPolicy;
use crate::sync::row::{SheetLayout, SourceRow};
use crate::sync::scheduler::schedule;
use crate::sync::types::{PlanStats, RunStats, SyncError, SyncResult};
use crate::sync::writeback::WriteBackBatcher;

/// Outcome of one table run.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub stats: RunStats,
    pub elapsed_ms: u128,
}

/// Outcome of one table preview.
#[derive(Debug, Clone, Serialize)]
pub struct TablePreview {
    pub table: String,
    #[serde(flatten)]
    pub plan: PlanStats,
}

/// Drives every configured table against a sheet store and a target store.
pub struct SyncEngine<'a, S: SheetStore, T: TargetStore> {
    config: &'a SyncConfig,
    sheets: &'a S,
    target: &'a T,
}

impl<'a, S: SheetStore, T: TargetStore> SyncEngine<'a, S, T> {
    #[must_use]
    pub fn new(config: &'a SyncConfig, sheets: &'a S, target: &'a T) -> Self {
        Self {
            config,
            sheets,
            target,
        }
    }

    fn retry(&self) -> RetryPolicy {
        self.config.retry.into()
    }

    /// Tables to process: all of them, or the named ones in config order.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UnknownTable` for a name the config lacks.
    pub fn select_tables(&self, only: &[String]) -> SyncResult<Vec<&'a TableSpec>> {
        if let Some(unknown) = only
            .iter()
            .find(|name| !self.config.tables.iter().any(|t| &t.name == *name))
        {
            return Err(SyncError::UnknownTable(unknown.clone()));
        }
        Ok(self
            .config
            .tables
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.name))
            .collect())
    }

    /// Sync the selected tables in order.
    ///
    /// # Errors
    ///
    /// Stops at the first table whose run fails.
    pub async fn run(&self, only: &[String]) -> SyncResult<Vec<TableReport>> {
        let mut reports = Vec::new();
        for table in self.select_tables(only)? {
            let started = Instant::now();
            let stats = self.sync_table(table).await?;
            reports.push(TableReport {
                table: table.name.clone(),
                stats,
                elapsed_ms: started.elapsed().as_millis(),
            });
        }
        Ok(reports)
    }

    /// Preview the selected tables without writing anything.
    ///
    /// # Errors
    ///
    /// Stops at the first table that cannot be read.
    pub async fn preview(&self, only: &[String]) -> SyncResult<Vec<TablePreview>> {
        let mut previews = Vec::new();
        for table in self.select_tables(only)? {
            previews.push(TablePreview {
                table: table.name.clone(),
                plan: self.preview_table(table).await?,
            });
        }
        Ok(previews)
    }

    async fn load(&self, table: &TableSpec) -> SyncResult<(SheetLayout, Vec<SourceRow>, IndexSet)> {
        let data = self
            .sheets
            .read(&table.name)
            .await
            .map_err(|source| SyncError::SheetRead {
                table: table.name.clone(),
                source,
            })?;
        let layout = SheetLayout::new(&table.name, &data.headers);
        let rows: Vec<SourceRow> = SourceRow::from_table(data.rows)
            .into_iter()
            .filter(|row| !row.is_blank())
            .collect();

        let mut names: Vec<&str> = Vec::new();
        for relation in &table.relations {
            if !names.contains(&relation.index.as_str()) {
                names.push(&relation.index);
            }
        }
        let indexes =
            load_indexes(&self.config.indexes, &names, self.sheets, self.target, self.retry())
                .await?;

        Ok((layout, rows, indexes))
    }

    /// Run one table to completion.
    ///
    /// # Errors
    ///
    /// Fails on unreadable sheets, missing columns, index load failures and
    /// write-back failures. Individual row failures are reported in the
    /// returned stats instead.
    pub async fn sync_table(&self, table: &TableSpec) -> SyncResult<RunStats> {
        info!("Syncing table '{}'", table.name);
        let (layout, rows, indexes) = self.load(table).await?;
        let reconciler = Reconciler::new(
            table,
            &layout,
            &indexes,
            self.target,
            self.retry(),
            &self.config.missing_image_url,
        )?;

        let (tx, rx) = mpsc::unbounded_channel();
        let batcher = WriteBackBatcher::new(
            self.sheets,
            &table.name,
            reconciler.tech_columns(),
            self.config.flush_batch,
        );

        let (mut stats, flushes) = tokio::try_join!(
            async { Ok::<_, SyncError>(schedule(&reconciler, rows, self.config.concurrency, tx).await) },
            batcher.run(rx),
        )?;
        stats.flushes = flushes;

        for failure in &stats.failures {
            warn!("row {} '{}': {}", failure.row, failure.title, failure.reason);
        }
        info!(
            "{}: create={} update={} skip={} failed={}",
            table.name, stats.created, stats.updated, stats.skipped, stats.failed
        );
        Ok(stats)
    }

    /// Classify every row of a table without touching either store's data.
    ///
    /// # Errors
    ///
    /// Same run-level failures as [`Self::sync_table`], minus write-back.
    pub async fn preview_table(&self, table: &TableSpec) -> SyncResult<PlanStats> {
        let (layout, rows, indexes) = self.load(table).await?;
        let reconciler = Reconciler::new(
            table,
            &layout,
            &indexes,
            self.target,
            self.retry(),
            &self.config.missing_image_url,
        )?;

        let mut plan = PlanStats::default();
        for row in &rows {
            plan.record(reconciler.plan(row));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetrySettings, TechColumns};
    use crate::store::memory::{MemorySheetStore, MemoryTargetStore};
    use crate::store::{SheetData, StoreError};

    fn config() -> SyncConfig {
        SyncConfig {
            spreadsheet_id: None,
            concurrency: 3,
            flush_batch: 20,
            retry: RetrySettings {
                max_retries: 0,
                base_delay_ms: 0,
            },
            missing_image_url: "https://example.com/missing.png".into(),
            indexes: vec![],
            tables: vec![TableSpec {
                name: "RefEtat".into(),
                collection_id: "db-etat".into(),
                title_column: "Nom".into(),
                title_property: None,
                fingerprint: vec!["Nom".into()],
                tech_columns: TechColumns::default(),
                fields: vec![],
                relations: vec![],
                image: None,
            }],
        }
    }

    fn sheet(rows: &[&str]) -> SheetData {
        SheetData {
            headers: ["Nom", "notion_page_id", "last_sync", "sync_hash"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            rows: rows.iter().map(|r| vec![(*r).to_string()]).collect(),
        }
    }

    #[tokio::test]
    async fn test_blank_rows_ignored() {
        let config = config();
        let sheets = MemorySheetStore::new();
        sheets.insert_table("RefEtat", sheet(&["Normal", "", "  ", "Shiny"]));
        let target = MemoryTargetStore::new();

        let stats = SyncEngine::new(&config, &sheets, &target)
            .sync_table(&config.tables[0])
            .await
            .unwrap();

        assert_eq!(stats.created, 2);
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.flushes, 1);
        // write-back lands on the original row numbers
        assert_eq!(sheets.cell("RefEtat", 5, "notion_page_id").unwrap().len(), 36);
    }

    #[tokio::test]
    async fn test_preview_makes_no_writes() {
        let config = config();
        let sheets = MemorySheetStore::new();
        sheets.insert_table("RefEtat", sheet(&["Normal", "Shiny"]));
        let target = MemoryTargetStore::new();

        let previews = SyncEngine::new(&config, &sheets, &target)
            .preview(&[])
            .await
            .unwrap();

        assert_eq!(previews[0].plan.to_create, 2);
        assert_eq!(target.create_count(), 0);
        assert!(sheets.batches().is_empty());
    }

    #[tokio::test]
    async fn test_preview_flags_untitled_rows_like_run() {
        let config = config();
        let sheets = MemorySheetStore::new();
        let mut data = sheet(&["Normal"]);
        data.rows.push(vec![String::new(), String::new(), String::new(), "stale".into()]);
        sheets.insert_table("RefEtat", data);
        let target = MemoryTargetStore::new();
        let engine = SyncEngine::new(&config, &sheets, &target);

        let previews = engine.preview(&[]).await.unwrap();
        assert_eq!(previews[0].plan.to_create, 1);
        assert_eq!(previews[0].plan.invalid, 1);

        let reports = engine.run(&[]).await.unwrap();
        assert_eq!(reports[0].stats.created, 1);
        assert_eq!(reports[0].stats.failed, 1);
    }

    #[tokio::test]
    async fn test_unknown_table_rejected() {
        let config = config();
        let sheets = MemorySheetStore::new();
        let target = MemoryTargetStore::new();
        let err = SyncEngine::new(&config, &sheets, &target)
            .run(&["Nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownTable(name) if name == "Nope"));
    }

    #[tokio::test]
    async fn test_unreadable_sheet_is_fatal() {
        let config = config();
        let sheets = MemorySheetStore::new();
        let target = MemoryTargetStore::new();
        let err = SyncEngine::new(&config, &sheets, &target)
            .sync_table(&config.tables[0])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::SheetRead {
                source: StoreError::NotFound(_),
                ..
            }
        ));
    }
}
