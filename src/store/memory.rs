//! In-process stores.
//!
//! Both stores keep everything behind a mutex and record what they were asked
//! to do, so tests can assert on calls as well as on final state. Failures can
//! be scripted per call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use super::{
    CellUpdate, RecordPage, SheetData, SheetStore, StoreError, StoreResult, TargetRecord,
    TargetStore, parse_cell_range,
};
use crate::sync::payload::{Icon, Properties};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Sheet ─────────────────────────────────────────────────────

/// Sheet store backed by a map of tables.
#[derive(Debug, Default)]
pub struct MemorySheetStore {
    tables: Mutex<HashMap<String, SheetData>>,
    batches: Mutex<Vec<Vec<CellUpdate>>>,
    write_failure: Mutex<Option<StoreError>>,
}

impl MemorySheetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, name: &str, data: SheetData) {
        lock(&self.tables).insert(name.to_string(), data);
    }

    /// Current contents of a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<SheetData> {
        lock(&self.tables).get(name).cloned()
    }

    /// Value under `header` on 1-based sheet row `row`.
    #[must_use]
    pub fn cell(&self, table: &str, row: usize, header: &str) -> Option<String> {
        let tables = lock(&self.tables);
        let data = tables.get(table)?;
        let column = data.headers.iter().position(|h| h.trim() == header)?;
        let cells = data.rows.get(row.checked_sub(2)?)?;
        Some(cells.get(column).cloned().unwrap_or_default())
    }

    /// Every batch written so far, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<CellUpdate>> {
        lock(&self.batches).clone()
    }

    /// Make every following `batch_write` fail with `err`.
    pub fn fail_writes(&self, err: StoreError) {
        *lock(&self.write_failure) = Some(err);
    }

    fn apply(&self, updates: &[CellUpdate]) -> StoreResult<()> {
        let mut tables = lock(&self.tables);
        for update in updates {
            let (table, column, row) = parse_cell_range(&update.range)
                .ok_or_else(|| StoreError::Decode(format!("bad range '{}'", update.range)))?;
            let data = tables.entry(table).or_default();
            let index = row
                .checked_sub(2)
                .ok_or_else(|| StoreError::Decode(format!("header write '{}'", update.range)))?;
            if data.rows.len() <= index {
                data.rows.resize_with(index + 1, Vec::new);
            }
            let cells = &mut data.rows[index];
            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column].clone_from(&update.value);
        }
        Ok(())
    }
}

impl SheetStore for MemorySheetStore {
    async fn read(&self, table: &str) -> StoreResult<SheetData> {
        self.table(table)
            .ok_or_else(|| StoreError::NotFound(format!("table '{table}'")))
    }

    async fn batch_write(&self, updates: &[CellUpdate]) -> StoreResult<()> {
        if let Some(err) = lock(&self.write_failure).clone() {
            return Err(err);
        }
        self.apply(updates)?;
        lock(&self.batches).push(updates.to_vec());
        trace!("memory sheet: wrote {} cells", updates.len());
        Ok(())
    }
}

// ── Target ────────────────────────────────────────────────────

/// A call received by [`MemoryTargetStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum TargetCall {
    Create {
        collection_id: String,
        record_id: String,
        properties: Properties,
        icon: Option<Icon>,
    },
    Update {
        record_id: String,
        properties: Properties,
        icon: Option<Icon>,
    },
}

#[derive(Debug, Clone)]
struct StoredRecord {
    collection_id: String,
    record: TargetRecord,
}

/// Target store backed by a vector of records.
#[derive(Debug)]
pub struct MemoryTargetStore {
    records: Mutex<Vec<StoredRecord>>,
    calls: Mutex<Vec<TargetCall>>,
    /// Scripted failures, consumed one per write of a record with that title.
    failures: Mutex<HashMap<String, VecDeque<StoreError>>>,
    options: Mutex<HashMap<(String, String), Vec<String>>>,
    /// Scripted failures, consumed one per `ensure_options` on that property.
    option_failures: Mutex<HashMap<String, VecDeque<StoreError>>>,
    page_size: usize,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    next_id: AtomicUsize,
}

impl Default for MemoryTargetStore {
    fn default() -> Self {
        Self {
            records: Mutex::default(),
            calls: Mutex::default(),
            failures: Mutex::default(),
            options: Mutex::default(),
            option_failures: Mutex::default(),
            page_size: 100,
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl MemoryTargetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records per query page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Simulated latency of each write.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add an existing record to a collection.
    pub fn seed(&self, collection_id: &str, record: TargetRecord) {
        lock(&self.records).push(StoredRecord {
            collection_id: collection_id.to_string(),
            record,
        });
    }

    /// Fail the next write of the record titled `title` with `err`.
    pub fn fail_title(&self, title: &str, err: StoreError) {
        self.fail_title_times(title, err, 1);
    }

    /// Fail the next `times` writes of the record titled `title` with `err`.
    pub fn fail_title_times(&self, title: &str, err: StoreError, times: usize) {
        lock(&self.failures)
            .entry(title.to_string())
            .or_default()
            .extend(std::iter::repeat_n(err, times));
    }

    /// Fail the next `ensure_options` call for `property` with `err`.
    pub fn fail_options(&self, property: &str, err: StoreError) {
        lock(&self.option_failures)
            .entry(property.to_string())
            .or_default()
            .push_back(err);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<TargetCall> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn create_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, TargetCall::Create { .. }))
            .count()
    }

    #[must_use]
    pub fn update_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, TargetCall::Update { .. }))
            .count()
    }

    /// Highest number of writes observed in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn record(&self, record_id: &str) -> Option<TargetRecord> {
        lock(&self.records)
            .iter()
            .find(|r| r.record.id == record_id)
            .map(|r| r.record.clone())
    }

    #[must_use]
    pub fn records(&self, collection_id: &str) -> Vec<TargetRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.collection_id == collection_id)
            .map(|r| r.record.clone())
            .collect()
    }

    /// Options registered for a select property.
    #[must_use]
    pub fn options(&self, collection_id: &str, property: &str) -> Vec<String> {
        lock(&self.options)
            .get(&(collection_id.to_string(), property.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn scripted_failure(&self, properties: &Properties) -> Option<StoreError> {
        let title = properties.title()?;
        lock(&self.failures).get_mut(title)?.pop_front()
    }

    async fn simulate_latency(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn flatten(properties: &Properties) -> HashMap<String, String> {
    properties
        .iter()
        .map(|(name, value)| (name.to_string(), value.plain_text()))
        .collect()
}

impl TargetStore for MemoryTargetStore {
    async fn create(
        &self,
        collection_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> StoreResult<String> {
        self.simulate_latency().await;
        if let Some(err) = self.scripted_failure(properties) {
            return Err(err);
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record_id = uuid::Uuid::new_v4().to_string();
        trace!("memory target: create #{n} {record_id} in {collection_id}");

        self.seed(
            collection_id,
            TargetRecord {
                id: record_id.clone(),
                fields: flatten(properties),
            },
        );
        lock(&self.calls).push(TargetCall::Create {
            collection_id: collection_id.to_string(),
            record_id: record_id.clone(),
            properties: properties.clone(),
            icon: icon.cloned(),
        });
        Ok(record_id)
    }

    async fn update(
        &self,
        record_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> StoreResult<()> {
        self.simulate_latency().await;
        if let Some(err) = self.scripted_failure(properties) {
            return Err(err);
        }

        {
            let mut records = lock(&self.records);
            match records.iter_mut().find(|r| r.record.id == record_id) {
                Some(stored) => stored.record.fields.extend(flatten(properties)),
                None => {
                    // pages created outside this store are accepted as-is
                    records.push(StoredRecord {
                        collection_id: String::new(),
                        record: TargetRecord {
                            id: record_id.to_string(),
                            fields: flatten(properties),
                        },
                    });
                }
            }
        }
        lock(&self.calls).push(TargetCall::Update {
            record_id: record_id.to_string(),
            properties: properties.clone(),
            icon: icon.cloned(),
        });
        Ok(())
    }

    async fn query_page(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> StoreResult<RecordPage> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| StoreError::Decode(format!("bad cursor '{c}'")))?,
            None => 0,
        };
        let all = self.records(collection_id);
        let end = (offset + self.page_size).min(all.len());
        let records = all.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let has_more = end < all.len();
        Ok(RecordPage {
            records,
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }

    async fn ensure_options(
        &self,
        collection_id: &str,
        property: &str,
        values: &[String],
    ) -> StoreResult<()> {
        let failure = lock(&self.option_failures)
            .get_mut(property)
            .and_then(VecDeque::pop_front);
        if let Some(err) = failure {
            return Err(err);
        }

        let mut options = lock(&self.options);
        let known = options
            .entry((collection_id.to_string(), property.to_string()))
            .or_default();
        for value in values {
            if !known.contains(value) {
                known.push(value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_write_applies_cells() {
        let sheets = MemorySheetStore::new();
        sheets.insert_table(
            "T",
            SheetData {
                headers: vec!["Nom".into(), "notion_page_id".into()],
                rows: vec![vec!["a".into()]],
            },
        );

        sheets
            .batch_write(&[
                CellUpdate {
                    range: "T!B2".into(),
                    value: "page-1".into(),
                },
                CellUpdate {
                    range: "T!B4".into(),
                    value: "page-3".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(sheets.cell("T", 2, "notion_page_id").as_deref(), Some("page-1"));
        assert_eq!(sheets.cell("T", 3, "notion_page_id").as_deref(), Some(""));
        assert_eq!(sheets.cell("T", 4, "notion_page_id").as_deref(), Some("page-3"));
        assert_eq!(sheets.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_read_unknown_table() {
        let sheets = MemorySheetStore::new();
        assert!(matches!(sheets.read("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_all_follows_pages() {
        let target = MemoryTargetStore::new().with_page_size(2);
        for i in 0..5 {
            target.seed(
                "db",
                TargetRecord {
                    id: format!("p{i}"),
                    fields: HashMap::new(),
                },
            );
        }
        target.seed("other", TargetRecord::default());

        let first = target.query_page("db", None).await.unwrap();
        assert!(first.has_more);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let all = target.query_all("db").await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_scripted_failure_consumed_once() {
        let target = MemoryTargetStore::new();
        target.fail_title("Pikachu", StoreError::Transport("reset".into()));
        let mut props = Properties::new();
        props.set_title("Nom", "Pikachu");

        assert!(target.create("db", &props, None).await.is_err());
        let id = target.create("db", &props, None).await.unwrap();
        assert_eq!(target.record(&id).unwrap().fields["Nom"], "Pikachu");
        assert_eq!(target.create_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_options_deduplicates() {
        let target = MemoryTargetStore::new();
        target
            .ensure_options("db", "Statut", &["Base".into(), "Evo".into()])
            .await
            .unwrap();
        target
            .ensure_options("db", "Statut", &["Evo".into(), "Mega".into()])
            .await
            .unwrap();
        assert_eq!(target.options("db", "Statut"), vec!["Base", "Evo", "Mega"]);
    }
}
