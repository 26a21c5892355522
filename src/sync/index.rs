//! Cross-reference indexes.
//!
//! An index maps a business key (one or more columns joined with `|`) to a
//! target record id. Indexes are loaded once per table run, before any row
//! is reconciled, and are read-only afterwards.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::{IndexPolicy, IndexSource, IndexSpec};
use crate::store::{SheetStore, TargetRecord, TargetStore};
use crate::sync::retry::RetryPolicy;
use crate::sync::row::{SheetLayout, SourceRow};
use crate::sync::types::{SyncError, SyncResult};

/// Separator between the parts of a composite key.
pub const KEY_SEPARATOR: &str = "|";

/// Join trimmed key parts; `None` if any part is empty.
#[must_use]
pub fn composite_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut key = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        let part = part.trim();
        if part.is_empty() {
            return None;
        }
        if i > 0 {
            key.push_str(KEY_SEPARATOR);
        }
        key.push_str(part);
    }
    (!key.is_empty()).then_some(key)
}

/// Key → record id lookup.
#[derive(Debug, Clone, Default)]
pub struct CrossReferenceIndex {
    name: String,
    policy: IndexPolicy,
    entries: HashMap<String, String>,
}

impl CrossReferenceIndex {
    #[must_use]
    pub fn new(name: &str, policy: IndexPolicy) -> Self {
        Self {
            name: name.to_string(),
            policy,
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a pair, honoring the duplicate policy.
    pub fn insert(&mut self, key: String, id: String) {
        match self.policy {
            IndexPolicy::FirstWins => {
                self.entries.entry(key).or_insert(id);
            }
            IndexPolicy::LastWins => {
                self.entries.insert(key, id);
            }
        }
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key.trim()).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from sheet rows: `key_columns` → `id_column`.
    ///
    /// Rows with an empty key part or an empty id are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingColumn` if a key or id header is absent.
    pub fn from_rows(
        name: &str,
        policy: IndexPolicy,
        layout: &SheetLayout,
        rows: &[SourceRow],
        key_columns: &[String],
        id_column: &str,
    ) -> SyncResult<Self> {
        let key_positions = key_columns
            .iter()
            .map(|c| layout.require(c))
            .collect::<SyncResult<Vec<_>>>()?;
        let id_position = layout.require(id_column)?;

        let mut index = Self::new(name, policy);
        for row in rows {
            let id = row.cell(id_position).trim();
            if id.is_empty() {
                continue;
            }
            if let Some(key) = composite_key(key_positions.iter().map(|&p| row.cell(p))) {
                index.insert(key, id.to_string());
            }
        }
        Ok(index)
    }

    /// Build from records read back from the target store.
    #[must_use]
    pub fn from_records(
        name: &str,
        policy: IndexPolicy,
        records: &[TargetRecord],
        key_properties: &[String],
    ) -> Self {
        let mut index = Self::new(name, policy);
        for record in records {
            let parts = key_properties
                .iter()
                .map(|p| record.fields.get(p).map_or("", String::as_str));
            if let Some(key) = composite_key(parts) {
                index.insert(key, record.id.clone());
            }
        }
        index
    }
}

/// Every index a table run may consult, by name.
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    indexes: HashMap<String, CrossReferenceIndex>,
}

impl IndexSet {
    pub fn insert(&mut self, index: CrossReferenceIndex) {
        self.indexes.insert(index.name.clone(), index);
    }

    /// # Errors
    ///
    /// Returns `SyncError::UnknownIndex` if no index has that name.
    pub fn get(&self, name: &str) -> SyncResult<&CrossReferenceIndex> {
        self.indexes
            .get(name)
            .ok_or_else(|| SyncError::UnknownIndex(name.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

/// Load one index from its configured source.
///
/// # Errors
///
/// Returns `SyncError::IndexLoad` when the source cannot be read, or
/// `SyncError::MissingColumn` when a sheet source lacks a key header.
pub async fn load_index<S, T>(
    spec: &IndexSpec,
    sheets: &S,
    target: &T,
    retry: RetryPolicy,
) -> SyncResult<CrossReferenceIndex>
where
    S: SheetStore,
    T: TargetStore,
{
    let index = match &spec.source {
        IndexSource::Sheet {
            table,
            key_columns,
            id_column,
        } => {
            let data = sheets.read(table).await.map_err(|source| SyncError::IndexLoad {
                index: spec.name.clone(),
                source,
            })?;
            let layout = SheetLayout::new(table, &data.headers);
            let rows = SourceRow::from_table(data.rows);
            CrossReferenceIndex::from_rows(
                &spec.name,
                spec.policy,
                &layout,
                &rows,
                key_columns,
                id_column,
            )?
        }
        IndexSource::Collection {
            collection_id,
            key_properties,
        } => {
            let label = format!("query {collection_id}");
            let records = retry
                .run(&label, || target.query_all(collection_id))
                .await
                .map_err(|source| SyncError::IndexLoad {
                    index: spec.name.clone(),
                    source,
                })?;
            debug!("Fetched {} records for index '{}'", records.len(), spec.name);
            CrossReferenceIndex::from_records(&spec.name, spec.policy, &records, key_properties)
        }
    };

    info!("Index '{}' loaded: {} keys", spec.name, index.len());
    Ok(index)
}

/// Load the named indexes, in order.
///
/// # Errors
///
/// Returns `SyncError::UnknownIndex` for an undeclared name, or the first
/// load failure.
pub async fn load_indexes<S, T>(
    specs: &[IndexSpec],
    names: &[&str],
    sheets: &S,
    target: &T,
    retry: RetryPolicy,
) -> SyncResult<IndexSet>
where
    S: SheetStore,
    T: TargetStore,
{
    let mut set = IndexSet::default();
    for name in names {
        let spec = specs
            .iter()
            .find(|s| s.name == *name)
            .ok_or_else(|| SyncError::UnknownIndex((*name).to_string()))?;
        set.insert(load_index(spec, sheets, target, retry).await?);
    }
    Ok(set)
}
