//! Per-row reconciliation.
//!
//! For each row: normalize, resolve relations, fingerprint, compare with the
//! stored sync state, then skip, create or update. A row failure never
//! escapes as an error; it comes back as [`RowFailure`] so sibling rows keep
//! running.

use chrono::{SecondsFormat, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{FieldKind, TableSpec};
use crate::store::TargetStore;
use crate::sync::hash::fingerprint;
use crate::sync::index::{CrossReferenceIndex, IndexSet, composite_key};
use crate::sync::normalize::{FieldValue, NormalizedRecord, normalize, split_list};
use crate::sync::payload::{Icon, Properties};
use crate::sync::retry::RetryPolicy;
use crate::sync::row::{SheetLayout, SourceRow, SyncState, TechColumnIndexes};
use crate::sync::types::{
    Plan, RowAction, RowError, RowFailure, RowResult, SyncResult, WriteBackItem,
};

/// Relation property with the record ids its keys resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelation {
    pub property: String,
    pub ids: Vec<String>,
}

/// Everything derived from a row before any store call.
#[derive(Debug, Clone)]
pub struct PreparedRow {
    pub record: NormalizedRecord,
    pub relations: Vec<ResolvedRelation>,
    pub fingerprint: String,
    pub state: SyncState,
}

impl PreparedRow {
    /// Stored fingerprint matches and the row already points at a record.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        !self.state.fingerprint.is_empty()
            && self.state.fingerprint == self.fingerprint
            && !self.state.record_id.is_empty()
    }

    #[must_use]
    pub fn plan(&self) -> Plan {
        if self.is_up_to_date() {
            Plan::Skip
        } else if self.state.record_id.is_empty() {
            Plan::Create
        } else {
            Plan::Update
        }
    }
}

/// Reconciles the rows of one table against one target collection.
pub struct Reconciler<'a, T: TargetStore> {
    table: &'a TableSpec,
    layout: &'a SheetLayout,
    tech: TechColumnIndexes,
    indexes: &'a IndexSet,
    target: &'a T,
    retry: RetryPolicy,
    missing_image_url: &'a str,
}

impl<'a, T: TargetStore> Reconciler<'a, T> {
    /// # Errors
    ///
    /// Returns `SyncError::MissingColumn` if a technical or title column is
    /// absent, or `SyncError::UnknownIndex` if a relation names an index
    /// that was not loaded.
    pub fn new(
        table: &'a TableSpec,
        layout: &'a SheetLayout,
        indexes: &'a IndexSet,
        target: &'a T,
        retry: RetryPolicy,
        missing_image_url: &'a str,
    ) -> SyncResult<Self> {
        let tech = layout.tech_columns(&table.tech_columns)?;
        layout.require(&table.title_column)?;
        for relation in &table.relations {
            indexes.get(&relation.index)?;
        }
        Ok(Self {
            table,
            layout,
            tech,
            indexes,
            target,
            retry,
            missing_image_url,
        })
    }

    #[must_use]
    pub fn tech_columns(&self) -> TechColumnIndexes {
        self.tech
    }

    /// Normalize a row and compute its fingerprint. Pure.
    #[must_use]
    pub fn prepare(&self, row: &SourceRow) -> PreparedRow {
        let record = normalize(row, self.layout, self.table, self.missing_image_url);
        let relations = self.resolve_relations(row.number, &record);

        let fingerprint = fingerprint(&self.table.fingerprint, |name| {
            if let Some(rel) = relations.iter().find(|r| r.property == name) {
                return rel.ids.join(",");
            }
            record.get(name).map(FieldValue::hash_string).unwrap_or_default()
        });

        PreparedRow {
            record,
            relations,
            fingerprint,
            state: SyncState::from_row(row, self.tech),
        }
    }

    /// Classify a row without calling the target store.
    ///
    /// Mirrors [`Self::reconcile`]: an up-to-date row is skipped even with an
    /// empty title, any other row without a title is invalid.
    #[must_use]
    pub fn plan(&self, row: &SourceRow) -> Plan {
        let prepared = self.prepare(row);
        match prepared.plan() {
            Plan::Skip => Plan::Skip,
            _ if prepared.record.text(&self.table.title_column).is_empty() => Plan::Invalid,
            plan => plan,
        }
    }

    /// Bring one row's target record up to date.
    pub async fn reconcile(&self, row: SourceRow) -> RowResult {
        let prepared = self.prepare(&row);
        let title = prepared.record.text(&self.table.title_column).to_string();

        if prepared.is_up_to_date() {
            debug!("row {} '{}' up to date", row.number, title);
            return Ok(RowAction::Skipped);
        }
        if title.is_empty() {
            return Err(RowFailure::new(
                row.number,
                &title,
                RowError::MissingTitle(self.table.title_column.clone()),
            ));
        }

        let (properties, icon) = self.build_payload(&prepared, &title);

        self.write(&prepared, &properties, icon.as_ref())
            .await
            .map(|(created, record_id)| {
                let item = WriteBackItem {
                    row: row.number,
                    record_id,
                    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    fingerprint: prepared.fingerprint.clone(),
                };
                if created {
                    info!(row = row.number, title = %title, "created {}", item.record_id);
                    RowAction::Created(item)
                } else {
                    info!(row = row.number, title = %title, "updated {}", item.record_id);
                    RowAction::Updated(item)
                }
            })
            .map_err(|err| {
                error!(row = row.number, title = %title, error = %err, "row failed");
                RowFailure::new(row.number, &title, err.into())
            })
    }

    /// Create or update; returns `(created, record_id)`.
    async fn write(
        &self,
        prepared: &PreparedRow,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> crate::store::StoreResult<(bool, String)> {
        self.ensure_options(&prepared.record).await?;

        let record_id = &prepared.state.record_id;
        if record_id.is_empty() {
            let id = self
                .retry
                .run("create", || {
                    self.target
                        .create(&self.table.collection_id, properties, icon)
                })
                .await?;
            Ok((true, id))
        } else {
            self.retry
                .run("update", || self.target.update(record_id, properties, icon))
                .await?;
            Ok((false, record_id.clone()))
        }
    }

    /// Register unseen select options for fields flagged `auto_create_options`.
    async fn ensure_options(
        &self,
        record: &NormalizedRecord,
    ) -> crate::store::StoreResult<()> {
        for field in self.table.fields.iter().filter(|f| f.auto_create_options) {
            let values = match (field.kind, record.get(&field.column)) {
                (FieldKind::Select, Some(FieldValue::Text(s))) if !s.is_empty() => {
                    vec![s.clone()]
                }
                (FieldKind::MultiSelect, Some(FieldValue::List(items))) if !items.is_empty() => {
                    items.clone()
                }
                _ => continue,
            };
            let property = field.property_name();
            self.retry
                .run("ensure options", || {
                    self.target
                        .ensure_options(&self.table.collection_id, property, &values)
                })
                .await?;
        }
        Ok(())
    }

    fn resolve_relations(&self, row: usize, record: &NormalizedRecord) -> Vec<ResolvedRelation> {
        self.table
            .relations
            .iter()
            .map(|relation| {
                let raw: Vec<String> = relation
                    .columns
                    .iter()
                    .map(|c| record.get(c).map(FieldValue::hash_string).unwrap_or_default())
                    .collect();

                let keys: Vec<String> = if relation.multi {
                    raw.iter().flat_map(|v| split_list(v)).collect()
                } else {
                    composite_key(raw.iter().map(String::as_str))
                        .into_iter()
                        .collect()
                };

                let ids = match self.indexes.get(&relation.index) {
                    Ok(index) => resolve_keys(index, &keys, row, &relation.property),
                    Err(_) => Vec::new(),
                };
                ResolvedRelation {
                    property: relation.property.clone(),
                    ids,
                }
            })
            .collect()
    }

    /// Map a prepared row onto target properties and an optional icon.
    #[must_use]
    pub fn build_payload(&self, prepared: &PreparedRow, title: &str) -> (Properties, Option<Icon>) {
        let record = &prepared.record;
        let mut props = Properties::new();
        props.set_title(self.table.title_property_name(), title);

        for field in &self.table.fields {
            let name = field.property_name();
            match record.get(&field.column) {
                Some(FieldValue::Text(s)) if field.kind == FieldKind::Select => {
                    props.set_select(name, s);
                }
                Some(FieldValue::Text(s)) => props.set_rich_text(name, s),
                Some(FieldValue::Number(n)) => props.set_number(name, *n),
                Some(FieldValue::Bool(b)) => props.set_checkbox(name, *b),
                Some(FieldValue::Date(d)) => props.set_date(name, d.as_deref()),
                Some(FieldValue::List(items)) => props.set_multi_select(name, items),
                Some(FieldValue::Image(_)) | None => {}
            }
        }

        for relation in &prepared.relations {
            props.set_relation(&relation.property, &relation.ids);
        }

        let mut icon = None;
        if let Some(spec) = &self.table.image {
            let image = record.image(&spec.column);
            if let Some(image) = image {
                props.set_image(&spec.property, image);
                if spec.icon {
                    icon = Some(Icon {
                        url: image.url.clone(),
                    });
                }
            }
            if let Some(flag) = &spec.missing_flag {
                props.set_checkbox(flag, image.is_some_and(|i| i.missing));
            }
        }

        (props, icon)
    }
}

/// Look up each key; unresolved keys are logged and dropped, duplicates collapse.
fn resolve_keys(
    index: &CrossReferenceIndex,
    keys: &[String],
    row: usize,
    property: &str,
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        match index.lookup(key) {
            Some(id) => {
                if !ids.iter().any(|known| known == id) {
                    ids.push(id.to_string());
                }
            }
            None => warn!(
                "row {row}: no '{}' entry for key '{key}' ({property})",
                index.name()
            ),
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FieldSpec, ImageSpec, IndexPolicy, RelationSpec, TechColumns,
    };
    use crate::store::memory::MemoryTargetStore;
    use crate::sync::payload::PropertyValue;

    const FALLBACK: &str = "https://example.com/missing.png";

    fn table() -> TableSpec {
        TableSpec {
            name: "RefForme".into(),
            collection_id: "db-forme".into(),
            title_column: "Nom".into(),
            title_property: None,
            fingerprint: vec!["Nom".into(), "Id".into(), "RefEspece".into(), "image_url".into()],
            tech_columns: TechColumns::default(),
            fields: vec![FieldSpec {
                column: "Id".into(),
                property: None,
                kind: FieldKind::Number,
                auto_create_options: false,
            }],
            relations: vec![RelationSpec {
                property: "RefEspece".into(),
                index: "espece".into(),
                columns: vec!["evol_ids".into()],
                multi: true,
            }],
            image: Some(ImageSpec {
                column: "image_url".into(),
                property: "Image".into(),
                missing_flag: Some("ImageManquante".into()),
                icon: true,
            }),
        }
    }

    fn layout() -> SheetLayout {
        let headers: Vec<String> = [
            "Nom",
            "Id",
            "evol_ids",
            "image_url",
            "notion_page_id",
            "last_sync",
            "sync_hash",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        SheetLayout::new("RefForme", &headers)
    }

    fn indexes() -> IndexSet {
        let mut espece = CrossReferenceIndex::new("espece", IndexPolicy::FirstWins);
        espece.insert("25".into(), "page-25".into());
        espece.insert("26".into(), "page-26".into());
        let mut set = IndexSet::default();
        set.insert(espece);
        set
    }

    fn row(cells: &[&str]) -> SourceRow {
        SourceRow {
            number: 2,
            cells: cells.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    #[test]
    fn test_relations_resolved_and_unknown_dropped() {
        let (table, layout, indexes) = (table(), layout(), indexes());
        let target = MemoryTargetStore::new();
        let rec =
            Reconciler::new(&table, &layout, &indexes, &target, RetryPolicy::none(), FALLBACK)
                .unwrap();

        let prepared = rec.prepare(&row(&["Pikachu", "25", "25, 999, 26, 25", "INDISPO"]));
        assert_eq!(
            prepared.relations[0].ids,
            vec!["page-25".to_string(), "page-26".to_string()]
        );
        assert_eq!(prepared.plan(), Plan::Create);

        let (props, icon) = rec.build_payload(&prepared, "Pikachu");
        assert_eq!(props.title(), Some("Pikachu"));
        assert_eq!(props.get("Id"), Some(&PropertyValue::Number(25.0)));
        assert_eq!(props.get("ImageManquante"), Some(&PropertyValue::Checkbox(true)));
        assert_eq!(icon.unwrap().url, FALLBACK);
    }

    #[test]
    fn test_fingerprint_covers_resolved_relations() {
        let (table, layout) = (table(), layout());
        let target = MemoryTargetStore::new();
        let with = indexes();
        let without = {
            let mut set = IndexSet::default();
            set.insert(CrossReferenceIndex::new("espece", IndexPolicy::FirstWins));
            set
        };
        let cells = ["Pikachu", "25", "25", ""];

        let a = Reconciler::new(&table, &layout, &with, &target, RetryPolicy::none(), FALLBACK)
            .unwrap()
            .prepare(&row(&cells));
        let b = Reconciler::new(&table, &layout, &without, &target, RetryPolicy::none(), FALLBACK)
            .unwrap()
            .prepare(&row(&cells));
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_unknown_index_rejected_up_front() {
        let (table, layout) = (table(), layout());
        let target = MemoryTargetStore::new();
        let empty = IndexSet::default();
        let result =
            Reconciler::new(&table, &layout, &empty, &target, RetryPolicy::none(), FALLBACK);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_then_skip() {
        let (table, layout, indexes) = (table(), layout(), indexes());
        let target = MemoryTargetStore::new();
        let rec =
            Reconciler::new(&table, &layout, &indexes, &target, RetryPolicy::none(), FALLBACK)
                .unwrap();

        let first = rec
            .reconcile(row(&["Pikachu", "25", "", "https://cdn.example.com/25.png"]))
            .await
            .unwrap();
        let item = match first {
            RowAction::Created(item) => item,
            other => panic!("expected create, got {other:?}"),
        };
        assert_eq!(item.row, 2);
        assert_eq!(item.fingerprint.len(), 64);
        assert!(item.timestamp.ends_with('Z'));

        let second = rec
            .reconcile(row(&[
                "Pikachu",
                "25",
                "",
                "https://cdn.example.com/25.png",
                item.record_id.as_str(),
                item.timestamp.as_str(),
                item.fingerprint.as_str(),
            ]))
            .await
            .unwrap();
        assert_eq!(second, RowAction::Skipped);
        assert_eq!(target.create_count(), 1);
        assert_eq!(target.update_count(), 0);
    }

    #[tokio::test]
    async fn test_changed_row_updates_in_place() {
        let (table, layout, indexes) = (table(), layout(), indexes());
        let target = MemoryTargetStore::new();
        let rec =
            Reconciler::new(&table, &layout, &indexes, &target, RetryPolicy::none(), FALLBACK)
                .unwrap();

        let result = rec
            .reconcile(row(&["Raichu", "26", "", "", "page-x", "", "stale"]))
            .await
            .unwrap();
        let item = match result {
            RowAction::Updated(item) => item,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(item.record_id, "page-x");
        assert_eq!(target.update_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_title_fails_row() {
        let (table, layout, indexes) = (table(), layout(), indexes());
        let target = MemoryTargetStore::new();
        let rec =
            Reconciler::new(&table, &layout, &indexes, &target, RetryPolicy::none(), FALLBACK)
                .unwrap();

        let failure = rec.reconcile(row(&["  ", "7"])).await.unwrap_err();
        assert!(matches!(failure.error, RowError::MissingTitle(_)));
        assert_eq!(target.create_count(), 0);
    }
}
