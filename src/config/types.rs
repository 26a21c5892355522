//! Configuration schema.
//!
//! One JSON document describes every table to mirror and every
//! cross-reference index those tables resolve relations against.

use serde::{Deserialize, Serialize};

use crate::sync::retry::RetryPolicy;

/// Fallback shown when a row has no usable image.
pub const DEFAULT_MISSING_IMAGE_URL: &str =
    "https://raw.githubusercontent.com/damramat/pokemon-assets/main/missing.png";

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Spreadsheet holding every table. `GOOGLE_SHEET_ID` overrides it.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    /// Maximum rows with a target-store call in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Rows per batched write-back.
    #[serde(default = "default_flush_batch")]
    pub flush_batch: usize,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default = "default_missing_image_url")]
    pub missing_image_url: String,

    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    pub tables: Vec<TableSpec>,
}

fn default_concurrency() -> usize {
    3
}

fn default_flush_batch() -> usize {
    20
}

fn default_missing_image_url() -> String {
    DEFAULT_MISSING_IMAGE_URL.to_string()
}

/// Backoff settings for target-store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: std::time::Duration::from_millis(settings.base_delay_ms),
        }
    }
}

/// How duplicate keys are resolved while building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPolicy {
    /// Keep the first id seen for a key.
    FirstWins,
    /// Later rows overwrite earlier ones.
    #[default]
    LastWins,
}

/// Where an index reads its key → id pairs from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    /// An auxiliary sheet table that already carries target ids.
    Sheet {
        table: String,
        key_columns: Vec<String>,
        id_column: String,
    },
    /// Every record of a target collection, keyed on record properties.
    Collection {
        collection_id: String,
        key_properties: Vec<String>,
    },
}

/// A named cross-reference index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    #[serde(default)]
    pub policy: IndexPolicy,
    pub source: IndexSource,
}

impl IndexSpec {
    /// Key columns or properties, whichever the source uses.
    #[must_use]
    pub fn key_fields(&self) -> &[String] {
        match &self.source {
            IndexSource::Sheet { key_columns, .. } => key_columns,
            IndexSource::Collection { key_properties, .. } => key_properties,
        }
    }
}

/// Typed projection applied to a sheet column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed text sent as rich text.
    #[default]
    Text,
    Number,
    Checkbox,
    Select,
    MultiSelect,
    Date,
}

/// One scalar column mapped onto a target property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub column: String,
    /// Target property name; defaults to the column name.
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    /// Add unknown select options to the collection schema before writing.
    #[serde(default)]
    pub auto_create_options: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn property_name(&self) -> &str {
        self.property.as_deref().unwrap_or(&self.column)
    }
}

/// A relation resolved through a cross-reference index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    /// Target property receiving the related ids.
    pub property: String,
    /// Name of the index used to resolve keys.
    pub index: String,
    /// Columns forming the lookup key (joined with `|`).
    pub columns: Vec<String>,
    /// Cell holds a comma-separated list of keys.
    #[serde(default)]
    pub multi: bool,
}

/// Image / icon handling for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub column: String,
    #[serde(default = "default_image_property")]
    pub property: String,
    /// Checkbox property set when the fallback image is used.
    #[serde(default)]
    pub missing_flag: Option<String>,
    /// Also use the image as the record icon.
    #[serde(default = "default_true")]
    pub icon: bool,
}

fn default_image_property() -> String {
    "Image".to_string()
}

fn default_true() -> bool {
    true
}

/// Header names of the three technical columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechColumns {
    pub record_id: String,
    pub last_sync: String,
    pub fingerprint: String,
}

impl Default for TechColumns {
    fn default() -> Self {
        Self {
            record_id: "notion_page_id".to_string(),
            last_sync: "last_sync".to_string(),
            fingerprint: "sync_hash".to_string(),
        }
    }
}

/// One synchronized sheet table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Sheet table (tab) name.
    pub name: String,
    /// Target collection receiving created records.
    pub collection_id: String,
    /// Column used for the record title.
    pub title_column: String,
    /// Title property name; defaults to the title column name.
    #[serde(default)]
    pub title_property: Option<String>,
    /// Ordered names hashed into the fingerprint: columns or relation properties.
    pub fingerprint: Vec<String>,
    #[serde(default)]
    pub tech_columns: TechColumns,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
}

impl TableSpec {
    #[must_use]
    pub fn title_property_name(&self) -> &str {
        self.title_property.as_deref().unwrap_or(&self.title_column)
    }

    /// Declared kind of a column, `Text` when undeclared.
    #[must_use]
    pub fn kind_of(&self, column: &str) -> FieldKind {
        self.fields
            .iter()
            .find(|f| f.column == column)
            .map_or(FieldKind::Text, |f| f.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let config: SyncConfig = serde_json::from_str(
            r#"{
                "tables": [{
                    "name": "RefEspece",
                    "collection_id": "db1",
                    "title_column": "Nom",
                    "fingerprint": ["Nom"]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.flush_batch, 20);
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.missing_image_url, DEFAULT_MISSING_IMAGE_URL);
        let table = &config.tables[0];
        assert_eq!(table.tech_columns.record_id, "notion_page_id");
        assert_eq!(table.title_property_name(), "Nom");
        assert_eq!(table.kind_of("Anything"), FieldKind::Text);
    }

    #[test]
    fn test_index_source_shapes() {
        let spec: IndexSpec = serde_json::from_str(
            r#"{
                "name": "espece",
                "policy": "first_wins",
                "source": {"sheet": {"table": "RefEspece", "key_columns": ["NumeroDex"], "id_column": "notion_page_id"}}
            }"#,
        )
        .unwrap();
        assert_eq!(spec.policy, IndexPolicy::FirstWins);
        assert_eq!(spec.key_fields(), ["NumeroDex".to_string()]);

        let spec: IndexSpec = serde_json::from_str(
            r#"{"name": "forme", "source": {"collection": {"collection_id": "db2", "key_properties": ["Id"]}}}"#,
        )
        .unwrap();
        assert_eq!(spec.policy, IndexPolicy::LastWins);
        assert!(matches!(spec.source, IndexSource::Collection { .. }));
    }

    #[test]
    fn test_field_property_defaults_to_column() {
        let field: FieldSpec =
            serde_json::from_str(r#"{"column": "PC Max", "kind": "number"}"#).unwrap();
        assert_eq!(field.property_name(), "PC Max");
        assert_eq!(field.kind, FieldKind::Number);
        assert!(!field.auto_create_options);
    }
}
