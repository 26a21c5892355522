//! Source rows and header-driven column lookup.

use std::collections::HashMap;

use crate::config::TechColumns;
use crate::sync::types::{SyncError, SyncResult};

/// Header row of a table, resolved to column positions.
///
/// When a header repeats, the first occurrence wins.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    table: String,
    columns: HashMap<String, usize>,
    width: usize,
}

impl SheetLayout {
    #[must_use]
    pub fn new(table: &str, headers: &[String]) -> Self {
        let mut columns = HashMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            columns.entry(header.trim().to_string()).or_insert(i);
        }
        Self {
            table: table.to_string(),
            columns,
            width: headers.len(),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Zero-based position of a header, if present.
    #[must_use]
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.get(column).copied()
    }

    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Resolve a required header.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingColumn` if the header is absent.
    pub fn require(&self, column: &str) -> SyncResult<usize> {
        self.position(column).ok_or_else(|| SyncError::MissingColumn {
            table: self.table.clone(),
            column: column.to_string(),
        })
    }

    /// Resolve the three technical columns by header name.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::MissingColumn` for the first absent header.
    pub fn tech_columns(&self, names: &TechColumns) -> SyncResult<TechColumnIndexes> {
        Ok(TechColumnIndexes {
            record_id: self.require(&names.record_id)?,
            last_sync: self.require(&names.last_sync)?,
            fingerprint: self.require(&names.fingerprint)?,
        })
    }
}

/// Zero-based positions of the technical columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechColumnIndexes {
    pub record_id: usize,
    pub last_sync: usize,
    pub fingerprint: usize,
}

/// One data row of a table, immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based sheet row number (the header is row 1).
    pub number: usize,
    pub cells: Vec<String>,
}

impl SourceRow {
    /// Wrap the data rows of a table, numbering them after the header.
    #[must_use]
    pub fn from_table(rows: Vec<Vec<String>>) -> Vec<Self> {
        rows.into_iter()
            .enumerate()
            .map(|(i, cells)| Self { number: i + 2, cells })
            .collect()
    }

    /// Raw cell at a position; missing trailing cells read as empty.
    #[must_use]
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map_or("", String::as_str)
    }

    /// Raw cell under a header; unknown headers read as empty.
    #[must_use]
    pub fn get(&self, layout: &SheetLayout, column: &str) -> &str {
        layout.position(column).map_or("", |i| self.cell(i))
    }

    /// True when every cell is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// Sync metadata persisted on a row by earlier runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub record_id: String,
    pub last_sync: String,
    pub fingerprint: String,
}

impl SyncState {
    #[must_use]
    pub fn from_row(row: &SourceRow, tech: TechColumnIndexes) -> Self {
        Self {
            record_id: row.cell(tech.record_id).trim().to_string(),
            last_sync: row.cell(tech.last_sync).trim().to_string(),
            fingerprint: row.cell(tech.fingerprint).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_layout_first_duplicate_wins() {
        let layout = SheetLayout::new("T", &headers(&["Nom", "Id", "Nom"]));
        assert_eq!(layout.position("Nom"), Some(0));
        assert_eq!(layout.position("Id"), Some(1));
        assert_eq!(layout.width(), 3);
    }

    #[test]
    fn test_tech_columns_resolved_by_name() {
        let layout = SheetLayout::new(
            "RefEspece",
            &headers(&["Nom", "image_url", "sync_hash", "notion_page_id", "last_sync"]),
        );
        let tech = layout.tech_columns(&TechColumns::default()).unwrap();
        assert_eq!(
            tech,
            TechColumnIndexes {
                record_id: 3,
                last_sync: 4,
                fingerprint: 2
            }
        );
    }

    #[test]
    fn test_missing_tech_column_is_error() {
        let layout = SheetLayout::new("RefEspece", &headers(&["Nom", "notion_page_id"]));
        let err = layout.tech_columns(&TechColumns::default()).unwrap_err();
        assert!(err.to_string().contains("last_sync"));
    }

    #[test]
    fn test_rows_numbered_after_header() {
        let rows = SourceRow::from_table(vec![vec!["a".into()], vec![]]);
        assert_eq!(rows[0].number, 2);
        assert_eq!(rows[1].number, 3);
        assert!(rows[1].is_blank());
        assert_eq!(rows[1].cell(5), "");
    }

    #[test]
    fn test_sync_state_trims() {
        let row = SourceRow {
            number: 2,
            cells: vec!["x".into(), " page-1 ".into(), "2025-01-01T00:00:00Z".into(), "abc ".into()],
        };
        let state = SyncState::from_row(
            &row,
            TechColumnIndexes {
                record_id: 1,
                last_sync: 2,
                fingerprint: 3,
            },
        );
        assert_eq!(state.record_id, "page-1");
        assert_eq!(state.fingerprint, "abc");
    }
}
