//! Row normalization.
//!
//! Turns raw sheet cells into typed values. Every function here is pure:
//! the same cells always produce the same record.
//!
//! | Kind        | Rule                                                        |
//! |-------------|-------------------------------------------------------------|
//! | text        | trimmed, absent → empty                                     |
//! | checkbox    | case-insensitive member of `yes`, `true`, `1`, `oui`        |
//! | number      | parsed, empty or non-numeric → null (never 0)               |
//! | date        | `YYYY-MM-DD`, `DD/MM/YYYY`, or a generic date → `YYYY-MM-DD` |
//! | list        | split on `,`, trimmed, empties dropped, order kept          |
//! | image       | sentinel or non-http value → fallback URL + missing flag    |

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::config::{FieldKind, TableSpec};
use crate::sync::row::{SheetLayout, SourceRow};

/// Tokens read as `true` by checkbox fields.
const TRUE_TOKENS: [&str; 4] = ["yes", "true", "1", "oui"];

/// Image cells meaning "no image available".
const UNAVAILABLE_MARKERS: [&str; 3] = ["indispo", "n/a", "na"];

/// An image reference after sentinel resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    /// The fallback URL replaced an unusable cell value.
    pub missing: bool,
}

impl ImageRef {
    /// Display name for the file entry.
    #[must_use]
    pub fn name(&self) -> &str {
        if self.missing {
            return "missing";
        }
        self.url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("image.png")
    }
}

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Option<f64>),
    Bool(bool),
    Date(Option<String>),
    List(Vec<String>),
    Image(Option<ImageRef>),
}

impl FieldValue {
    /// Canonical string used for fingerprinting; null → empty.
    #[must_use]
    pub fn hash_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.map(format_number).unwrap_or_default(),
            Self::Bool(b) => b.to_string(),
            Self::Date(d) => d.clone().unwrap_or_default(),
            Self::List(items) => items.join(","),
            Self::Image(img) => img.as_ref().map(|i| i.url.clone()).unwrap_or_default(),
        }
    }
}

/// Shortest textual form of a number: whole values drop the fraction.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = n as i64;
        whole.to_string()
    } else {
        n.to_string()
    }
}

/// Typed projection of the columns a table cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    fields: HashMap<String, FieldValue>,
}

impl NormalizedRecord {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Text of a column, empty when absent or not text.
    #[must_use]
    pub fn text(&self, column: &str) -> &str {
        match self.fields.get(column) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.insert(column.into(), value);
    }

    /// The resolved image, if the table declares one and the cell had a value.
    #[must_use]
    pub fn image(&self, column: &str) -> Option<&ImageRef> {
        match self.fields.get(column) {
            Some(FieldValue::Image(img)) => img.as_ref(),
            _ => None,
        }
    }
}

/// Normalize the columns of `row` that `table` refers to.
#[must_use]
pub fn normalize(
    row: &SourceRow,
    layout: &SheetLayout,
    table: &TableSpec,
    missing_image_url: &str,
) -> NormalizedRecord {
    let mut record = NormalizedRecord::default();

    let referenced = std::iter::once(&table.title_column)
        .chain(table.fields.iter().map(|f| &f.column))
        .chain(table.relations.iter().flat_map(|r| r.columns.iter()))
        .chain(table.fingerprint.iter().filter(|name| layout.has(name)));

    for column in referenced {
        let raw = row.get(layout, column);
        record.insert(column.clone(), normalize_cell(raw, table.kind_of(column)));
    }

    if let Some(image) = &table.image {
        let raw = row.get(layout, &image.column);
        record.insert(
            image.column.clone(),
            FieldValue::Image(resolve_image(raw, missing_image_url)),
        );
    }

    record
}

/// Apply the policy of one field kind to a raw cell.
#[must_use]
pub fn normalize_cell(raw: &str, kind: FieldKind) -> FieldValue {
    match kind {
        FieldKind::Text | FieldKind::Select => FieldValue::Text(raw.trim().to_string()),
        FieldKind::Number => FieldValue::Number(parse_number(raw)),
        FieldKind::Checkbox => FieldValue::Bool(parse_bool(raw)),
        FieldKind::Date => FieldValue::Date(parse_date(raw)),
        FieldKind::MultiSelect => FieldValue::List(split_list(raw)),
    }
}

#[must_use]
pub fn parse_bool(raw: &str) -> bool {
    let lower = raw.trim().to_lowercase();
    TRUE_TOKENS.contains(&lower.as_str())
}

#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Normalize a date cell to `YYYY-MM-DD`.
#[must_use]
pub fn parse_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    if let Some(date) = parse_day_first(s) {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    parse_generic(s).map(|d| d.format("%Y-%m-%d").to_string())
}

/// `D/M/YYYY` or `DD/MM/YYYY`.
fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some()
        || !(1..=2).contains(&day.len())
        || !(1..=2).contains(&month.len())
        || year.len() != 4
    {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    ["%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Resolve an image cell: empty → none, unusable → fallback flagged missing.
#[must_use]
pub fn resolve_image(raw: &str, fallback: &str) -> Option<ImageRef> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if is_usable_url(raw) {
        Some(ImageRef {
            url: raw.to_string(),
            missing: false,
        })
    } else {
        Some(ImageRef {
            url: fallback.to_string(),
            missing: true,
        })
    }
}

fn is_usable_url(value: &str) -> bool {
    let lower = value.to_lowercase();
    if UNAVAILABLE_MARKERS.contains(&lower.as_str()) || lower.contains("indispo") {
        return false;
    }
    reqwest::Url::parse(value).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}
