//! Target-store payloads.
//!
//! [`Properties`] is an ordered list of `(name, value)` pairs. The `set_*`
//! helpers skip a pair when its source value is absent, so only fields that
//! carry data are sent.

use serde::Serialize;

use crate::sync::normalize::ImageRef;

/// A typed property value understood by the target store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Number(f64),
    Checkbox(bool),
    Select(String),
    MultiSelect(Vec<String>),
    /// Related record ids.
    Relation(Vec<String>),
    /// ISO date, `YYYY-MM-DD`.
    Date(String),
    /// One external file.
    ExternalFile { url: String, name: String },
}

impl PropertyValue {
    /// Flat text form, as read back by an index over the collection.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Title(s) | Self::RichText(s) | Self::Select(s) | Self::Date(s) => s.clone(),
            Self::Number(n) => crate::sync::normalize::format_number(*n),
            Self::Checkbox(b) => b.to_string(),
            Self::MultiSelect(items) | Self::Relation(items) => items.join(","),
            Self::ExternalFile { url, .. } => url.clone(),
        }
    }
}

/// Record icon pointing at an external image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icon {
    pub url: String,
}

/// Ordered property bag for a create or update call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Properties {
    entries: Vec<(String, PropertyValue)>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a property, keeping first-insertion order.
    pub fn set(&mut self, name: &str, value: PropertyValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn set_title(&mut self, name: &str, text: &str) {
        self.set(name, PropertyValue::Title(text.to_string()));
    }

    /// Rich text, omitted when empty.
    pub fn set_rich_text(&mut self, name: &str, text: &str) {
        if !text.is_empty() {
            self.set(name, PropertyValue::RichText(text.to_string()));
        }
    }

    /// Select, omitted when empty.
    pub fn set_select(&mut self, name: &str, option: &str) {
        if !option.is_empty() {
            self.set(name, PropertyValue::Select(option.to_string()));
        }
    }

    /// Multi-select, omitted when the list is empty.
    pub fn set_multi_select(&mut self, name: &str, options: &[String]) {
        if !options.is_empty() {
            self.set(name, PropertyValue::MultiSelect(options.to_vec()));
        }
    }

    /// Number, omitted when null.
    pub fn set_number(&mut self, name: &str, number: Option<f64>) {
        if let Some(n) = number {
            self.set(name, PropertyValue::Number(n));
        }
    }

    /// Checkboxes are always sent.
    pub fn set_checkbox(&mut self, name: &str, checked: bool) {
        self.set(name, PropertyValue::Checkbox(checked));
    }

    /// Date, omitted when null.
    pub fn set_date(&mut self, name: &str, date: Option<&str>) {
        if let Some(d) = date {
            self.set(name, PropertyValue::Date(d.to_string()));
        }
    }

    /// Relation, omitted when nothing resolved.
    pub fn set_relation(&mut self, name: &str, ids: &[String]) {
        if !ids.is_empty() {
            self.set(name, PropertyValue::Relation(ids.to_vec()));
        }
    }

    pub fn set_image(&mut self, name: &str, image: &ImageRef) {
        self.set(
            name,
            PropertyValue::ExternalFile {
                url: image.url.clone(),
                name: image.name().to_string(),
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Plain text of the title property, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.entries.iter().find_map(|(_, v)| match v {
            PropertyValue::Title(t) => Some(t.as_str()),
            _ => None,
        })
    }
}
