//! Notion REST target store.
//!
//! Records are pages in a database. Properties are encoded per type; query
//! results are flattened back to plain strings for index building.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{RecordPage, StoreError, StoreResult, TargetRecord, TargetStore};
use crate::sync::normalize::format_number;
use crate::sync::payload::{Icon, Properties, PropertyValue};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";

const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Select-like property as known from the database schema.
#[derive(Debug, Clone)]
struct SelectProperty {
    /// `select` or `multi_select`.
    kind: String,
    options: Vec<String>,
}

/// Target store speaking the Notion API.
pub struct NotionStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    /// Select schemas by database id. Held for the whole of `ensure_options`
    /// so concurrent rows never race on a schema update.
    schema: Mutex<HashMap<String, HashMap<String, SelectProperty>>>,
}

impl NotionStore {
    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the HTTP client cannot be built.
    pub fn new(token: &str) -> StoreResult<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the HTTP client cannot be built.
    pub fn with_base_url(token: &str, base_url: &str) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            schema: Mutex::new(HashMap::new()),
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> StoreResult<T> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION);
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{method} {path}");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(http_error(status.as_u16(), &text));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Decode(format!("{path}: {e}")))
    }

    async fn load_schema(&self, database_id: &str) -> StoreResult<HashMap<String, SelectProperty>> {
        let db: Value = self
            .send(reqwest::Method::GET, &format!("/databases/{database_id}"), None)
            .await?;
        Ok(select_schema(&db))
    }
}

/// Map a non-success response body onto a [`StoreError`].
#[must_use]
pub fn http_error(status: u16, body: &str) -> StoreError {
    #[derive(Deserialize)]
    struct ErrorBody {
        code: Option<String>,
        message: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => StoreError::Http {
            status,
            code: parsed.code,
            message: parsed.message.unwrap_or_default(),
        },
        Err(_) => StoreError::Http {
            status,
            code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "text": { "content": content } }])
}

/// JSON for one property value.
#[must_use]
pub fn encode_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(s) => json!({ "title": rich_text(s) }),
        PropertyValue::RichText(s) => json!({ "rich_text": rich_text(s) }),
        PropertyValue::Number(n) => {
            // whole numbers go out as integers
            let number: Value = format_number(*n)
                .parse::<i64>()
                .map_or_else(|_| json!(n), Value::from);
            json!({ "number": number })
        }
        PropertyValue::Checkbox(b) => json!({ "checkbox": b }),
        PropertyValue::Select(s) => json!({ "select": { "name": s } }),
        PropertyValue::MultiSelect(items) => {
            json!({ "multi_select": items.iter().map(|n| json!({ "name": n })).collect::<Vec<_>>() })
        }
        PropertyValue::Relation(ids) => {
            json!({ "relation": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>() })
        }
        PropertyValue::Date(d) => json!({ "date": { "start": d } }),
        PropertyValue::ExternalFile { url, name } => json!({
            "files": [{ "type": "external", "name": name, "external": { "url": url } }]
        }),
    }
}

/// JSON object of every property.
#[must_use]
pub fn encode_properties(properties: &Properties) -> Value {
    let mut map = Map::new();
    for (name, value) in properties.iter() {
        map.insert(name.to_string(), encode_value(value));
    }
    Value::Object(map)
}

fn encode_icon(icon: &Icon) -> Value {
    json!({ "type": "external", "external": { "url": icon.url } })
}

fn join_text(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.pointer("/text/content"))
                        .and_then(Value::as_str)
                })
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn join_names(items: Option<&Value>, key: &str) -> String {
    items
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get(key).and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn number_text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_f64)
        .map(format_number)
        .unwrap_or_default()
}

/// Flatten one property of a page to plain text.
#[must_use]
pub fn flatten_value(property: &Value) -> String {
    let kind = property.get("type").and_then(Value::as_str).unwrap_or_default();
    let inner = property.get(kind);
    match kind {
        "title" | "rich_text" => join_text(inner),
        "number" => number_text(inner),
        "checkbox" => inner.and_then(Value::as_bool).unwrap_or(false).to_string(),
        "select" | "status" => inner
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "multi_select" => join_names(inner, "name"),
        "relation" => join_names(inner, "id"),
        "date" => inner
            .and_then(|v| v.get("start"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "unique_id" => {
            let number = number_text(inner.and_then(|v| v.get("number")));
            match inner.and_then(|v| v.get("prefix")).and_then(Value::as_str) {
                Some(prefix) if !number.is_empty() => format!("{prefix}-{number}"),
                _ => number,
            }
        }
        "formula" => inner.map(flatten_value).unwrap_or_default(),
        "string" | "url" | "email" | "phone_number" => {
            inner.and_then(Value::as_str).unwrap_or_default().to_string()
        }
        "boolean" => inner.and_then(Value::as_bool).unwrap_or(false).to_string(),
        _ => String::new(),
    }
}

/// Flatten a page object into a [`TargetRecord`].
#[must_use]
pub fn flatten_page(page: &Value) -> TargetRecord {
    let id = page.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let fields = page
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, value)| (name.clone(), flatten_value(value)))
                .collect()
        })
        .unwrap_or_default();
    TargetRecord { id, fields }
}

fn select_schema(database: &Value) -> HashMap<String, SelectProperty> {
    let mut schema = HashMap::new();
    let Some(props) = database.get("properties").and_then(Value::as_object) else {
        return schema;
    };
    for (name, prop) in props {
        let Some(kind) = prop.get("type").and_then(Value::as_str) else {
            continue;
        };
        if kind != "select" && kind != "multi_select" {
            continue;
        }
        let options = prop
            .pointer(&format!("/{kind}/options"))
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|o| o.get("name").and_then(Value::as_str).map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        schema.insert(
            name.clone(),
            SelectProperty {
                kind: kind.to_string(),
                options,
            },
        );
    }
    schema
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

impl TargetStore for NotionStore {
    async fn create(
        &self,
        collection_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> StoreResult<String> {
        let mut body = json!({
            "parent": { "database_id": collection_id },
            "properties": encode_properties(properties),
        });
        if let Some(icon) = icon {
            body["icon"] = encode_icon(icon);
        }
        let page: CreatedPage = self
            .send(reqwest::Method::POST, "/pages", Some(&body))
            .await?;
        Ok(page.id)
    }

    async fn update(
        &self,
        record_id: &str,
        properties: &Properties,
        icon: Option<&Icon>,
    ) -> StoreResult<()> {
        let mut body = json!({ "properties": encode_properties(properties) });
        if let Some(icon) = icon {
            body["icon"] = encode_icon(icon);
        }
        let _: Value = self
            .send(
                reqwest::Method::PATCH,
                &format!("/pages/{record_id}"),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn query_page(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> StoreResult<RecordPage> {
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(cursor) = cursor {
            body["start_cursor"] = json!(cursor);
        }
        let response: QueryResponse = self
            .send(
                reqwest::Method::POST,
                &format!("/databases/{collection_id}/query"),
                Some(&body),
            )
            .await?;
        Ok(RecordPage {
            records: response.results.iter().map(flatten_page).collect(),
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        })
    }

    async fn ensure_options(
        &self,
        collection_id: &str,
        property: &str,
        values: &[String],
    ) -> StoreResult<()> {
        let mut schema = self.schema.lock().await;
        if !schema.contains_key(collection_id) {
            let loaded = self.load_schema(collection_id).await?;
            schema.insert(collection_id.to_string(), loaded);
        }
        let Some(known) = schema
            .get_mut(collection_id)
            .and_then(|props| props.get_mut(property))
        else {
            return Err(StoreError::NotFound(format!(
                "select property '{property}' in database {collection_id}"
            )));
        };

        let missing: Vec<&String> = values.iter().filter(|v| !known.options.contains(*v)).collect();
        if missing.is_empty() {
            return Ok(());
        }

        let mut options: Vec<Value> = known.options.iter().map(|n| json!({ "name": n })).collect();
        options.extend(missing.iter().map(|n| json!({ "name": n })));
        let kind = known.kind.clone();
        let body = json!({ "properties": { property: { kind.as_str(): { "options": options } } } });

        let _: Value = self
            .send(
                reqwest::Method::PATCH,
                &format!("/databases/{collection_id}"),
                Some(&body),
            )
            .await?;

        info!("Added {} option(s) to '{property}': {:?}", missing.len(), missing);
        known.options.extend(missing.into_iter().cloned());
        Ok(())
    }
}
