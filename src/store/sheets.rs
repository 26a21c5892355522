//! Google Sheets v4 sheet store.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{CellUpdate, SheetData, SheetStore, StoreError, StoreResult, quote_table};

pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const API_VERSION: &str = "v4";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sheet store over one spreadsheet.
pub struct GoogleSheetStore {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

impl GoogleSheetStore {
    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the HTTP client cannot be built.
    pub fn new(spreadsheet_id: &str, token: &str) -> StoreResult<Self> {
        Self::with_base_url(spreadsheet_id, token, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns `StoreError::Transport` if the HTTP client cannot be built.
    pub fn with_base_url(spreadsheet_id: &str, token: &str, base_url: &str) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            token: token.to_string(),
        })
    }

    /// `{base}/spreadsheets/{id}/values/{last}`, with `last` percent-encoded.
    fn values_url(&self, last: &str) -> StoreResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| StoreError::Transport(format!("bad base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Transport("base URL cannot have a path".into()))?
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values", last]);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> StoreResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(sheets_error(status.as_u16(), &body))
    }
}

/// Map a Google API error body onto a [`StoreError`].
#[must_use]
pub fn sheets_error(status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => StoreError::Http {
            status,
            code: envelope.error.status.map(|s| s.to_lowercase()),
            message: envelope.error.message,
        },
        Err(_) => StoreError::Http {
            status,
            code: None,
            message: body.chars().take(200).collect(),
        },
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Split a value range into header and data rows.
fn into_sheet_data(range: ValueRange) -> SheetData {
    let mut rows = range
        .values
        .into_iter()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    SheetData {
        headers,
        rows: rows.collect(),
    }
}

/// Request body for a batched single-cell update.
#[must_use]
pub fn batch_update_body(updates: &[CellUpdate]) -> Value {
    let data: Vec<Value> = updates
        .iter()
        .map(|u| json!({ "range": u.range, "values": [[u.value]] }))
        .collect();
    json!({ "valueInputOption": "RAW", "data": data })
}

impl SheetStore for GoogleSheetStore {
    async fn read(&self, table: &str) -> StoreResult<SheetData> {
        let url = self.values_url(&quote_table(table))?;
        debug!("GET values {table}");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let range: ValueRange = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(format!("values of '{table}': {e}")))?;
        Ok(into_sheet_data(range))
    }

    async fn batch_write(&self, updates: &[CellUpdate]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.base_url, self.spreadsheet_id
        );

        debug!("POST values:batchUpdate ({} cells)", updates.len());
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&batch_update_body(updates))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_matches_base_url() {
        assert!(DEFAULT_BASE_URL.ends_with(&format!("/{API_VERSION}")));
    }

    #[test]
    fn test_values_url_encodes_table() {
        let store = GoogleSheetStore::new("sheet-1", "t").unwrap();
        let url = store.values_url(&quote_table("Ref Etat")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-1/values/'Ref%20Etat'"
        );
    }

    #[test]
    fn test_into_sheet_data() {
        let range: ValueRange = serde_json::from_value(json!({
            "range": "RefEtat!A1:D3",
            "values": [["Nom", "Id"], ["Normal", 1], ["Shiny"]]
        }))
        .unwrap();
        let data = into_sheet_data(range);
        assert_eq!(data.headers, vec!["Nom", "Id"]);
        assert_eq!(data.rows[0], vec!["Normal", "1"]);
        assert_eq!(data.rows[1], vec!["Shiny"]);
    }

    #[test]
    fn test_empty_sheet() {
        let data = into_sheet_data(ValueRange { values: vec![] });
        assert!(data.headers.is_empty());
        assert!(data.rows.is_empty());
    }

    #[test]
    fn test_batch_update_body() {
        let body = batch_update_body(&[CellUpdate {
            range: "RefEtat!K2".into(),
            value: "page-1".into(),
        }]);
        assert_eq!(body["valueInputOption"], "RAW");
        assert_eq!(body["data"][0]["range"], "RefEtat!K2");
        assert_eq!(body["data"][0]["values"][0][0], "page-1");
    }

    #[test]
    fn test_sheets_error_maps_status() {
        let err = sheets_error(
            429,
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("resource_exhausted"));
    }
}
