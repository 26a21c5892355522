//! Command implementations.

pub mod check;
pub mod completions;
pub mod run;
pub mod status;
pub mod version;

use std::path::Path;

use crate::config::{Credentials, SyncConfig, load_config, resolve_config_path};
use crate::error::{Error, Result};
use crate::store::notion::NotionStore;
use crate::store::sheets::GoogleSheetStore;

/// Resolve, load and validate the config file.
fn load(config_path: Option<&Path>) -> Result<SyncConfig> {
    let path = resolve_config_path(config_path)
        .ok_or_else(|| Error::Config("no config path and no platform config directory".into()))?;
    load_config(&path)
}

/// HTTP stores built from env credentials.
fn connect(config: &SyncConfig) -> Result<(GoogleSheetStore, NotionStore)> {
    let creds = Credentials::from_env(config)?;
    let sheets = GoogleSheetStore::new(&creds.spreadsheet_id, &creds.sheets_token)
        .map_err(|e| Error::Other(e.to_string()))?;
    let target =
        NotionStore::new(&creds.notion_token).map_err(|e| Error::Other(e.to_string()))?;
    Ok((sheets, target))
}
