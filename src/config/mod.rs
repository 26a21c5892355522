//! Configuration management.
//!
//! This module resolves the config file location, loads and validates the
//! JSON document, and collects credentials from the environment.
//!
//! # Resolution
//!
//! Config path priority:
//! 1. `--config <path>`
//! 2. `SHEETSYNC_CONFIG` environment variable
//! 3. Platform config directory: `<config_dir>/sheetsync/config.json`
//!
//! Credentials never live in the file: `NOTION_TOKEN`, `GOOGLE_SHEETS_TOKEN`
//! and `GOOGLE_SHEET_ID` (which overrides `spreadsheet_id`).

mod types;

pub use types::{
    DEFAULT_MISSING_IMAGE_URL, FieldKind, FieldSpec, ImageSpec, IndexPolicy, IndexSource,
    IndexSpec, RelationSpec, RetrySettings, SyncConfig, TableSpec, TechColumns,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CONFIG_ENV: &str = "SHEETSYNC_CONFIG";
pub const NOTION_TOKEN_ENV: &str = "NOTION_TOKEN";
pub const SHEETS_TOKEN_ENV: &str = "GOOGLE_SHEETS_TOKEN";
pub const SHEET_ID_ENV: &str = "GOOGLE_SHEET_ID";

/// Default config file location for this platform.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sheetsync").map(|d| d.config_dir().join("config.json"))
}

/// Resolve the config file path.
///
/// Returns `None` only when no explicit path is given, the env var is unset,
/// and the platform has no config directory.
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: SHEETSYNC_CONFIG environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// Read, parse and validate a config file.
///
/// # Errors
///
/// Returns `Error::ConfigNotFound` if the file does not exist, or
/// `Error::Config` if it cannot be parsed or fails validation.
pub fn load_config(path: &Path) -> Result<SyncConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(Error::Io(e)),
    };
    let config: SyncConfig = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

impl SyncConfig {
    /// Check cross-references and limits.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Config(msg));

        if self.tables.is_empty() {
            return fail("no tables configured".into());
        }
        if self.concurrency == 0 {
            return fail("concurrency must be at least 1".into());
        }
        if self.flush_batch == 0 {
            return fail("flush_batch must be at least 1".into());
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return fail(format!("duplicate index '{}'", index.name));
            }
            if index.key_fields().is_empty() {
                return fail(format!("index '{}' has no key columns", index.name));
            }
        }

        let mut table_names = HashSet::new();
        for table in &self.tables {
            if !table_names.insert(table.name.as_str()) {
                return fail(format!("duplicate table '{}'", table.name));
            }
            if table.title_column.trim().is_empty() {
                return fail(format!("table '{}' has an empty title_column", table.name));
            }
            if table.collection_id.trim().is_empty() {
                return fail(format!("table '{}' has an empty collection_id", table.name));
            }
            for relation in &table.relations {
                if !index_names.contains(relation.index.as_str()) {
                    return fail(format!(
                        "table '{}': relation '{}' uses unknown index '{}'",
                        table.name, relation.property, relation.index
                    ));
                }
                if relation.columns.is_empty() {
                    return fail(format!(
                        "table '{}': relation '{}' has no key columns",
                        table.name, relation.property
                    ));
                }
            }
        }
        Ok(())
    }

    /// Look up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Secrets and ids read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub notion_token: String,
    pub sheets_token: String,
    pub spreadsheet_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("notion_token", &"***")
            .field("sheets_token", &"***")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingEnv` naming the first unset variable.
    pub fn from_env(config: &SyncConfig) -> Result<Self> {
        Self::from_lookup(config, |var| std::env::var(var).ok())
    }

    /// Read credentials through `lookup`; empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingEnv` naming the first unset variable.
    pub fn from_lookup(
        config: &SyncConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let notion_token = get(NOTION_TOKEN_ENV).ok_or(Error::MissingEnv {
            var: NOTION_TOKEN_ENV,
        })?;
        let sheets_token = get(SHEETS_TOKEN_ENV).ok_or(Error::MissingEnv {
            var: SHEETS_TOKEN_ENV,
        })?;
        let spreadsheet_id = get(SHEET_ID_ENV)
            .or_else(|| config.spreadsheet_id.clone().filter(|s| !s.trim().is_empty()))
            .ok_or(Error::MissingEnv { var: SHEET_ID_ENV })?;

        Ok(Self {
            notion_token,
            sheets_token,
            spreadsheet_id,
        })
    }
}
