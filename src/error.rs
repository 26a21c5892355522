//! Error types for the sheetsync CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=config, 3=sheet, 4=target, 5=write-back)
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers
//!
//! Row-level failures never reach this type; they are counted in the run
//! summary instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Result type alias for sheetsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Config (exit 2)
    ConfigError,
    ConfigNotFound,
    MissingEnv,
    MissingColumn,
    UnknownTable,

    // Sheet (exit 3)
    SheetReadError,

    // Target store (exit 4)
    IndexLoadError,

    // Write-back (exit 5)
    WriteBackError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::MissingEnv => "MISSING_ENV",
            Self::MissingColumn => "MISSING_COLUMN",
            Self::UnknownTable => "UNKNOWN_TABLE",
            Self::SheetReadError => "SHEET_READ_ERROR",
            Self::IndexLoadError => "INDEX_LOAD_ERROR",
            Self::WriteBackError => "WRITE_BACK_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::ConfigError
            | Self::ConfigNotFound
            | Self::MissingEnv
            | Self::MissingColumn
            | Self::UnknownTable => 2,
            Self::SheetReadError => 3,
            Self::IndexLoadError => 4,
            Self::WriteBackError => 5,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running unchanged may succeed.
    ///
    /// Remote failures may be transient; config and local errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SheetReadError | Self::IndexLoadError | Self::WriteBackError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Run-level errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Missing environment variable: {var}")]
    MissingEnv { var: &'static str },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigError,
            Self::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Self::MissingEnv { .. } => ErrorCode::MissingEnv,
            Self::Sync(err) => match err {
                SyncError::MissingColumn { .. } => ErrorCode::MissingColumn,
                SyncError::UnknownIndex(_) => ErrorCode::ConfigError,
                SyncError::UnknownTable(_) => ErrorCode::UnknownTable,
                SyncError::SheetRead { .. } => ErrorCode::SheetReadError,
                SyncError::IndexLoad { .. } => ErrorCode::IndexLoadError,
                SyncError::WriteBack { .. } => ErrorCode::WriteBackError,
            },
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ConfigNotFound { path } => Some(format!(
                "Create {} (see config.example.json) or pass --config <path>.",
                path.display()
            )),

            Self::MissingEnv { var } => Some(format!("Export {var} before running sheetsync.")),

            Self::Sync(SyncError::MissingColumn { table, column }) => Some(format!(
                "Add a '{column}' header to table '{table}', or map it under tech_columns."
            )),

            Self::Sync(SyncError::UnknownTable(_)) => {
                Some("Run `sheetsync check` to list configured tables.".to_string())
            }

            Self::Sync(SyncError::WriteBack { written, .. }) => Some(format!(
                "{written} rows were persisted before the failure. Records created after \
                 the last successful batch have no id on the sheet and will be created again."
            )),

            Self::Sync(SyncError::SheetRead { .. } | SyncError::IndexLoad { .. }) => {
                Some("Check credentials and network access, then re-run.".to_string())
            }

            Self::Config(_)
            | Self::Sync(SyncError::UnknownIndex(_))
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
