//! Version command implementation.

use crate::error::Result;
use crate::store::{notion, sheets};
use serde::Serialize;

/// Crate version plus the remote API versions this build speaks.
#[derive(Serialize)]
struct VersionOutput {
    version: &'static str,
    build: &'static str,
    notion_api: &'static str,
    sheets_api: &'static str,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build: if cfg!(debug_assertions) {
                "dev"
            } else {
                "release"
            },
            notion_api: notion::NOTION_VERSION,
            sheets_api: sheets::API_VERSION,
        }
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput::current();

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "sheetsync {} ({}), Notion API {}, Sheets API {}",
        output.version, output.build, output.notion_api, output.sheets_api
    );
    Ok(())
}
