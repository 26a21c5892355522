//! Status command implementation.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::sync::{SyncEngine, TablePreview};

#[derive(Serialize)]
struct StatusOutput<'a> {
    tables: &'a [TablePreview],
    pending: usize,
}

/// Execute the status command: classify every row without writing.
///
/// # Errors
///
/// Returns an error on config problems, unreadable sheets or index loads.
pub async fn execute(config_path: Option<&Path>, tables: &[String], json: bool) -> Result<()> {
    let config = super::load(config_path)?;
    let (sheets, target) = super::connect(&config)?;

    let engine = SyncEngine::new(&config, &sheets, &target);
    let previews = engine.preview(tables).await?;
    let pending = previews.iter().map(|p| p.plan.pending()).sum();

    if json {
        let output = StatusOutput {
            tables: &previews,
            pending,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "sheetsync status".bold());
    println!();
    for preview in &previews {
        let plan = &preview.plan;
        let invalid = if plan.invalid > 0 {
            format!(", {} without title", plan.invalid).red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<20} {} to create, {} to update, {} up to date{invalid}",
            preview.table.cyan(),
            plan.to_create.to_string().green(),
            plan.to_update.to_string().yellow(),
            plan.up_to_date
        );
    }
    println!();
    if pending == 0 {
        println!("{}", "Everything is up to date.".green());
    } else {
        println!("{pending} rows would be written by `sheetsync run`.");
    }
    Ok(())
}
