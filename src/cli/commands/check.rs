//! Check command implementation.
//!
//! Validates the config file and the environment without touching the
//! network, then lists what a run would process.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::config::{Credentials, IndexSource, SyncConfig, TableSpec};
use crate::error::Result;

#[derive(Serialize)]
struct CheckOutput<'a> {
    spreadsheet_id: &'a str,
    concurrency: usize,
    flush_batch: usize,
    indexes: Vec<IndexInfo<'a>>,
    tables: Vec<TableInfo<'a>>,
}

#[derive(Serialize)]
struct IndexInfo<'a> {
    name: &'a str,
    source: String,
}

#[derive(Serialize)]
struct TableInfo<'a> {
    name: &'a str,
    collection_id: &'a str,
    title_column: &'a str,
    fields: usize,
    relations: Vec<&'a str>,
    image: bool,
}

impl<'a> TableInfo<'a> {
    fn new(table: &'a TableSpec) -> Self {
        Self {
            name: &table.name,
            collection_id: &table.collection_id,
            title_column: &table.title_column,
            fields: table.fields.len(),
            relations: table.relations.iter().map(|r| r.property.as_str()).collect(),
            image: table.image.is_some(),
        }
    }
}

fn describe_source(source: &IndexSource) -> String {
    match source {
        IndexSource::Sheet {
            table, key_columns, ..
        } => format!("sheet {table} [{}]", key_columns.join(", ")),
        IndexSource::Collection {
            collection_id,
            key_properties,
        } => format!("collection {collection_id} [{}]", key_properties.join(", ")),
    }
}

fn summarize<'a>(config: &'a SyncConfig, creds: &'a Credentials) -> CheckOutput<'a> {
    CheckOutput {
        spreadsheet_id: &creds.spreadsheet_id,
        concurrency: config.concurrency,
        flush_batch: config.flush_batch,
        indexes: config
            .indexes
            .iter()
            .map(|i| IndexInfo {
                name: &i.name,
                source: describe_source(&i.source),
            })
            .collect(),
        tables: config.tables.iter().map(TableInfo::new).collect(),
    }
}

/// Execute the check command.
///
/// # Errors
///
/// Returns the first config or environment problem found.
pub fn execute(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = super::load(config_path)?;
    let creds = Credentials::from_env(&config)?;
    let output = summarize(&config, &creds);

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} config and environment look good", "✓".green());
    println!();
    println!("Spreadsheet: {}", output.spreadsheet_id);
    println!(
        "Concurrency: {}, write-back batch: {}",
        output.concurrency, output.flush_batch
    );

    if !output.indexes.is_empty() {
        println!();
        println!("{}", "Indexes".cyan().bold());
        for index in &output.indexes {
            println!("  {:<16} {}", index.name, index.source.dimmed());
        }
    }

    println!();
    println!("{}", "Tables".cyan().bold());
    for table in &output.tables {
        let relations = if table.relations.is_empty() {
            String::new()
        } else {
            format!(", relations: {}", table.relations.join(", "))
        };
        println!(
            "  {:<16} -> {} ({} fields{relations})",
            table.name.bold(),
            table.collection_id,
            table.fields
        );
    }
    Ok(())
}
