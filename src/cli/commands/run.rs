//! Run command implementation.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::sync::{SyncEngine, TableReport};

#[derive(Serialize)]
struct RunOutput<'a> {
    tables: &'a [TableReport],
    created: usize,
    updated: usize,
    skipped: usize,
    failed: usize,
}

impl<'a> RunOutput<'a> {
    fn new(tables: &'a [TableReport]) -> Self {
        let sum = |f: fn(&TableReport) -> usize| -> usize { tables.iter().map(f).sum() };
        Self {
            tables,
            created: sum(|r| r.stats.created),
            updated: sum(|r| r.stats.updated),
            skipped: sum(|r| r.stats.skipped),
            failed: sum(|r| r.stats.failed),
        }
    }
}

/// Execute the run command.
///
/// Row failures are reported but do not fail the command; the next run
/// retries them.
///
/// # Errors
///
/// Returns an error on config problems or run-level sync failures.
pub async fn execute(config_path: Option<&Path>, tables: &[String], json: bool) -> Result<()> {
    let config = super::load(config_path)?;
    let (sheets, target) = super::connect(&config)?;

    let engine = SyncEngine::new(&config, &sheets, &target);
    let reports = engine.run(tables).await?;

    let output = RunOutput::new(&reports);
    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    for report in &reports {
        print_report(report);
    }
    if reports.len() > 1 {
        println!(
            "{} {} created, {} updated, {} skipped, {} failed",
            "Total:".bold(),
            output.created,
            output.updated,
            output.skipped,
            output.failed
        );
    }
    Ok(())
}

fn print_report(report: &TableReport) {
    let stats = &report.stats;
    let failed = if stats.failed > 0 {
        format!("{} failed", stats.failed).red().bold()
    } else {
        "0 failed".normal()
    };
    println!(
        "{} {} created, {} updated, {} skipped, {failed} ({} ms)",
        format!("{}:", report.table).cyan().bold(),
        stats.created.to_string().green(),
        stats.updated.to_string().yellow(),
        stats.skipped,
        report.elapsed_ms
    );
    for failure in &stats.failures {
        println!(
            "  {} row {} '{}': {}",
            "✗".red(),
            failure.row,
            failure.title,
            failure.reason
        );
    }
}
