//! Output formatters for run reports

use anyhow::Result;
use colored::*;
use serde::Serialize;
use sheetsync_core::{NotifyReport, SyncReport, TableOutcome};

/// Print a sync report in human-readable format with colors
pub fn print_sync_human(report: &SyncReport, dry_run: bool) {
    if dry_run {
        println!("{}", "[DRY RUN] master workbook not saved".yellow().bold());
    }

    println!("{}", "Source tables:".bold().underline());
    if report.tables.is_empty() {
        println!("  {}", "no source tables found".bright_black());
    }
    for table in &report.tables {
        let status = match &table.outcome {
            TableOutcome::FilteredOut => "FILTERED".bright_black().bold(),
            TableOutcome::HeaderInvalid { .. } => "HEADER".yellow().bold(),
            TableOutcome::Done { .. } => "DONE".green().bold(),
            TableOutcome::DoneWithError { .. } => "ERROR".red().bold(),
        };
        let detail = match &table.outcome {
            TableOutcome::FilteredOut => String::new(),
            TableOutcome::HeaderInvalid { missing } => format!("missing {}", missing.join(", ")),
            TableOutcome::Done {
                rows,
                rejected,
                stop,
            } => format!("{} rows, {} rejected, stopped at {:?}", rows, rejected, stop),
            TableOutcome::DoneWithError { error } => error.clone(),
        };
        println!("  {} {} {}", status, table.name.cyan(), detail.bright_black());
    }
    println!();

    println!("{}", "Destinations:".bold().underline());
    for dest in &report.destinations {
        match &dest.skipped {
            Some(reason) => println!("  {} {}", dest.sheet.cyan().bold(), reason.yellow()),
            None => println!(
                "  {} {} inserted, {} updated, {} cells written",
                dest.sheet.cyan().bold(),
                dest.inserted.to_string().green(),
                dest.updated,
                dest.cells_written
            ),
        }
    }
}

/// Print a notify report in human-readable format
pub fn print_notify_human(report: &NotifyReport) {
    if report.skipped {
        println!("{}", "Webhook URL not configured, nothing sent".bright_black());
        return;
    }
    if report.sent == 0 && report.failed == 0 {
        println!("{}", "✓ No pending requests".green().bold());
        return;
    }
    println!("{} {}", "Sent:".bold(), report.sent.to_string().green());
    if report.failed > 0 {
        println!("{} {}", "Failed:".bold(), report.failed.to_string().red());
    }
}

/// Print any report as pretty JSON
pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
