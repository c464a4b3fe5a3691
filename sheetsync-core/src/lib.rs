//! sheetsync-core: agency spreadsheet synchronization
//!
//! Collects agency workbooks from a folder tree, upserts their store and
//! tablet rows into the sheets of a master workbook keyed by
//! `agencyId|storeId`, and notifies a webhook about new request rows.

pub mod audit;
pub mod config;
pub mod error;
pub mod notify;
pub mod reader;
pub mod sync;
pub mod writer;

use anyhow::{Context, Result};
use crate::reader::Workbook;
use std::path::Path;
use tracing::{debug, info};

pub use audit::{AuditLog, AuditSink};
pub use config::SyncConfig;
pub use error::{KeyError, SyncError};
pub use notify::{HttpPoster, NotifyReport, WebhookPoster};
pub use sync::collector::{FsCatalog, MemoryCatalog, SourceCatalog};
pub use sync::{SyncReport, Synchronizer, TableOutcome};

/// Options shared by the file-backed entry points
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Do all the work in memory but leave the master workbook file untouched
    pub dry_run: bool,
}

/// Synchronize the agency folder into the master workbook on disk.
///
/// The audit entries of the run, including a run-level failure, are appended
/// to the audit sheet. Only the cells written by the run are saved; a run that
/// wrote nothing leaves the file untouched.
pub fn run_sync(config: &SyncConfig, options: RunOptions) -> Result<SyncReport> {
    let mut master = reader::read_workbook(&config.master_workbook).with_context(|| {
        format!(
            "Failed to load master workbook: {}",
            config.master_workbook.display()
        )
    })?;
    let catalog = FsCatalog::new(config.source_sheet.clone());
    let mut audit = AuditLog::new();

    let result = Synchronizer::new(config).run(&catalog, &mut master, &mut audit);

    audit.append_to(&mut master, &config.audit_sheet);
    save_changes(&master, &config.master_workbook, options)?;

    Ok(result?)
}

/// Notify the webhook about pending request rows of the master workbook on disk
pub fn run_notify(config: &SyncConfig, options: RunOptions) -> Result<NotifyReport> {
    if options.dry_run {
        return run_notify_with(config, &notify::DryRunPoster, options);
    }
    let poster = HttpPoster::new(config.webhook.timeout_seconds)?;
    run_notify_with(config, &poster, options)
}

/// Same as [`run_notify`] with a caller-supplied webhook client
pub fn run_notify_with(
    config: &SyncConfig,
    poster: &dyn WebhookPoster,
    options: RunOptions,
) -> Result<NotifyReport> {
    // Without a URL there is nothing to do, not even a file to open
    if config.webhook_url().is_none() {
        return Ok(NotifyReport {
            skipped: true,
            ..NotifyReport::default()
        });
    }

    let mut master = reader::read_workbook(&config.master_workbook).with_context(|| {
        format!(
            "Failed to load master workbook: {}",
            config.master_workbook.display()
        )
    })?;
    let mut audit = AuditLog::new();

    let result = notify::notify_pending(&mut master, config, poster, &mut audit);
    if let Err(e) = &result {
        audit.record("notify", &format!("run aborted: {}", e));
    }

    audit.append_to(&mut master, &config.audit_sheet);
    save_changes(&master, &config.master_workbook, options)?;

    Ok(result?)
}

/// Write back the cells changed during a run, unless nothing changed or this is a dry run
fn save_changes(master: &Workbook, path: &Path, options: RunOptions) -> Result<()> {
    if options.dry_run {
        debug!("dry run, master workbook not saved");
        return Ok(());
    }
    if !master.has_changes() {
        debug!("no cells changed, master workbook not saved");
        return Ok(());
    }
    writer::update_workbook(master, path)?;
    info!(path = %path.display(), "master workbook saved");
    Ok(())
}
