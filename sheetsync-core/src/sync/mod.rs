//! Agency-to-master synchronization
//!
//! Every run rebuilds its header maps and key indexes from the master
//! workbook, walks the source folder, and upserts each valid source row into
//! every destination sheet. Writes for one source table are staged and
//! applied together, so a table that fails leaves the master untouched.

pub mod collector;
pub mod headers;
pub mod keymap;
pub mod record;
pub mod upsert;

use crate::audit::AuditSink;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::reader::Workbook;
use collector::{SourceCatalog, SourceRef, collect_tables, matches_filter};
use headers::{HeaderNames, resolve_headers};
use record::{ScanStop, scan_source};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use upsert::{Destination, UpsertKind, WriteBatch};

const AUDIT_CONTEXT: &str = "sync";

/// Final state of one discovered source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TableOutcome {
    /// Name did not match the filter; never opened
    FilteredOut,
    /// A required source column is missing
    HeaderInvalid { missing: Vec<String> },
    Done {
        rows: usize,
        rejected: usize,
        stop: ScanStop,
    },
    /// Processing failed; nothing from this table was written
    DoneWithError { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub id: String,
    pub name: String,
    pub outcome: TableOutcome,
}

/// Per destination sheet counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DestinationReport {
    pub sheet: String,
    pub inserted: usize,
    pub updated: usize,
    pub cells_written: usize,
    /// Set when the sheet lacks its key columns and was left out of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tables: Vec<TableReport>,
    pub destinations: Vec<DestinationReport>,
}

impl SyncReport {
    pub fn count(&self, predicate: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| predicate(&t.outcome)).count()
    }

    pub fn inserted(&self) -> usize {
        self.destinations.iter().map(|d| d.inserted).sum()
    }

    pub fn updated(&self) -> usize {
        self.destinations.iter().map(|d| d.updated).sum()
    }
}

/// Runs the synchronization workflow against an in-memory master workbook
pub struct Synchronizer<'a> {
    config: &'a SyncConfig,
}

impl<'a> Synchronizer<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    /// Synchronize every matching source table into the destination sheets.
    ///
    /// Only run-level failures are returned (missing configuration, missing
    /// destination sheet, unreadable root folder); they are also recorded in
    /// the audit sink. Table and row failures are logged and skipped.
    pub fn run(
        &self,
        catalog: &dyn SourceCatalog,
        master: &mut Workbook,
        audit: &mut dyn AuditSink,
    ) -> Result<SyncReport, SyncError> {
        self.try_run(catalog, master, audit).inspect_err(|e| {
            error!(error = %e, "sync run aborted");
            audit.record(AUDIT_CONTEXT, &format!("run aborted: {}", e));
        })
    }

    fn try_run(
        &self,
        catalog: &dyn SourceCatalog,
        master: &mut Workbook,
        audit: &mut dyn AuditSink,
    ) -> Result<SyncReport, SyncError> {
        let config = self.config;
        let root = config.root_folder()?.to_string_lossy().into_owned();
        config.validate()?;
        let source_names = config.source_headers()?;
        let required = config.required_source_fields()?;

        let mut report = SyncReport::default();
        let mut destinations = Vec::new();
        for dest_config in &config.destinations {
            let table = master
                .get_table(&dest_config.sheet)
                .ok_or_else(|| SyncError::MissingDestinationSheet(dest_config.sheet.clone()))?;
            let names = config.destination_headers(dest_config)?;
            match Destination::prepare(table, &names) {
                Ok(dest) => {
                    debug!(
                        sheet = %dest.sheet,
                        keys = dest.index().len(),
                        next_row = dest.next_row(),
                        "destination indexed"
                    );
                    report.destinations.push(DestinationReport {
                        sheet: dest.sheet.clone(),
                        ..DestinationReport::default()
                    });
                    destinations.push(dest);
                }
                Err(missing) => {
                    let e = missing.into_error(&dest_config.sheet);
                    warn!(error = %e, "destination skipped");
                    audit.record(AUDIT_CONTEXT, &e.to_string());
                    report.destinations.push(DestinationReport {
                        sheet: dest_config.sheet.clone(),
                        skipped: Some(e.to_string()),
                        ..DestinationReport::default()
                    });
                }
            }
        }

        let sources = collect_tables(catalog, &root).map_err(|source| SyncError::Read {
            name: root.clone(),
            source,
        })?;
        info!(root = %root, found = sources.len(), "source tables collected");

        for source in sources {
            let outcome = self.process_table(
                catalog,
                &source,
                &source_names,
                &required,
                master,
                &mut destinations,
                &mut report.destinations,
                audit,
            );
            report.tables.push(TableReport {
                id: source.id,
                name: source.name,
                outcome,
            });
        }

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_table(
        &self,
        catalog: &dyn SourceCatalog,
        source: &SourceRef,
        source_names: &HeaderNames,
        required: &[headers::Field],
        master: &mut Workbook,
        destinations: &mut Vec<Destination>,
        counters: &mut [DestinationReport],
        audit: &mut dyn AuditSink,
    ) -> TableOutcome {
        if !matches_filter(&source.name, &self.config.name_filter) {
            debug!(table = %source.name, "name does not match filter");
            return TableOutcome::FilteredOut;
        }

        let table = match catalog.open_table(&source.id) {
            Ok(table) => table,
            Err(source_err) => {
                let e = SyncError::Read {
                    name: source.name.clone(),
                    source: source_err,
                };
                error!(error = %e, "source table failed");
                audit.record(AUDIT_CONTEXT, &e.to_string());
                return TableOutcome::DoneWithError {
                    error: e.to_string(),
                };
            }
        };

        let columns = match resolve_headers(&table.header_row(), source_names, required) {
            Ok(columns) => columns,
            Err(missing) => {
                let e = missing.clone().into_error(&source.name);
                warn!(error = %e, "source table skipped");
                audit.record(AUDIT_CONTEXT, &e.to_string());
                return TableOutcome::HeaderInvalid { missing: missing.0 };
            }
        };

        let scan = scan_source(&table, &columns, self.config.limits);
        for rejected in &scan.rejected {
            let e = SyncError::InvalidCompositeKey {
                row: rejected.row,
                reason: rejected.reason,
            };
            warn!(table = %source.name, error = %e, "row skipped");
            audit.record(AUDIT_CONTEXT, &format!("{}: {}", source.name, e));
        }

        // Stage against copies so nothing is committed if the table fails
        let mut staged: Vec<(Destination, WriteBatch, usize, usize)> = destinations
            .iter()
            .map(|d| (d.clone(), WriteBatch::default(), 0, 0))
            .collect();
        for source_row in &scan.accepted {
            for (dest, batch, inserted, updated) in staged.iter_mut() {
                match dest.upsert(&source_row.key, &source_row.record, batch) {
                    UpsertKind::Insert => *inserted += 1,
                    UpsertKind::Update => *updated += 1,
                }
            }
        }

        let mut committed = Vec::with_capacity(staged.len());
        for (dest, batch, inserted, updated) in staged {
            if let Some(table) = master.get_table_mut(&dest.sheet) {
                let written = batch.flush(table);
                if let Some(counter) = counters.iter_mut().find(|c| c.sheet == dest.sheet) {
                    counter.inserted += inserted;
                    counter.updated += updated;
                    counter.cells_written += written;
                }
            }
            committed.push(dest);
        }
        *destinations = committed;

        info!(
            table = %source.name,
            rows = scan.accepted.len(),
            rejected = scan.rejected.len(),
            stop = ?scan.stop,
            "source table synchronized"
        );
        TableOutcome::Done {
            rows: scan.accepted.len(),
            rejected: scan.rejected.len(),
            stop: scan.stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::config::DestinationConfig;
    use crate::reader::Table;
    use collector::MemoryCatalog;

    const SOURCE_HEADER: &[&str] = &[
        "Agency ID",
        "Store ID",
        "Temp Store ID",
        "Store Name",
        "Tablet Device ID",
        "Tablet SN",
    ];

    fn agency_table(rows: &[&[&str]]) -> Table {
        let mut all: Vec<&[&str]> = Vec::new();
        all.push(SOURCE_HEADER);
        all.push(&["Agency metadata"]);
        all.extend_from_slice(rows);
        Table::from_text_rows("Stores", &all)
    }

    fn master() -> Workbook {
        let mut workbook = Workbook::new("master.xlsx");
        workbook.push_table(Table::from_text_rows(
            "Stores",
            &[&["Store ID", "Agency ID", "Temp Store ID", "Store Name", "Tablet SN"]],
        ));
        workbook.push_table(Table::from_text_rows(
            "Tablets",
            &[&["Agency ID", "Store ID", "Tablet Device ID", "Tablet SN"]],
        ));
        workbook.push_table(Table::from_text_rows("Logs", &[&["Timestamp", "Context", "Message"]]));
        workbook
    }

    fn config() -> SyncConfig {
        SyncConfig {
            root_folder: Some("root".into()),
            name_filter: "Agency".to_string(),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_new_row_skips_absent_column() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "root",
            "t1",
            "Agency One",
            agency_table(&[&["A1", "S9", "", "Acme", "", "SN1"]]),
        );
        let mut workbook = master();
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap();

        let stores = workbook.get_table("Stores").unwrap();
        assert_eq!(stores.display(2, 1), "S9");
        assert_eq!(stores.display(2, 2), "A1");
        assert_eq!(stores.display(2, 3), "");
        assert_eq!(stores.display(2, 4), "Acme");
        assert_eq!(stores.display(2, 5), "SN1");
        assert_eq!(stores.last_column(), 5);

        let tablets = workbook.get_table("Tablets").unwrap();
        assert_eq!(tablets.display(2, 1), "A1");
        assert_eq!(tablets.display(2, 4), "SN1");
        assert_eq!(tablets.display(2, 3), "");

        assert_eq!(report.inserted(), 2);
        assert_eq!(report.destinations[0].cells_written, 4);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "root",
            "t1",
            "Agency One",
            agency_table(&[
                &["A1", "S1", "T1", "Acme", "DEV1", "SN1"],
                &["A1", "S2", "", "Beta", "", ""],
            ]),
        );
        let mut workbook = master();
        let mut audit = AuditLog::new();
        let cfg = config();
        let sync = Synchronizer::new(&cfg);

        let first = sync.run(&catalog, &mut workbook, &mut audit).unwrap();
        assert_eq!(first.inserted(), 4);
        let after_first = workbook.clone();

        let second = sync.run(&catalog, &mut workbook, &mut audit).unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.updated(), 4);
        assert_eq!(
            workbook.get_table("Stores").unwrap().last_row(),
            after_first.get_table("Stores").unwrap().last_row()
        );
        assert_eq!(workbook.tables, after_first.tables);
    }

    #[test]
    fn test_blank_source_fields_keep_stored_values() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "root",
            "t1",
            "Agency One",
            agency_table(&[&["A1", "S1", "", "", "", ""]]),
        );
        let mut workbook = master();
        {
            let stores = workbook.get_table_mut("Stores").unwrap();
            *stores = Table::from_text_rows(
                "Stores",
                &[
                    &["Store ID", "Agency ID", "Temp Store ID", "Store Name", "Tablet SN"],
                    &["S1", "A1", "T-OLD", "Kept", "SN-OLD"],
                ],
            );
        }
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap();
        assert_eq!(report.destinations[0].updated, 1);

        let stores = workbook.get_table("Stores").unwrap();
        assert_eq!(stores.display(2, 3), "T-OLD");
        assert_eq!(stores.display(2, 4), "Kept");
        assert_eq!(stores.display(2, 5), "SN-OLD");
        assert_eq!(stores.last_row(), 2);
    }

    #[test]
    fn test_table_states() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table("root", "t1", "Budget", agency_table(&[&["A1", "S1"]]));
        catalog.add_table(
            "root",
            "t2",
            "Agency Broken",
            Table::from_text_rows("Stores", &[&["Agency ID", "Store Name"]]),
        );
        catalog.add_folder("root", "sub", "Region");
        catalog.add_table(
            "sub",
            "t3",
            "Agency Two",
            agency_table(&[&["A2", "S1", "", "Two", "", ""], &["#REF!", "S2", "", "", "", ""]]),
        );
        let mut workbook = master();
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap();

        assert_eq!(report.tables.len(), 3);
        assert_eq!(report.tables[0].outcome, TableOutcome::FilteredOut);
        assert!(matches!(
            &report.tables[1].outcome,
            TableOutcome::HeaderInvalid { missing } if missing.contains(&"Store ID".to_string())
        ));
        assert_eq!(
            report.tables[2].outcome,
            TableOutcome::Done {
                rows: 1,
                rejected: 1,
                stop: ScanStop::EndOfTable
            }
        );
        // header problem and rejected row
        assert_eq!(audit.entries().len(), 2);
    }

    #[test]
    fn test_unreadable_table_does_not_stop_run() {
        struct FlakyCatalog(MemoryCatalog);

        impl SourceCatalog for FlakyCatalog {
            fn entries(&self, folder_id: &str) -> anyhow::Result<Vec<collector::CatalogEntry>> {
                self.0.entries(folder_id)
            }

            fn open_table(&self, table_id: &str) -> anyhow::Result<Table> {
                if table_id == "bad" {
                    anyhow::bail!("file is corrupt");
                }
                self.0.open_table(table_id)
            }
        }

        let mut inner = MemoryCatalog::new();
        inner.add_table("root", "bad", "Agency Bad", Table::new("Stores"));
        inner.add_table(
            "root",
            "good",
            "Agency Good",
            agency_table(&[&["A1", "S1", "", "Good", "", ""]]),
        );
        let mut workbook = master();
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&FlakyCatalog(inner), &mut workbook, &mut audit)
            .unwrap();
        assert!(matches!(
            report.tables[0].outcome,
            TableOutcome::DoneWithError { .. }
        ));
        assert!(matches!(report.tables[1].outcome, TableOutcome::Done { .. }));
        assert_eq!(workbook.get_table("Stores").unwrap().display(2, 4), "Good");
    }

    #[test]
    fn test_last_write_wins_across_files() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "root",
            "t1",
            "Agency One",
            agency_table(&[&["A1", "S1", "", "First", "", ""]]),
        );
        catalog.add_table(
            "root",
            "t2",
            "Agency Two",
            agency_table(&[&["A1", "S1", "", "Second", "", ""]]),
        );
        let mut workbook = master();
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap();
        let stores = workbook.get_table("Stores").unwrap();
        assert_eq!(stores.display(2, 4), "Second");
        assert_eq!(stores.last_row(), 2);
        assert_eq!(report.destinations[0].inserted, 1);
        assert_eq!(report.destinations[0].updated, 1);
    }

    #[test]
    fn test_missing_root_folder_is_fatal() {
        let catalog = MemoryCatalog::new();
        let mut workbook = master();
        let mut audit = AuditLog::new();
        let cfg = SyncConfig::default();

        let err = Synchronizer::new(&cfg)
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingConfiguration("root_folder")));
        assert_eq!(audit.entries().len(), 1);
    }

    #[test]
    fn test_missing_destination_sheet_is_fatal() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table("root", "t1", "Agency One", agency_table(&[]));
        let mut workbook = master();
        let mut audit = AuditLog::new();
        let mut cfg = config();
        cfg.destinations.push(DestinationConfig::new("Devices"));

        let err = Synchronizer::new(&cfg)
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingDestinationSheet(ref s) if s == "Devices"));
    }

    #[test]
    fn test_destination_without_key_columns_is_skipped() {
        let mut catalog = MemoryCatalog::new();
        catalog.add_table(
            "root",
            "t1",
            "Agency One",
            agency_table(&[&["A1", "S1", "", "Acme", "", ""]]),
        );
        let mut workbook = master();
        *workbook.get_table_mut("Tablets").unwrap() =
            Table::from_text_rows("Tablets", &[&["Tablet SN"]]);
        let mut audit = AuditLog::new();

        let report = Synchronizer::new(&config())
            .run(&catalog, &mut workbook, &mut audit)
            .unwrap();
        assert!(report.destinations[1].skipped.is_some());
        assert_eq!(report.destinations[0].inserted, 1);
        assert_eq!(workbook.get_table("Tablets").unwrap().last_row(), 1);
    }
}
