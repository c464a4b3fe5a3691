//! Append-only audit log kept in a dedicated sheet

use crate::reader::{CellValue, Workbook};
use chrono::{DateTime, Local};
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Destination of `(timestamp, context, message)` entries
pub trait AuditSink {
    /// Record an entry; never fails
    fn record(&mut self, context: &str, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    pub context: String,
    pub message: String,
}

/// Audit entries buffered in memory until they are appended to the audit sheet
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Append the buffered entries below the last used row of `sheet`.
    ///
    /// A missing audit sheet is reported on the log channel and the entries
    /// are dropped; this never returns an error. Returns the number of rows
    /// written.
    pub fn append_to(&mut self, workbook: &mut Workbook, sheet: &str) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        let Some(table) = workbook.get_table_mut(sheet) else {
            warn!(
                sheet,
                dropped = self.entries.len(),
                "audit sheet not found, entries not persisted"
            );
            for entry in &self.entries {
                warn!(context = %entry.context, "{}", entry.message);
            }
            self.entries.clear();
            return 0;
        };

        let written = self.entries.len();
        for entry in self.entries.drain(..) {
            table.append_row(vec![
                CellValue::Text(entry.timestamp.format(TIMESTAMP_FORMAT).to_string()),
                CellValue::Text(entry.context),
                CellValue::Text(entry.message),
            ]);
        }
        written
    }
}

impl AuditSink for AuditLog {
    fn record(&mut self, context: &str, message: &str) {
        self.entries.push(AuditEntry {
            timestamp: Local::now(),
            context: context.to_string(),
            message: message.to_string(),
        });
    }
}

/// Local time formatted the way audit rows store it
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Table;

    #[test]
    fn test_entries_appended_below_existing_rows() {
        let mut workbook = Workbook::new("master.xlsx");
        workbook.push_table(Table::from_text_rows(
            "Logs",
            &[&["Timestamp", "Context", "Message"], &["t0", "sync", "older"]],
        ));

        let mut log = AuditLog::new();
        log.record("sync", "table skipped");
        log.record("notify", "webhook failed");
        assert_eq!(log.append_to(&mut workbook, "Logs"), 2);

        let table = workbook.get_table("Logs").unwrap();
        assert_eq!(table.display(3, 2), "sync");
        assert_eq!(table.display(3, 3), "table skipped");
        assert_eq!(table.display(4, 2), "notify");
        assert!(!table.display(4, 1).is_empty());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_missing_sheet_is_swallowed() {
        let mut workbook = Workbook::new("master.xlsx");
        let mut log = AuditLog::new();
        log.record("sync", "something");
        assert_eq!(log.append_to(&mut workbook, "Logs"), 0);
        assert!(log.entries().is_empty());
        assert!(workbook.tables.is_empty());
    }
}
