//! Source row extraction, validation and the blank-streak scan

use super::headers::{ColumnMap, Field};
use super::keymap::CompositeKey;
use crate::error::KeyError;
use crate::reader::Table;
use serde::{Deserialize, Serialize};

/// Rows 1 and 2 of an agency sheet are header and metadata
pub const SOURCE_DATA_START_ROW: u32 = 3;

/// Fixed set of values read from one source row; absent cells are empty strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRecord {
    pub store_id: String,
    pub agency_id: String,
    pub temp_store_id: String,
    pub store_name: String,
    pub tablet_device_id: String,
    pub tablet_sn: String,
}

impl FieldRecord {
    /// Read and trim every resolved field of `row`
    pub fn extract(table: &Table, row: u32, columns: &ColumnMap) -> Self {
        let value = |field: Field| -> String {
            columns
                .get(field)
                .map(|col| table.display(row, col).trim().to_string())
                .unwrap_or_default()
        };

        Self {
            store_id: value(Field::StoreId),
            agency_id: value(Field::AgencyId),
            temp_store_id: value(Field::TempStoreId),
            store_name: value(Field::StoreName),
            tablet_device_id: value(Field::TabletDeviceId),
            tablet_sn: value(Field::TabletSn),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::StoreId => &self.store_id,
            Field::AgencyId => &self.agency_id,
            Field::TempStoreId => &self.temp_store_id,
            Field::StoreName => &self.store_name,
            Field::TabletDeviceId => &self.tablet_device_id,
            Field::TabletSn => &self.tablet_sn,
        }
    }

    /// Every field empty
    pub fn is_blank(&self) -> bool {
        Field::ALL.into_iter().all(|f| self.get(f).is_empty())
    }

    pub fn key(&self) -> Result<CompositeKey, KeyError> {
        CompositeKey::new(&self.agency_id, &self.store_id)
    }
}

/// Bounds on how far a source table is scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Consecutive blank rows that end the scan
    pub blank_streak: u32,
    /// Maximum number of data rows examined per table
    pub row_cap: u32,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            blank_streak: 10,
            row_cap: 2000,
        }
    }
}

/// Source row that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub row: u32,
    pub key: CompositeKey,
    pub record: FieldRecord,
}

/// Source row with content but an unusable key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedRow {
    pub row: u32,
    pub reason: KeyError,
}

/// Why the scan of a table ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStop {
    EndOfTable,
    BlankStreak,
    RowCap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceScan {
    pub accepted: Vec<SourceRow>,
    pub rejected: Vec<RejectedRow>,
    pub stop: ScanStop,
}

/// Walk the data rows of a source table from row 3.
///
/// Blank rows extend the blank streak; any other row resets it. Rows with
/// content but an invalid key are rejected and do not count as blank. The
/// scan ends at the last used row, after `blank_streak` consecutive blank
/// rows, or after `row_cap` rows, whichever comes first.
pub fn scan_source(table: &Table, columns: &ColumnMap, limits: ScanLimits) -> SourceScan {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut streak = 0;
    let last_row = table.last_row();
    let mut stop = ScanStop::EndOfTable;

    let mut row = SOURCE_DATA_START_ROW;
    while row <= last_row {
        if row - SOURCE_DATA_START_ROW >= limits.row_cap {
            stop = ScanStop::RowCap;
            break;
        }

        let record = FieldRecord::extract(table, row, columns);
        if record.is_blank() {
            streak += 1;
            if streak >= limits.blank_streak {
                stop = ScanStop::BlankStreak;
                break;
            }
        } else {
            streak = 0;
            match record.key() {
                Ok(key) => accepted.push(SourceRow { row, key, record }),
                Err(reason) => rejected.push(RejectedRow { row, reason }),
            }
        }
        row += 1;
    }

    SourceScan {
        accepted,
        rejected,
        stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::CellValue;
    use crate::sync::headers::{HeaderNames, resolve_headers};

    const HEADER: &[&str] = &[
        "Store ID",
        "Agency ID",
        "Temp Store ID",
        "Store Name",
        "Tablet Device ID",
        "Tablet SN",
    ];

    fn source(rows: &[&[&str]]) -> (Table, ColumnMap) {
        let mut all: Vec<&[&str]> = Vec::new();
        all.push(HEADER);
        all.push(&["metadata"]);
        all.extend_from_slice(rows);
        let table = Table::from_text_rows("Agency", &all);
        let columns =
            resolve_headers(&table.header_row(), &HeaderNames::default(), &Field::ALL).unwrap();
        (table, columns)
    }

    #[test]
    fn test_extract_trims_and_defaults_to_empty() {
        let (mut table, columns) = source(&[&["  S9 ", "A1", "", "Acme  "]]);
        table.set(3, 6, CellValue::Number(1234.0));
        let record = FieldRecord::extract(&table, 3, &columns);
        assert_eq!(record.store_id, "S9");
        assert_eq!(record.store_name, "Acme");
        assert_eq!(record.temp_store_id, "");
        assert_eq!(record.tablet_device_id, "");
        assert_eq!(record.tablet_sn, "1234");
        assert!(!record.is_blank());
        assert_eq!(record.key().unwrap().as_str(), "A1|S9");
    }

    #[test]
    fn test_scan_starts_at_row_three() {
        let (table, columns) = source(&[&["S1", "A1"], &["S2", "A1"]]);
        let scan = scan_source(&table, &columns, ScanLimits::default());
        let rows: Vec<u32> = scan.accepted.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![3, 4]);
        assert_eq!(scan.stop, ScanStop::EndOfTable);
    }

    #[test]
    fn test_blank_streak_stops_before_late_row() {
        let mut rows: Vec<&[&str]> = Vec::new();
        rows.push(&["S1", "A1"]);
        rows.extend(std::iter::repeat_n(&[""] as &[&str], 12));
        rows.push(&["S2", "A1"]);
        let (table, columns) = source(&rows);

        let scan = scan_source(&table, &columns, ScanLimits::default());
        assert_eq!(scan.accepted.len(), 1);
        assert_eq!(scan.accepted[0].row, 3);
        assert_eq!(scan.stop, ScanStop::BlankStreak);
    }

    #[test]
    fn test_short_blank_gap_is_crossed() {
        let mut rows: Vec<&[&str]> = Vec::new();
        rows.push(&["S1", "A1"]);
        rows.extend(std::iter::repeat_n(&[""] as &[&str], 9));
        rows.push(&["S2", "A1"]);
        let (table, columns) = source(&rows);

        let scan = scan_source(&table, &columns, ScanLimits::default());
        assert_eq!(scan.accepted.len(), 2);
        assert_eq!(scan.accepted[1].row, 13);
    }

    #[test]
    fn test_invalid_keys_rejected_and_reset_streak() {
        let mut rows: Vec<&[&str]> = Vec::new();
        rows.extend(std::iter::repeat_n(&[""] as &[&str], 9));
        rows.push(&["S1", "#REF!", "", "Broken"]);
        rows.extend(std::iter::repeat_n(&[""] as &[&str], 9));
        rows.push(&["", "A1", "", "No store"]);
        rows.push(&["S3", "A1"]);
        let (table, columns) = source(&rows);

        let scan = scan_source(&table, &columns, ScanLimits::default());
        assert_eq!(
            scan.rejected,
            vec![
                RejectedRow {
                    row: 12,
                    reason: KeyError::BrokenAgencyId
                },
                RejectedRow {
                    row: 22,
                    reason: KeyError::MissingStoreId
                },
            ]
        );
        assert_eq!(scan.accepted.len(), 1);
        assert_eq!(scan.accepted[0].row, 23);
    }

    #[test]
    fn test_row_cap_bounds_scan() {
        let rows: Vec<&[&str]> = std::iter::repeat_n(&["S1", "A1"] as &[&str], 5).collect();
        let (table, columns) = source(&rows);
        let limits = ScanLimits {
            blank_streak: 10,
            row_cap: 3,
        };
        let scan = scan_source(&table, &columns, limits);
        assert_eq!(scan.accepted.len(), 3);
        assert_eq!(scan.stop, ScanStop::RowCap);
    }
}
