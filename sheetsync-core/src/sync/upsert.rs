//! Insert-or-update into destination sheets through batched writes

use super::headers::{ColumnMap, Field, HeaderNames, MissingColumns, resolve_headers};
use super::keymap::{CompositeKey, KeyIndex};
use super::record::FieldRecord;
use crate::reader::{CellValue, Table};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertKind {
    Insert,
    Update,
}

/// Pending cell writes for one destination sheet.
///
/// Blank values never enter the batch, so flushing cannot clear data that is
/// already stored. A later write to the same cell replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: BTreeMap<(u32, u32), String>,
}

impl WriteBatch {
    /// Queue a write; returns false when the value is blank and was dropped
    pub fn set(&mut self, row: u32, col: u32, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        self.writes.insert((row, col), value.to_string());
        true
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&str> {
        self.writes.get(&(row, col)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write to the table and return the number of cells written
    pub fn flush(self, table: &mut Table) -> usize {
        let count = self.writes.len();
        for ((row, col), value) in self.writes {
            table.set(row, col, CellValue::Text(value));
        }
        count
    }
}

/// Upsert state of one destination sheet for the duration of a run
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub sheet: String,
    columns: ColumnMap,
    index: KeyIndex,
    next_row: u32,
}

impl Destination {
    /// Resolve the destination header and index its existing rows.
    ///
    /// Only the key columns are required; any other field column may be absent.
    pub fn prepare(table: &Table, names: &HeaderNames) -> Result<Self, MissingColumns> {
        let columns = resolve_headers(&table.header_row(), names, &Field::KEY)?;
        let index = KeyIndex::build(table, &columns);
        let next_row = index.last_data_row() + 1;
        Ok(Self {
            sheet: table.name.clone(),
            columns,
            index,
            next_row,
        })
    }

    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    /// Row the next inserted key will take
    pub fn next_row(&self) -> u32 {
        self.next_row
    }

    /// Pick the target row for `key`, claiming a fresh row if it is new
    pub fn target_row(&mut self, key: &CompositeKey) -> (u32, UpsertKind) {
        if let Some(row) = self.index.get(key) {
            return (row, UpsertKind::Update);
        }
        let row = self.next_row;
        self.index.insert(key, row);
        self.next_row += 1;
        (row, UpsertKind::Insert)
    }

    /// Queue the non-blank fields of `record` for the row owning `key`.
    ///
    /// Fields without a column in this sheet are skipped.
    pub fn upsert(
        &mut self,
        key: &CompositeKey,
        record: &FieldRecord,
        batch: &mut WriteBatch,
    ) -> UpsertKind {
        let (row, kind) = self.target_row(key);
        for field in Field::ALL {
            if let Some(col) = self.columns.get(field) {
                batch.set(row, col, record.get(field));
            }
        }
        kind
    }
}
