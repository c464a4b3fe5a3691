//! Composite keys and the destination key index

use super::headers::{ColumnMap, Field};
use crate::error::KeyError;
use crate::reader::Table;
use std::collections::HashMap;
use std::fmt;

/// Separator between the agency and store parts of a key
pub const KEY_SEPARATOR: char = '|';

/// Display value the source platform leaves behind for a broken reference
pub const BROKEN_REFERENCE: &str = "#REF!";

/// Join the trimmed agency and store ids into a key without validating them
pub fn make_key(agency_id: &str, store_id: &str) -> String {
    format!("{}{}{}", agency_id.trim(), KEY_SEPARATOR, store_id.trim())
}

/// Validated `agencyId|storeId` key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(agency_id: &str, store_id: &str) -> Result<Self, KeyError> {
        let (agency_id, store_id) = (agency_id.trim(), store_id.trim());
        if agency_id.is_empty() {
            return Err(KeyError::MissingAgencyId);
        }
        if store_id.is_empty() {
            return Err(KeyError::MissingStoreId);
        }
        if agency_id == BROKEN_REFERENCE {
            return Err(KeyError::BrokenAgencyId);
        }
        if store_id == BROKEN_REFERENCE {
            return Err(KeyError::BrokenStoreId);
        }
        Ok(Self(make_key(agency_id, store_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key to destination row mapping, plus the append position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIndex {
    rows: HashMap<String, u32>,
    last_data_row: u32,
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            last_data_row: 1,
        }
    }
}

impl KeyIndex {
    /// Scan rows 2..=last used row of a destination table.
    ///
    /// Rows whose agency or store display value is blank are not indexed.
    /// The scan runs top-to-bottom, so for duplicate keys the last
    /// occurrence wins.
    pub fn build(table: &Table, columns: &ColumnMap) -> Self {
        let mut index = Self {
            rows: HashMap::new(),
            last_data_row: table.last_row().max(1),
        };

        let (Some(agency_col), Some(store_col)) =
            (columns.get(Field::AgencyId), columns.get(Field::StoreId))
        else {
            return index;
        };

        for row in 2..=index.last_data_row {
            let agency_id = table.display(row, agency_col);
            let store_id = table.display(row, store_col);
            if agency_id.trim().is_empty() || store_id.trim().is_empty() {
                continue;
            }
            index.rows.insert(make_key(&agency_id, &store_id), row);
        }

        index
    }

    pub fn get(&self, key: &CompositeKey) -> Option<u32> {
        self.rows.get(key.as_str()).copied()
    }

    pub fn insert(&mut self, key: &CompositeKey, row: u32) {
        self.rows.insert(key.as_str().to_string(), row);
        self.last_data_row = self.last_data_row.max(row);
    }

    /// Highest row holding any non-empty cell (1 when only the header exists)
    pub fn last_data_row(&self) -> u32 {
        self.last_data_row
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::headers::{HeaderNames, resolve_headers};

    fn columns(table: &Table) -> ColumnMap {
        resolve_headers(&table.header_row(), &HeaderNames::default(), &Field::KEY).unwrap()
    }

    #[test]
    fn test_make_key_trims_and_joins() {
        assert_eq!(make_key("  A1 ", "S2"), "A1|S2");
        assert_eq!(
            CompositeKey::new("  A1 ", "S2").unwrap().as_str(),
            "A1|S2"
        );
    }

    #[test]
    fn test_composite_key_rejects_invalid_parts() {
        assert_eq!(CompositeKey::new("#REF!", "S2"), Err(KeyError::BrokenAgencyId));
        assert_eq!(CompositeKey::new("A1", " #REF! "), Err(KeyError::BrokenStoreId));
        assert_eq!(CompositeKey::new(" ", "S2"), Err(KeyError::MissingAgencyId));
        assert_eq!(CompositeKey::new("A1", ""), Err(KeyError::MissingStoreId));
    }

    #[test]
    fn test_last_duplicate_wins() {
        let table = Table::from_text_rows(
            "Stores",
            &[
                &["Agency ID", "Store ID"],
                &["A", "1"],
                &["B", "2"],
                &["", ""],
                &["A", "1"],
            ],
        );
        let index = KeyIndex::build(&table, &columns(&table));
        assert_eq!(index.get(&CompositeKey::new("A", "1").unwrap()), Some(5));
        assert_eq!(index.get(&CompositeKey::new("B", "2").unwrap()), Some(3));
        assert_eq!(index.len(), 2);
        assert_eq!(index.last_data_row(), 5);
    }

    #[test]
    fn test_empty_destination_appends_at_row_two() {
        let table = Table::from_text_rows("Stores", &[&["Agency ID", "Store ID"]]);
        let index = KeyIndex::build(&table, &columns(&table));
        assert!(index.is_empty());
        assert_eq!(index.last_data_row(), 1);
    }

    #[test]
    fn test_rows_without_key_still_count_as_used() {
        let table = Table::from_text_rows(
            "Stores",
            &[
                &["Agency ID", "Store ID", "Store Name"],
                &["A", "1", "Acme"],
                &["", "", "orphan"],
            ],
        );
        let index = KeyIndex::build(&table, &columns(&table));
        assert_eq!(index.len(), 1);
        assert_eq!(index.last_data_row(), 3);
    }

    #[test]
    fn test_numeric_ids_match_text_keys() {
        let mut table = Table::from_text_rows("Stores", &[&["Agency ID", "Store ID"]]);
        table.set(2, 1, crate::reader::CellValue::Text("A".to_string()));
        table.set(2, 2, crate::reader::CellValue::Number(17.0));
        let index = KeyIndex::build(&table, &columns(&table));
        assert_eq!(index.get(&CompositeKey::new("A", "17").unwrap()), Some(2));
    }
}
