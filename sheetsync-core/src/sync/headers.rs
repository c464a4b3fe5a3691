//! Header resolution: logical fields to 1-based column positions

use crate::error::SyncError;
use std::collections::HashMap;

/// Logical fields carried from agency sheets into the master sheets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    StoreId,
    AgencyId,
    TempStoreId,
    StoreName,
    TabletDeviceId,
    TabletSn,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::StoreId,
        Field::AgencyId,
        Field::TempStoreId,
        Field::StoreName,
        Field::TabletDeviceId,
        Field::TabletSn,
    ];

    /// Fields making up the composite key
    pub const KEY: [Field; 2] = [Field::AgencyId, Field::StoreId];

    /// Configuration key of the field
    pub fn key(self) -> &'static str {
        match self {
            Field::StoreId => "store_id",
            Field::AgencyId => "agency_id",
            Field::TempStoreId => "temp_store_id",
            Field::StoreName => "store_name",
            Field::TabletDeviceId => "tablet_device_id",
            Field::TabletSn => "tablet_sn",
        }
    }

    /// Header text used when the configuration does not override it
    pub fn default_header(self) -> &'static str {
        match self {
            Field::StoreId => "Store ID",
            Field::AgencyId => "Agency ID",
            Field::TempStoreId => "Temp Store ID",
            Field::StoreName => "Store Name",
            Field::TabletDeviceId => "Tablet Device ID",
            Field::TabletSn => "Tablet SN",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// Display names of the logical fields for one table shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    names: HashMap<Field, String>,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            names: Field::ALL
                .into_iter()
                .map(|f| (f, f.default_header().to_string()))
                .collect(),
        }
    }
}

impl HeaderNames {
    /// Apply `field key -> display name` overrides on top of these names
    pub fn with_overrides(&self, overrides: &HashMap<String, String>) -> Result<Self, SyncError> {
        let mut names = self.names.clone();
        for (key, display) in overrides {
            let field = Field::from_key(key).ok_or_else(|| {
                SyncError::InvalidConfiguration(format!("unknown column field '{}'", key))
            })?;
            let display = display.trim();
            if display.is_empty() {
                return Err(SyncError::InvalidConfiguration(format!(
                    "header name for '{}' is blank",
                    key
                )));
            }
            names.insert(field, display.to_string());
        }
        Ok(Self { names })
    }

    pub fn get(&self, field: Field) -> &str {
        self.names
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.default_header())
    }
}

/// Resolved column positions for one table snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: HashMap<Field, u32>,
}

impl ColumnMap {
    /// 1-based column of a field, `None` when the table has no such column
    pub fn get(&self, field: Field) -> Option<u32> {
        self.columns.get(&field).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Required columns that a header row lacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumns(pub Vec<String>);

impl MissingColumns {
    pub fn into_error(self, table: &str) -> SyncError {
        SyncError::MissingRequiredHeader {
            table: table.to_string(),
            columns: self.0,
        }
    }
}

/// Find the 1-based column holding `name` in a header row (first match wins)
pub fn find_column(header: &[String], name: &str) -> Option<u32> {
    let name = name.trim();
    header
        .iter()
        .position(|h| h.trim() == name)
        .map(|idx| idx as u32 + 1)
}

/// Resolve every field whose display name appears in the header row.
///
/// If any `required` field is absent the whole resolution fails; absent
/// optional fields are left out of the map.
pub fn resolve_headers(
    header: &[String],
    names: &HeaderNames,
    required: &[Field],
) -> Result<ColumnMap, MissingColumns> {
    let mut columns = HashMap::new();
    for field in Field::ALL {
        if let Some(col) = find_column(header, names.get(field)) {
            columns.insert(field, col);
        }
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|f| !columns.contains_key(*f))
        .map(|f| names.get(*f).to_string())
        .collect();

    if missing.is_empty() {
        Ok(ColumnMap { columns })
    } else {
        Err(MissingColumns(missing))
    }
}
