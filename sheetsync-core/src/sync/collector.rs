//! Source discovery over a folder hierarchy

use crate::reader::{self, Table};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Item listed inside a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Folder { id: String, name: String },
    Table { id: String, name: String },
}

/// A table found under the root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub id: String,
    pub name: String,
}

/// Hierarchical store of source tables
pub trait SourceCatalog {
    /// List the direct children of a folder
    fn entries(&self, folder_id: &str) -> Result<Vec<CatalogEntry>>;

    /// Open a table snapshot by identifier
    fn open_table(&self, table_id: &str) -> Result<Table>;
}

/// Recursively collect every table beneath `root_id`, depth-first.
///
/// Folders already visited are skipped so a catalog with loops (symlinked
/// directories) still terminates.
pub fn collect_tables(catalog: &dyn SourceCatalog, root_id: &str) -> Result<Vec<SourceRef>> {
    let mut tables = Vec::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root_id.to_string()];

    while let Some(folder_id) = pending.pop() {
        if !visited.insert(folder_id.clone()) {
            debug!(folder = %folder_id, "folder already visited, skipping");
            continue;
        }

        let mut subfolders = Vec::new();
        for entry in catalog.entries(&folder_id)? {
            match entry {
                CatalogEntry::Folder { id, .. } => subfolders.push(id),
                CatalogEntry::Table { id, name } => tables.push(SourceRef { id, name }),
            }
        }
        // Reverse so the first listed subfolder is explored first
        pending.extend(subfolders.into_iter().rev());
    }

    Ok(tables)
}

/// Substring match on the display name; an empty filter accepts everything
pub fn matches_filter(name: &str, filter: &str) -> bool {
    filter.is_empty() || name.contains(filter)
}

/// Catalog backed by a directory tree of spreadsheet files
#[derive(Debug, Clone, Default)]
pub struct FsCatalog {
    /// Sheet to read in each file; the first sheet when unset
    pub sheet: Option<String>,
}

impl FsCatalog {
    pub fn new(sheet: Option<String>) -> Self {
        Self { sheet }
    }
}

impl SourceCatalog for FsCatalog {
    fn entries(&self, folder_id: &str) -> Result<Vec<CatalogEntry>> {
        let folder = Path::new(folder_id);
        let mut entries = Vec::new();

        let listing = fs::read_dir(folder)
            .with_context(|| format!("Failed to list folder: {}", folder.display()))?;
        for item in listing {
            let path = item?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if path.is_dir() {
                // Canonical ids let the visited set catch symlink loops
                let id = canonical_id(&path);
                entries.push(CatalogEntry::Folder { id, name });
            } else if reader::is_spreadsheet(&path) && !name.starts_with("~$") {
                let id = path.to_string_lossy().into_owned();
                entries.push(CatalogEntry::Table { id, name });
            }
        }

        entries.sort_by(|a, b| entry_name(a).cmp(entry_name(b)));
        Ok(entries)
    }

    fn open_table(&self, table_id: &str) -> Result<Table> {
        reader::read_table(table_id, self.sheet.as_deref())
    }
}

/// Canonical form of a folder path, used as its catalog id
pub fn canonical_id(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

fn entry_name(entry: &CatalogEntry) -> &str {
    match entry {
        CatalogEntry::Folder { name, .. } | CatalogEntry::Table { name, .. } => name,
    }
}

/// In-memory catalog, handy for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    folders: HashMap<String, Vec<CatalogEntry>>,
    tables: HashMap<String, Table>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_folder(&mut self, parent_id: &str, id: &str, name: &str) {
        self.folders.entry(id.to_string()).or_default();
        self.folders
            .entry(parent_id.to_string())
            .or_default()
            .push(CatalogEntry::Folder {
                id: id.to_string(),
                name: name.to_string(),
            });
    }

    pub fn add_table(&mut self, parent_id: &str, id: &str, name: &str, table: Table) {
        self.folders
            .entry(parent_id.to_string())
            .or_default()
            .push(CatalogEntry::Table {
                id: id.to_string(),
                name: name.to_string(),
            });
        self.tables.insert(id.to_string(), table);
    }
}

impl SourceCatalog for MemoryCatalog {
    fn entries(&self, folder_id: &str) -> Result<Vec<CatalogEntry>> {
        self.folders
            .get(folder_id)
            .cloned()
            .with_context(|| format!("Folder not found: {}", folder_id))
    }

    fn open_table(&self, table_id: &str) -> Result<Table> {
        self.tables
            .get(table_id)
            .cloned()
            .with_context(|| format!("Table not found: {}", table_id))
    }
}
