//! Table data structures

use std::collections::BTreeSet;
use std::path::PathBuf;

static EMPTY: CellValue = CellValue::Empty;

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub path: PathBuf,
    pub tables: Vec<Table>,
}

impl Workbook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tables: Vec::new(),
        }
    }

    /// Get a table by sheet name
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn push_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// True when any table was written to since it was loaded
    pub fn has_changes(&self) -> bool {
        self.tables.iter().any(Table::has_changes)
    }
}

/// A worksheet snapshot addressed with 1-based rows and columns.
///
/// Row 1 is the header row. Cells outside the stored grid read as
/// [`CellValue::Empty`]; writes outside it grow the grid. Every write is
/// remembered so that saving only touches the cells that changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    rows: Vec<Vec<CellValue>>,
    changed: BTreeSet<(u32, u32)>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            changed: BTreeSet::new(),
        }
    }

    /// Build a table from 0-based rows (the first one being the header row)
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            changed: BTreeSet::new(),
        }
    }

    /// Convenience constructor from string literals; empty strings become blank cells
    pub fn from_text_rows(name: impl Into<String>, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|v| CellValue::from_text(v)).collect())
            .collect();
        Self::from_rows(name, rows)
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Get the cell at a 1-based position
    pub fn cell(&self, row: u32, col: u32) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY;
        }
        self.rows
            .get((row - 1) as usize)
            .and_then(|r| r.get((col - 1) as usize))
            .unwrap_or(&EMPTY)
    }

    /// Display value of a cell
    pub fn display(&self, row: u32, col: u32) -> String {
        self.cell(row, col).display()
    }

    /// Trimmed display values of row 1
    pub fn header_row(&self) -> Vec<String> {
        (1..=self.last_column())
            .map(|col| self.display(1, col).trim().to_string())
            .collect()
    }

    /// Number of stored rows, including trailing rows that only hold empty cells
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Highest row with at least one non-empty cell (0 when the table is empty)
    pub fn last_row(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_empty()))
            .map(|idx| idx as u32 + 1)
            .unwrap_or(0)
    }

    /// Highest column with at least one non-empty cell (0 when the table is empty)
    pub fn last_column(&self) -> u32 {
        self.rows
            .iter()
            .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
            .max()
            .map(|idx| idx as u32 + 1)
            .unwrap_or(0)
    }

    /// Write a value at a 1-based position, growing the grid if needed
    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        if row == 0 || col == 0 {
            return;
        }
        let (r, c) = ((row - 1) as usize, (col - 1) as usize);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize(c + 1, CellValue::Empty);
        }
        cells[c] = value;
        self.changed.insert((row, col));
    }

    /// Append a row after the last used row and return its 1-based index
    pub fn append_row(&mut self, values: Vec<CellValue>) -> u32 {
        let row = self.last_row() + 1;
        for (idx, value) in values.into_iter().enumerate() {
            if !value.is_empty() {
                self.set(row, idx as u32 + 1, value);
            }
        }
        row
    }

    /// 1-based positions written since the table was loaded, in row order
    pub fn changed_cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.changed.iter().copied()
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Forget recorded writes, e.g. once the table mirrors the file on disk
    pub fn mark_saved(&mut self) {
        self.changed.clear();
    }
}

/// Cell value types
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl CellValue {
    /// Text cell, or an empty cell for an empty string
    pub fn from_text(text: &str) -> Self {
        if text.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(text.to_string())
        }
    }

    /// Check if the cell holds nothing at all
    ///
    /// A text cell with only whitespace is not empty; it still counts toward the
    /// used range even though its display value trims to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Display string as a spreadsheet would show it
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(true) => "TRUE".to_string(),
            CellValue::Boolean(false) => "FALSE".to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_values() {
        assert_eq!(CellValue::Number(42.0).display(), "42");
        assert_eq!(CellValue::Number(1.5).display(), "1.5");
        assert_eq!(CellValue::Boolean(true).display(), "TRUE");
        assert_eq!(CellValue::Error("#REF!".to_string()).display(), "#REF!");
        assert_eq!(CellValue::Empty.display(), "");
    }

    #[test]
    fn test_set_grows_grid() {
        let mut table = Table::new("Stores");
        table.set(3, 2, CellValue::Text("x".to_string()));
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.display(3, 2), "x");
        assert_eq!(table.cell(1, 1), &CellValue::Empty);
        assert_eq!(table.cell(0, 1), &CellValue::Empty);
        assert_eq!(table.last_row(), 3);
        assert_eq!(table.last_column(), 2);
    }

    #[test]
    fn test_last_row_counts_whitespace_cells() {
        let table = Table::from_text_rows("T", &[&["A"], &[""], &[" "], &[""]]);
        assert_eq!(table.last_row(), 3);
        assert_eq!(table.row_count(), 4);
    }

    #[test]
    fn test_append_row_after_last_used_row() {
        let mut table = Table::from_text_rows("Logs", &[&["Timestamp"], &[""]]);
        let row = table.append_row(vec![CellValue::Text("now".to_string())]);
        assert_eq!(row, 2);
        assert_eq!(table.display(2, 1), "now");
        assert_eq!(table.changed_cells().collect::<Vec<_>>(), vec![(2, 1)]);
    }

    #[test]
    fn test_writes_are_tracked() {
        let mut table = Table::from_text_rows("Stores", &[&["Store ID"], &["S1"]]);
        assert!(!table.has_changes());

        table.set(3, 2, CellValue::Text("x".to_string()));
        table.set(2, 1, CellValue::Text("S2".to_string()));
        assert_eq!(table.changed_cells().collect::<Vec<_>>(), vec![(2, 1), (3, 2)]);

        let mut workbook = Workbook::new("master.xlsx");
        workbook.push_table(Table::new("Logs"));
        assert!(!workbook.has_changes());
        workbook.push_table(table);
        assert!(workbook.has_changes());

        workbook.get_table_mut("Stores").unwrap().mark_saved();
        assert!(!workbook.has_changes());
    }

    #[test]
    fn test_header_row_trimmed() {
        let table = Table::from_text_rows("T", &[&[" Store ID ", "Agency ID"]]);
        assert_eq!(table.header_row(), vec!["Store ID", "Agency ID"]);
    }
}
