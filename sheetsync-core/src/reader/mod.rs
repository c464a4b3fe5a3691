//! Excel/ODS file reader using calamine

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};
use std::path::Path;

pub mod table;

pub use table::{CellValue, Table, Workbook};

/// File extensions the reader understands
pub const SPREADSHEET_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];

/// Check whether a path looks like a spreadsheet the reader can open
pub fn is_spreadsheet<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path = path.as_ref();
    let mut excel: Sheets<_> = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

    let mut workbook = Workbook::new(path);
    for sheet_name in excel.sheet_names() {
        let range = excel
            .worksheet_range(&sheet_name)
            .with_context(|| format!("Failed to read sheet '{}' in {}", sheet_name, path.display()))?;
        workbook.push_table(parse_table(&sheet_name, &range));
    }

    Ok(workbook)
}

/// Read one sheet of a workbook, or the first one when no name is given
pub fn read_table<P: AsRef<Path>>(path: P, sheet: Option<&str>) -> Result<Table> {
    let path = path.as_ref();
    let mut excel: Sheets<_> = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => excel
            .sheet_names()
            .into_iter()
            .next()
            .with_context(|| format!("Workbook has no sheets: {}", path.display()))?,
    };

    let range = excel
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{}' in {}", sheet_name, path.display()))?;
    Ok(parse_table(&sheet_name, &range))
}

fn parse_table(name: &str, range: &Range<Data>) -> Table {
    let mut table = Table::new(name);

    // Calamine ranges start at the first used cell, not at A1
    let Some((start_row, start_col)) = range.start() else {
        return table;
    };

    for (rel_row, rel_col, data) in range.cells() {
        if matches!(data, Data::Empty) {
            continue;
        }
        let row = start_row + rel_row as u32 + 1;
        let col = start_col + rel_col as u32 + 1;
        table.set(row, col, parse_cell_value(data));
    }

    // A freshly loaded table mirrors the file
    table.mark_saved();
    table
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    #[test]
    fn test_spreadsheet_extensions() {
        assert!(is_spreadsheet("Agency North.xlsx"));
        assert!(is_spreadsheet("report.ODS"));
        assert!(!is_spreadsheet("notes.txt"));
        assert!(!is_spreadsheet("folder"));
    }

    #[test]
    fn test_parse_cell_values() {
        assert_eq!(parse_cell_value(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(
            parse_cell_value(&Data::String("S1".to_string())),
            CellValue::Text("S1".to_string())
        );
        assert_eq!(
            parse_cell_value(&Data::Error(CellErrorType::Ref)),
            CellValue::Error("#REF!".to_string())
        );
    }

    #[test]
    fn test_parse_table_keeps_absolute_positions() {
        let mut range: Range<Data> = Range::new((1, 1), (2, 2));
        range.set_value((1, 1), Data::String("Store ID".to_string()));
        range.set_value((2, 2), Data::Float(3.0));

        let table = parse_table("Sheet1", &range);
        assert_eq!(table.display(2, 2), "Store ID");
        assert_eq!(table.display(3, 3), "3");
        assert_eq!(table.display(1, 1), "");
        assert!(!table.has_changes());
    }
}
