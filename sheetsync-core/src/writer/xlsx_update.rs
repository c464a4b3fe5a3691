// ! In-place XLSX update that rewrites only the cells changed since loading

use super::xlsx_writer::{cell_reference, write_cell};
use crate::reader::{CellValue, Table, Workbook};
use anyhow::{Context, Result, anyhow};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Column -> new value for one row
type RowChanges = BTreeMap<u32, CellValue>;
/// Row -> changed cells of that row
type SheetChanges = BTreeMap<u32, RowChanges>;

/// Copy the XLSX package at `input_path` to `output_path`, replacing only the
/// cells written since `workbook` was loaded.
///
/// Every other part (styles, shared strings, other sheets) is copied as is,
/// and untouched cells keep their formulas. A replaced cell keeps its style.
pub fn update_workbook_xlsx(workbook: &Workbook, input_path: &Path, output_path: &Path) -> Result<()> {
    // The output is normally the input file itself
    let bytes = fs::read(input_path)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook_xml = read_file_from_zip(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_file_from_zip(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let parts = sheet_parts(&workbook_xml, &rels_xml)?;

    let mut patches: HashMap<&str, (&Table, SheetChanges)> = HashMap::new();
    for table in workbook.tables.iter().filter(|t| t.has_changes()) {
        let part = parts.get(&table.name).ok_or_else(|| {
            anyhow!("Sheet '{}' not found in {}", table.name, input_path.display())
        })?;
        patches.insert(part.as_str(), (table, collect_changes(table)));
    }

    let output_file = File::create(output_path)?;
    let mut zip_writer = ZipWriter::new(output_file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();

        match patches.get(name.as_str()) {
            Some((table, changes)) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                let patched = patch_sheet_xml(&content, table, changes)
                    .with_context(|| format!("Failed to update sheet '{}'", table.name))?;
                zip_writer.start_file(name, options)?;
                zip_writer.write_all(patched.as_bytes())?;
            }
            None => zip_writer.raw_copy_file(file)?,
        }
    }

    zip_writer.finish()?;
    Ok(())
}

fn read_file_from_zip<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    filename: &str,
) -> Result<String> {
    let mut file = archive.by_name(filename)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

fn collect_changes(table: &Table) -> SheetChanges {
    let mut changes = SheetChanges::new();
    for (row, col) in table.changed_cells() {
        changes
            .entry(row)
            .or_default()
            .insert(col, table.cell(row, col).clone());
    }
    changes
}

/// Map sheet names to their worksheet part inside the package
fn sheet_parts(workbook_xml: &str, rels_xml: &str) -> Result<HashMap<String, String>> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_str(rels_xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                let id = attribute(&e, "Id")?;
                let target = attribute(&e, "Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, part_path(&target));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    let mut parts = HashMap::new();
    let mut reader = Reader::from_str(workbook_xml);
    buf.clear();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"name" {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        rel_id = Some(String::from_utf8(attr.value.to_vec())?);
                    }
                }
                if let (Some(name), Some(target)) = (name, rel_id.and_then(|id| targets.get(&id))) {
                    parts.insert(name, target.clone());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(parts)
}

/// Relationship targets are relative to `xl/` unless they start with `/`
fn part_path(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(String::from_utf8(attr.value.to_vec())?)),
        None => Ok(None),
    }
}

/// Split an A1-style reference into 1-based (row, column)
fn parse_reference(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        col = col * 26 + (c as u32 - 'A' as u32 + 1);
    }
    let row = digits.parse().ok()?;
    Some((row, col))
}

/// Rewrite the `<sheetData>` of a worksheet part so that it holds the changed
/// cells. Cells and rows keep document order; everything else is copied.
fn patch_sheet_xml(xml: &str, table: &Table, changes: &SheetChanges) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    let mut pending = changes.clone();
    let mut row_changes: Option<RowChanges> = None;
    let mut in_sheet_data = false;
    let mut current_row = 0u32;
    let mut current_col = 0u32;
    let mut skip_cell = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            // Inside a replaced cell: drop its value and formula
            Ok(event) if skip_cell => {
                if let Event::End(e) = &event {
                    if e.name().as_ref() == b"c" {
                        skip_cell = false;
                    }
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"dimension" => {
                let range = used_range(table);
                writer.write_event(Event::Empty(
                    BytesStart::new("dimension").with_attributes([("ref", range.as_str())]),
                ))?;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"sheetData" => {
                writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                write_rows_before(&mut writer, &mut pending, u32::MAX)?;
                writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
            }
            Ok(Event::Start(e)) if e.name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                writer.write_event(Event::Start(e))?;
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"sheetData" => {
                write_rows_before(&mut writer, &mut pending, u32::MAX)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e))?;
            }
            Ok(Event::Start(e)) if in_sheet_data && e.name().as_ref() == b"row" => {
                current_row = row_number(&e)?.unwrap_or(current_row + 1);
                current_col = 0;
                write_rows_before(&mut writer, &mut pending, current_row)?;
                row_changes = pending.remove(&current_row);
                if row_changes.is_some() {
                    writer.write_event(Event::Start(without_spans(&e)?))?;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Ok(Event::Empty(e)) if in_sheet_data && e.name().as_ref() == b"row" => {
                current_row = row_number(&e)?.unwrap_or(current_row + 1);
                write_rows_before(&mut writer, &mut pending, current_row)?;
                match pending.remove(&current_row) {
                    Some(mut cells) => {
                        writer.write_event(Event::Start(without_spans(&e)?))?;
                        write_cells_before(&mut writer, current_row, &mut cells, u32::MAX)?;
                        writer.write_event(Event::End(BytesEnd::new("row")))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Ok(Event::End(e)) if in_sheet_data && e.name().as_ref() == b"row" => {
                if let Some(cells) = row_changes.as_mut() {
                    write_cells_before(&mut writer, current_row, cells, u32::MAX)?;
                }
                row_changes = None;
                writer.write_event(Event::End(e))?;
            }
            Ok(Event::Start(e)) if in_sheet_data && e.name().as_ref() == b"c" => {
                current_col = cell_column(&e)?.unwrap_or(current_col + 1);
                if replace_cell(&mut writer, current_row, current_col, &e, row_changes.as_mut())? {
                    skip_cell = true;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Ok(Event::Empty(e)) if in_sheet_data && e.name().as_ref() == b"c" => {
                current_col = cell_column(&e)?.unwrap_or(current_col + 1);
                if !replace_cell(&mut writer, current_row, current_col, &e, row_changes.as_mut())? {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(event) => writer.write_event(event)?,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

/// Emit the changed cells that come before `col`, then the replacement for
/// the cell at `col` if it changed. Returns true when the original cell must
/// be dropped.
fn replace_cell(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: u32,
    col: u32,
    original: &BytesStart,
    cells: Option<&mut RowChanges>,
) -> Result<bool> {
    let Some(cells) = cells else {
        return Ok(false);
    };
    write_cells_before(writer, row, cells, col)?;
    match cells.remove(&col) {
        Some(value) => {
            let style = attribute(original, "s")?;
            write_cell(writer, &cell_reference(row - 1, col - 1), &value, style.as_deref())?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn write_cells_before(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    row: u32,
    cells: &mut RowChanges,
    before: u32,
) -> Result<()> {
    while let Some(entry) = cells.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let (col, value) = entry.remove_entry();
        write_cell(writer, &cell_reference(row - 1, col - 1), &value, None)?;
    }
    Ok(())
}

/// Emit brand new `<row>` elements for changed rows numbered below `before`
fn write_rows_before(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    pending: &mut SheetChanges,
    before: u32,
) -> Result<()> {
    while let Some(entry) = pending.first_entry() {
        if *entry.key() >= before {
            break;
        }
        let (row, mut cells) = entry.remove_entry();
        if cells.values().all(CellValue::is_empty) {
            continue;
        }
        let row_num = row.to_string();
        writer.write_event(Event::Start(
            BytesStart::new("row").with_attributes([("r", row_num.as_str())]),
        ))?;
        write_cells_before(writer, row, &mut cells, u32::MAX)?;
        writer.write_event(Event::End(BytesEnd::new("row")))?;
    }
    Ok(())
}

fn row_number(e: &BytesStart) -> Result<Option<u32>> {
    Ok(attribute(e, "r")?.and_then(|r| r.parse().ok()))
}

fn cell_column(e: &BytesStart) -> Result<Option<u32>> {
    Ok(attribute(e, "r")?
        .and_then(|r| parse_reference(&r))
        .map(|(_, col)| col))
}

/// Copy of a `<row>` start tag without its `spans` hint, which may no longer hold
fn without_spans(e: &BytesStart) -> Result<BytesStart<'static>> {
    let mut start = BytesStart::new("row");
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"spans" {
            start.push_attribute(attr);
        }
    }
    Ok(start)
}

fn used_range(table: &Table) -> String {
    let (rows, cols) = (table.last_row(), table.last_column());
    if rows == 0 || cols == 0 {
        return "A1".to_string();
    }
    format!("A1:{}", cell_reference(rows - 1, cols - 1))
}
