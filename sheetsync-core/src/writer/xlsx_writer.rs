// ! XLSX writer that serializes an in-memory workbook back to disk

use crate::reader::{CellValue, Table, Workbook};
use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const WORKSHEET_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Write every table of the workbook as a worksheet of a new XLSX package.
///
/// Only cell values are written. Use [`super::update_workbook`] to save a
/// workbook that was loaded from an existing file.
pub fn write_workbook_xlsx(workbook: &Workbook, output_path: &Path) -> Result<()> {
    let output_file = File::create(output_path)?;
    let mut zip_writer = ZipWriter::new(output_file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: Vec<(String, String)> = vec![
        ("[Content_Types].xml".to_string(), content_types_xml(workbook.tables.len())?),
        ("_rels/.rels".to_string(), root_rels_xml()?),
        ("xl/workbook.xml".to_string(), workbook_xml(workbook)?),
        (
            "xl/_rels/workbook.xml.rels".to_string(),
            workbook_rels_xml(workbook.tables.len())?,
        ),
    ];

    for (name, content) in parts {
        zip_writer.start_file(name, options)?;
        zip_writer.write_all(content.as_bytes())?;
    }

    for (i, table) in workbook.tables.iter().enumerate() {
        zip_writer.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip_writer.write_all(sheet_xml(table)?.as_bytes())?;
    }

    zip_writer.finish()?;
    Ok(())
}

fn new_document() -> Result<Writer<Cursor<Vec<u8>>>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    Ok(writer)
}

fn finish_document(writer: Writer<Cursor<Vec<u8>>>) -> Result<String> {
    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

fn content_types_xml(sheet_count: usize) -> Result<String> {
    let mut writer = new_document()?;
    writer.write_event(Event::Start(BytesStart::new("Types").with_attributes([(
        "xmlns",
        "http://schemas.openxmlformats.org/package/2006/content-types",
    )])))?;
    writer.write_event(Event::Empty(BytesStart::new("Default").with_attributes([
        ("Extension", "rels"),
        (
            "ContentType",
            "application/vnd.openxmlformats-package.relationships+xml",
        ),
    ])))?;
    writer.write_event(Event::Empty(BytesStart::new("Default").with_attributes([
        ("Extension", "xml"),
        ("ContentType", "application/xml"),
    ])))?;
    writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
        ("PartName", "/xl/workbook.xml"),
        (
            "ContentType",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
        ),
    ])))?;
    for i in 1..=sheet_count {
        let part_name = format!("/xl/worksheets/sheet{}.xml", i);
        writer.write_event(Event::Empty(BytesStart::new("Override").with_attributes([
            ("PartName", part_name.as_str()),
            (
                "ContentType",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
            ),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Types")))?;
    finish_document(writer)
}

fn root_rels_xml() -> Result<String> {
    let mut writer = new_document()?;
    writer.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", PKG_REL_NS)]),
    ))?;
    writer.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
        ("Id", "rId1"),
        ("Type", DOCUMENT_REL),
        ("Target", "xl/workbook.xml"),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    finish_document(writer)
}

fn workbook_xml(workbook: &Workbook) -> Result<String> {
    let mut writer = new_document()?;
    writer.write_event(Event::Start(
        BytesStart::new("workbook").with_attributes([("xmlns", MAIN_NS), ("xmlns:r", REL_NS)]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("sheets")))?;
    for (i, table) in workbook.tables.iter().enumerate() {
        let sheet_id = (i + 1).to_string();
        let rel_id = format!("rId{}", i + 1);
        writer.write_event(Event::Empty(BytesStart::new("sheet").with_attributes([
            ("name", table.name.as_str()),
            ("sheetId", sheet_id.as_str()),
            ("r:id", rel_id.as_str()),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("sheets")))?;
    writer.write_event(Event::End(BytesEnd::new("workbook")))?;
    finish_document(writer)
}

fn workbook_rels_xml(sheet_count: usize) -> Result<String> {
    let mut writer = new_document()?;
    writer.write_event(Event::Start(
        BytesStart::new("Relationships").with_attributes([("xmlns", PKG_REL_NS)]),
    ))?;
    for i in 1..=sheet_count {
        let rel_id = format!("rId{}", i);
        let target = format!("worksheets/sheet{}.xml", i);
        writer.write_event(Event::Empty(BytesStart::new("Relationship").with_attributes([
            ("Id", rel_id.as_str()),
            ("Type", WORKSHEET_REL),
            ("Target", target.as_str()),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
    finish_document(writer)
}

fn sheet_xml(table: &Table) -> Result<String> {
    let mut writer = new_document()?;
    writer.write_event(Event::Start(
        BytesStart::new("worksheet").with_attributes([("xmlns", MAIN_NS)]),
    ))?;

    if table.rows().iter().all(|r| r.iter().all(CellValue::is_empty)) {
        writer.write_event(Event::Empty(BytesStart::new("sheetData")))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
        for (r, cells) in table.rows().iter().enumerate() {
            if cells.iter().all(CellValue::is_empty) {
                continue;
            }
            let row_num = (r + 1).to_string();
            writer.write_event(Event::Start(
                BytesStart::new("row").with_attributes([("r", row_num.as_str())]),
            ))?;
            for (c, value) in cells.iter().enumerate() {
                write_cell(&mut writer, &cell_reference(r as u32, c as u32), value, None)?;
            }
            writer.write_event(Event::End(BytesEnd::new("row")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("worksheet")))?;
    finish_document(writer)
}

/// Write one `<c>` element; empty values write nothing
pub(super) fn write_cell(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    reference: &str,
    value: &CellValue,
    style: Option<&str>,
) -> Result<()> {
    let mut start = BytesStart::new("c").with_attributes([("r", reference)]);
    if let Some(s) = style {
        start.push_attribute(("s", s));
    }

    let (cell_type, text) = match value {
        CellValue::Empty => return Ok(()),
        CellValue::Text(s) if s.is_empty() => return Ok(()),
        CellValue::Text(s) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Start(BytesStart::new("is")))?;
            writer.write_event(Event::Start(
                BytesStart::new("t").with_attributes([("xml:space", "preserve")]),
            ))?;
            writer.write_event(Event::Text(BytesText::new(s)))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("is")))?;
            writer.write_event(Event::End(BytesEnd::new("c")))?;
            return Ok(());
        }
        CellValue::Number(n) => (None, n.to_string()),
        CellValue::Boolean(b) => (Some("b"), if *b { "1" } else { "0" }.to_string()),
        CellValue::Error(e) => (Some("e"), e.clone()),
    };

    if let Some(t) = cell_type {
        start.push_attribute(("t", t));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new("v")))?;
    writer.write_event(Event::Text(BytesText::new(&text)))?;
    writer.write_event(Event::End(BytesEnd::new("v")))?;
    writer.write_event(Event::End(BytesEnd::new("c")))?;
    Ok(())
}

/// Convert 0-based coordinates to an A1-style reference
pub(super) fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", col_to_letter(col), row + 1)
}

/// Convert column number to letter (0 -> A, 1 -> B, etc.)
fn col_to_letter(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(4, 25), "Z5");
        assert_eq!(cell_reference(9, 26), "AA10");
        assert_eq!(cell_reference(0, 701), "ZZ1");
    }

    #[test]
    fn test_cell_keeps_style() {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_cell(&mut writer, "B2", &CellValue::Number(3.0), Some("4")).unwrap();
        write_cell(&mut writer, "C2", &CellValue::Empty, Some("4")).unwrap();
        let xml = String::from_utf8(writer.into_inner().into_inner()).unwrap();
        assert_eq!(xml, r#"<c r="B2" s="4"><v>3</v></c>"#);
    }

    #[test]
    fn test_sheet_xml_escapes_text() {
        let table = Table::from_text_rows("Stores", &[&["Store Name"], &["Smith & <Sons>"]]);
        let xml = sheet_xml(&table).unwrap();
        assert!(xml.contains(r#"<c r="A2" t="inlineStr">"#));
        assert!(xml.contains("Smith &amp; &lt;Sons&gt;"));
    }

    #[test]
    fn test_empty_sheet_has_empty_sheet_data() {
        let xml = sheet_xml(&Table::new("Logs")).unwrap();
        assert!(xml.contains("<sheetData/>"));
    }

    #[test]
    fn test_workbook_xml_lists_sheets_in_order() {
        let mut workbook = Workbook::new("master.xlsx");
        workbook.push_table(Table::new("Stores"));
        workbook.push_table(Table::new("Tablets"));
        let xml = workbook_xml(&workbook).unwrap();
        let stores = xml.find(r#"name="Stores""#).unwrap();
        let tablets = xml.find(r#"name="Tablets""#).unwrap();
        assert!(stores < tablets);
        assert!(xml.contains(r#"r:id="rId2""#));
    }
}
