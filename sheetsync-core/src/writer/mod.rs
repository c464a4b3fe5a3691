// ! Writer module for persisting workbooks

mod xlsx_update;
mod xlsx_writer;

pub use xlsx_update::update_workbook_xlsx;
pub use xlsx_writer::write_workbook_xlsx;

use crate::reader::Workbook;
use anyhow::{Context, Result};
use std::path::Path;

/// Save a workbook as a new file (supports XLSX output only)
pub fn save_workbook<P: AsRef<Path>>(workbook: &Workbook, output_path: P) -> Result<()> {
    let output = output_path.as_ref();

    // Determine file type by extension
    match output.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") => write_workbook_xlsx(workbook, output)
            .with_context(|| format!("Failed to write workbook: {}", output.display())),
        Some("ods") => {
            anyhow::bail!("ODS format not yet supported for writing")
        }
        _ => anyhow::bail!("Unsupported file format: {}", output.display()),
    }
}

/// Write the cells changed since `workbook` was loaded back into a copy of
/// its source file, leaving everything else in the package untouched
pub fn update_workbook<P: AsRef<Path>>(workbook: &Workbook, output_path: P) -> Result<()> {
    let output = output_path.as_ref();
    let input = workbook.path.as_path();

    match input.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") || ext.eq_ignore_ascii_case("xlsm") => {
            update_workbook_xlsx(workbook, input, output)
                .with_context(|| format!("Failed to update workbook: {}", output.display()))
        }
        Some("ods") => {
            anyhow::bail!("ODS format not yet supported for writing")
        }
        _ => anyhow::bail!("Unsupported file format: {}", input.display()),
    }
}
