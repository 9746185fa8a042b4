use crate::error::Result;
use crate::types::Sheet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::debug;

/// Writes one `<sheet name>.csv` per sheet into `dir`, creating it if needed.
pub fn write_sheets(dir: &Path, sheets: &[Sheet]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let path = dir.join(format!("{}.csv", sheet.name));
        write_csv(&path, sheet)?;
        written.push(path);
    }
    Ok(written)
}

pub fn write_csv(path: &Path, sheet: &Sheet) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(&sheet.headers)?;
    for r in &sheet.rows {
        wtr.write_record(r)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = sheet.len(), "sheet written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown rendering of the first `max_rows` rows.
pub fn render_sheet(sheet: &Sheet, max_rows: usize) -> String {
    if sheet.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(sheet.headers.iter().cloned());
    for r in sheet.rows.iter().take(max_rows) {
        builder.push_record(r.iter().cloned());
    }
    builder.build().with(Style::markdown()).to_string()
}

pub fn preview_sheet(title: &str, sheet: &Sheet, max_rows: usize) {
    println!("{}", title);
    println!("({} rows, exported to {}.csv)\n", sheet.len(), sheet.name);
    println!("{}\n", render_sheet(sheet, max_rows));
}
