use crate::config::SheetConfig;
use crate::error::{ReportError, Result};
use crate::types::{Cell, Table};
use calamine::{open_workbook_auto, Data, Range, Reader};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{info, warn};

/// The two tables every report is computed from.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub child: Table,
    /// `None` when the input carries no adult sheet.
    pub adult: Option<Table>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub child_rows: usize,
    pub adult_rows: usize,
    /// Fully blank rows dropped across both sheets.
    pub blank_rows: usize,
    /// Header cells renamed to `name__N` because the name repeated.
    pub renamed_headers: usize,
}

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Loads the child sheet and, when present, the adult sheet.
///
/// Spreadsheets are read by sheet name. A CSV input is the child table only;
/// the adult table then comes from `sheets.adult_csv` if set.
pub fn load_workbook(path: &Path, sheets: &SheetConfig) -> Result<(Workbook, LoadReport)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let mut report = LoadReport::default();

    let (child, adult) = if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names().to_vec();
        if !names.iter().any(|n| n == &sheets.child) {
            return Err(ReportError::SheetNotFound { sheet: sheets.child.clone() });
        }
        let child = table_from_range(&workbook.worksheet_range(&sheets.child)?, &mut report);
        let adult = if names.iter().any(|n| n == &sheets.adult) {
            Some(table_from_range(&workbook.worksheet_range(&sheets.adult)?, &mut report))
        } else {
            warn!(sheet = %sheets.adult, "adult sheet not found; adult sections will be skipped");
            None
        };
        (child, adult)
    } else if ext == "csv" {
        let child = load_csv(path, &mut report)?;
        let adult = match &sheets.adult_csv {
            Some(p) => Some(load_csv(Path::new(p), &mut report)?),
            None => None,
        };
        (child, adult)
    } else {
        return Err(ReportError::UnsupportedInput { path: path.to_path_buf() });
    };

    report.child_rows = child.len();
    report.adult_rows = adult.as_ref().map_or(0, Table::len);
    info!(
        child_rows = report.child_rows,
        adult_rows = report.adult_rows,
        blank_rows = report.blank_rows,
        "workbook loaded"
    );
    Ok((Workbook { child, adult }, report))
}

/// Reads a CSV file with a header row; ragged rows are padded.
pub fn load_csv(path: &Path, report: &mut LoadReport) -> Result<Table> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut table = new_table(&headers, report);
    for record in rdr.records() {
        let record = record?;
        let row: Vec<Cell> = record
            .iter()
            .map(|v| if v.trim().is_empty() { Cell::Empty } else { Cell::text(v) })
            .collect();
        push_unless_blank(&mut table, row, report);
    }
    Ok(table)
}

fn table_from_range(range: &Range<Data>, report: &mut LoadReport) -> Table {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Table::default();
    };
    let headers: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, d)| match d {
            Data::Empty => format!("Unnamed: {}", i),
            other => other.to_string(),
        })
        .collect();
    let mut table = new_table(&headers, report);
    for row in rows {
        push_unless_blank(&mut table, row.iter().map(cell_from_data).collect(), report);
    }
    table
}

fn new_table(headers: &[String], report: &mut LoadReport) -> Table {
    let table = Table::new(headers);
    report.renamed_headers += table
        .columns()
        .iter()
        .zip(headers)
        .filter(|(unique, raw)| unique.as_str() != raw.trim())
        .count();
    table
}

fn push_unless_blank(table: &mut Table, row: Vec<Cell>, report: &mut LoadReport) {
    if row.iter().all(Cell::is_blank) {
        report.blank_rows += 1;
    } else {
        table.push_row(row);
    }
}

fn cell_from_data(d: &Data) -> Cell {
    match d {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::text(s.as_str()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(t) => Cell::Date(t.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_headers_are_trimmed_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "child.csv", " ID ,HEART,HEART\n1,1,2\n,,\n2,0\n");
        let (wb, report) = load_workbook(&path, &SheetConfig::default()).unwrap();
        assert_eq!(wb.child.columns(), &["ID", "HEART", "HEART__1"]);
        assert_eq!(wb.child.len(), 2);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(report.renamed_headers, 1);
        assert!(wb.adult.is_none());
        // ragged row padded
        assert_eq!(wb.child.cell(1, 2), &Cell::Empty);
    }

    #[test]
    fn adult_csv_is_loaded_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let child = write_csv(dir.path(), "child.csv", "ID\n1\n");
        let adult = write_csv(dir.path(), "adult.csv", "Full Name,Gender\nA B,female\n");
        let sheets = SheetConfig { adult_csv: Some(adult.to_string_lossy().into_owned()), ..SheetConfig::default() };
        let (wb, report) = load_workbook(&child, &sheets).unwrap();
        assert_eq!(report.adult_rows, 1);
        assert_eq!(wb.adult.unwrap().columns(), &["Full Name", "Gender"]);
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = load_workbook(Path::new("data.txt"), &SheetConfig::default()).unwrap_err();
        assert!(matches!(err, ReportError::UnsupportedInput { .. }));
    }

    #[test]
    fn spreadsheet_cells_map_to_cells() {
        assert_eq!(cell_from_data(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(cell_from_data(&Data::String("yes".into())), Cell::text("yes"));
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
        assert_eq!(cell_from_data(&Data::Bool(true)), Cell::Bool(true));
    }
}
