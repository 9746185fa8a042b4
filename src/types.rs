use crate::error::{ReportError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// Text values the spreadsheet layer uses to spell "no value".
const NULL_MARKERS: [&str; 5] = ["None", "nan", "NaN", "null", "NULL"];

/// Longest sheet name a spreadsheet accepts.
pub const MAX_SHEET_NAME: usize = 31;

/// One raw, untyped cell as delivered by the loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Blank, whitespace-only, a null marker, or a NaN number.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => {
                let t = s.trim();
                t.is_empty() || NULL_MARKERS.contains(&t)
            }
            Cell::Number(n) => n.is_nan(),
            Cell::Bool(_) | Cell::Date(_) => false,
        }
    }

    /// Trimmed textual form, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        let s = self.to_string();
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            // Integral numbers print without a trailing `.0` so ids like 17 stay "17".
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Number(n as f64)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Empty)
    }
}

/// Schema-free row/column store: named columns over rows of variant cells.
///
/// `origin` keeps each row's index in the sheet it was loaded from, so a
/// filtered copy still reports original row positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    origin: Vec<usize>,
}

impl Table {
    /// Header names are trimmed and made unique (`Name`, `Name__1`, ...).
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Table {
            columns: crate::util::unique_columns(columns),
            rows: Vec::new(),
            origin: Vec::new(),
        }
    }

    pub fn from_rows<S: AsRef<str>>(columns: &[S], rows: Vec<Vec<Cell>>) -> Self {
        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        let next = self.origin.last().map(|i| i + 1).unwrap_or(0);
        self.rows.push(row);
        self.origin.push(next);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ReportError::MissingColumn { column: name.to_string() })
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn row(&self, i: usize) -> &[Cell] {
        &self.rows[i]
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    /// Original (load-time) row index of local row `i`.
    pub fn origin(&self, i: usize) -> usize {
        self.origin[i]
    }

    /// Copy of the given local rows, keeping their original indices.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: rows.iter().map(|&i| self.rows[i].clone()).collect(),
            origin: rows.iter().map(|&i| self.origin[i]).collect(),
        }
    }
}

/// Closed gender category sets, one per sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderScheme {
    Child,
    Adult,
}

impl GenderScheme {
    pub fn labels(self) -> [&'static str; 3] {
        match self {
            GenderScheme::Child => ["boy", "girl", "unknown"],
            GenderScheme::Adult => ["female", "male", "unknown"],
        }
    }

    /// Maps a normalized (lowercase) value onto the closed set.
    pub fn classify(self, value: &str) -> &'static str {
        let labels = self.labels();
        labels[self.slot(value)]
    }

    pub fn slot(self, value: &str) -> usize {
        self.labels()[..2].iter().position(|l| *l == value).unwrap_or(2)
    }
}

/// Zero-filled counts over a scheme's three gender columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenderSplit {
    pub counts: [usize; 3],
}

impl GenderSplit {
    pub fn add(&mut self, scheme: GenderScheme, gender: &str) {
        self.counts[scheme.slot(gender)] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn get(&self, scheme: GenderScheme, gender: &str) -> usize {
        self.counts[scheme.slot(gender)]
    }
}

/// Calendar month used for timeline rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn of(date: NaiveDate) -> Self {
        Month { year: date.year(), month: date.month() }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || ReportError::InvalidMonth(s.to_string());
        let (y, m) = s.trim().split_once('-').ok_or_else(bad)?;
        let year: i32 = y.parse().map_err(|_| bad())?;
        let month: u32 = m.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Ok(Month { year, month })
    }
}

/// A named output table with string cells, ready for CSV or preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new<S: AsRef<str>>(name: &str, headers: &[S]) -> Self {
        Sheet {
            name: name.chars().take(MAX_SHEET_NAME).collect(),
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn from_tabled<T: Tabled>(name: &str, rows: &[T]) -> Self {
        let headers: Vec<String> = T::headers().into_iter().map(|h| h.into_owned()).collect();
        let mut sheet = Sheet::new(name, &headers);
        for r in rows {
            sheet.rows.push(r.fields().into_iter().map(|f| f.into_owned()).collect());
        }
        sheet
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn head(mut self, n: usize) -> Self {
        self.rows.truncate(n);
        self
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MetricRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}

impl MetricRow {
    pub fn new(metric: &str, value: impl ToString) -> Self {
        MetricRow { metric: metric.to_string(), value: value.to_string() }
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ProgramCountRow {
    #[serde(rename = "Program")]
    #[tabled(rename = "Program")]
    pub program: String,
    #[serde(rename = "Children")]
    #[tabled(rename = "Children")]
    pub children: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CombinationRow {
    #[serde(rename = "Combination")]
    #[tabled(rename = "Combination")]
    pub combination: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MonthlyCountRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MonthlyCategoryRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "Program")]
    #[tabled(rename = "Program")]
    pub category: String,
    #[serde(rename = "Count")]
    #[tabled(rename = "Count")]
    pub count: usize,
}

/// Value/count pair of a frequency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyRow {
    pub value: String,
    pub count: usize,
}

/// Count of entities sharing one multi-level path (e.g. oblast, raion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCount {
    pub path: Vec<String>,
    pub count: usize,
}

/// One row of a gender pivot: key columns plus zero-filled gender counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenderPivotRow {
    pub keys: Vec<String>,
    pub split: GenderSplit,
}

impl GenderPivotRow {
    pub fn total(&self) -> usize {
        self.split.total()
    }
}

/// Renders a gender pivot with the scheme's fixed columns and a Total.
pub fn gender_pivot_sheet(
    name: &str,
    key_headers: &[&str],
    scheme: GenderScheme,
    rows: &[GenderPivotRow],
) -> Sheet {
    let mut headers: Vec<String> = key_headers.iter().map(|h| h.to_string()).collect();
    headers.extend(scheme.labels().iter().map(|l| l.to_string()));
    headers.push("Total".to_string());
    let mut sheet = Sheet::new(name, &headers);
    for r in rows {
        let mut out = r.keys.clone();
        out.extend(r.split.counts.iter().map(|c| c.to_string()));
        out.push(r.total().to_string());
        sheet.push(out);
    }
    sheet
}

/// Headline numbers written to `summary.json`.
#[derive(Debug, Serialize, Default, Clone)]
pub struct SummaryStats {
    pub child_rows: usize,
    pub adult_rows: usize,
    pub children_considered: usize,
    pub children_with_structured_program: usize,
    pub child_cp_indicator: usize,
    pub adult_cp_indicator: usize,
    pub adults_considered: usize,
    pub child_blank_identifiers: usize,
    pub adult_blank_identifiers: usize,
    pub data_quality_conflicts: usize,
    pub skipped_sections: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cells_include_null_markers() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::text("   ").is_blank());
        assert!(Cell::text("None").is_blank());
        assert!(Cell::Number(f64::NAN).is_blank());
        assert!(!Cell::text("no").is_blank());
        assert!(!Cell::Number(0.0).is_blank());
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(Cell::Number(17.0).to_string(), "17");
        assert_eq!(Cell::Number(2.5).to_string(), "2.5");
        assert_eq!(Cell::Number(3.0).as_text().as_deref(), Some("3"));
    }

    #[test]
    fn table_pads_rows_and_tracks_origin() {
        let mut t = Table::new(&["a", "b", " a "]);
        assert_eq!(t.columns(), &["a", "b", "a__1"]);
        t.push_row(vec![Cell::from("x")]);
        t.push_row(vec![Cell::from("y"), Cell::from("z")]);
        assert_eq!(t.row(0).len(), 3);
        let sub = t.select_rows(&[1]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.origin(0), 1);
        assert!(matches!(t.column("nope"), Err(ReportError::MissingColumn { .. })));
    }

    #[test]
    fn gender_schemes_are_closed() {
        assert_eq!(GenderScheme::Child.classify("girl"), "girl");
        assert_eq!(GenderScheme::Child.classify("female"), "unknown");
        assert_eq!(GenderScheme::Adult.classify("male"), "male");
        let mut split = GenderSplit::default();
        split.add(GenderScheme::Adult, "female");
        split.add(GenderScheme::Adult, "other");
        assert_eq!(split.counts, [1, 0, 1]);
        assert_eq!(split.total(), 2);
    }

    #[test]
    fn month_parses_and_prints() {
        let m: Month = "2025-09".parse().unwrap();
        assert_eq!(m, Month { year: 2025, month: 9 });
        assert_eq!(m.to_string(), "2025-09");
        assert!("2025-13".parse::<Month>().is_err());
    }

    #[test]
    fn sheet_names_are_truncated() {
        let s = Sheet::new("A_very_long_sheet_name_that_exceeds_limits", &["x"]);
        assert_eq!(s.name.chars().count(), MAX_SHEET_NAME);
    }
}
