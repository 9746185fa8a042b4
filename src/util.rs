// Value normalizers and small formatting helpers.
//
// Every normalizer here is total: any cell, however malformed, maps to a
// value (`false`, `0`, the placeholder category, or no date). Callers never
// have to handle a parse failure.
use crate::types::{Cell, GenderScheme};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lowercased, trimmed values that count as "yes".
pub const AFFIRMATIVE: [&str; 6] = ["yes", "y", "true", "1", "completed", "done"];

/// Category used for blank or missing text.
pub const PLACEHOLDER: &str = "Unknown";

/// Category used for text present but outside an accepted set.
pub const NON_STANDARD: &str = "unknown";

/// Largest day count accepted as a spreadsheet serial date.
const MAX_SERIAL: f64 = 60000.0;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})$").expect("static regex"));
static US_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("static regex"));
static COMPACT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{4})$").expect("static regex"));

/// Last-resort layouts, all month-first where ambiguous.
const FALLBACK_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const FALLBACK_DATE_FORMATS: [&str; 7] = [
    "%m-%d-%Y",
    "%m.%d.%Y",
    "%m/%d/%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Trim, lowercase, membership test in [`AFFIRMATIVE`].
pub fn to_flag(cell: &Cell) -> bool {
    match cell {
        Cell::Bool(b) => *b,
        Cell::Empty | Cell::Date(_) => false,
        other => {
            let s = other.to_string().trim().to_lowercase();
            AFFIRMATIVE.contains(&s.as_str())
        }
    }
}

/// Numeric value of a cell; blank or unparseable counts as 0.
///
/// Negative numbers pass through unchanged.
pub fn to_count(cell: &Cell) -> f64 {
    let n = match cell {
        Cell::Number(n) => *n,
        Cell::Bool(b) => f64::from(u8::from(*b)),
        Cell::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Cell::Empty | Cell::Date(_) => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Trimmed text, or [`PLACEHOLDER`] when blank.
pub fn to_category(cell: &Cell) -> String {
    cell.as_text().unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Like [`to_category`], but values outside `accepted` (compared
/// case-insensitively) map to [`NON_STANDARD`]. Matches return the accepted
/// spelling.
pub fn to_category_in(cell: &Cell, accepted: &[&str]) -> String {
    match cell.as_text() {
        None => PLACEHOLDER.to_string(),
        Some(v) => accepted
            .iter()
            .find(|a| a.eq_ignore_ascii_case(&v))
            .map(|a| a.to_string())
            .unwrap_or_else(|| NON_STANDARD.to_string()),
    }
}

/// Lowercased gender text, or [`PLACEHOLDER`] when blank. Not yet mapped
/// onto a closed set, so entity resolution can still skip blanks.
pub fn to_gender_text(cell: &Cell) -> String {
    cell.as_text()
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Gender mapped onto the scheme's closed set.
pub fn to_gender(cell: &Cell, scheme: GenderScheme) -> &'static str {
    scheme.classify(&to_gender_text(cell))
}

/// True for both placeholder spellings.
pub fn is_placeholder(value: &str) -> bool {
    value.eq_ignore_ascii_case(PLACEHOLDER)
}

/// Parses heterogeneous date cells. First matching rule wins:
///
/// 1. a native date from the loader,
/// 2. `YYYY-MM-DD` / `YYYY/MM/DD`,
/// 3. `M/D/YYYY` (month first, never day first),
/// 4. `MMDDYYYY`,
/// 5. a spreadsheet serial in `[1, 60000]` (epoch 1899-12-30), or for a
///    larger whole number, its digits read as `MMDDYYYY`,
/// 6. a handful of month-first generic layouts.
///
/// Anything else is `None`.
pub fn to_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Date(d) => Some(*d),
        Cell::Number(n) => from_serial(*n).or_else(|| compact_number(*n)),
        Cell::Text(s) => parse_date_text(s.trim()),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    if let Some(c) = ISO_DATE.captures(s) {
        return ymd(&c[1], &c[2], &c[3]);
    }
    if let Some(c) = US_DATE.captures(s) {
        return ymd(&c[3], &c[1], &c[2]);
    }
    if let Some(c) = COMPACT_DATE.captures(s) {
        return ymd(&c[3], &c[1], &c[2]);
    }
    if let Ok(n) = s.parse::<f64>() {
        return from_serial(n);
    }
    generic_date(s)
}

/// An `MMDDYYYY` date that a spreadsheet stored as a plain number. January
/// to September lose their leading zero, so seven digits are padded back.
fn compact_number(n: f64) -> Option<NaiveDate> {
    if n.fract() != 0.0 || !(1e6..1e8).contains(&n) {
        return None;
    }
    let s = format!("{:08}", n as u64);
    let c = COMPACT_DATE.captures(&s)?;
    ymd(&c[3], &c[1], &c[2])
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Spreadsheet day count since 1899-12-30; the fractional part is a time of day.
pub fn from_serial(n: f64) -> Option<NaiveDate> {
    if !(1.0..=MAX_SERIAL).contains(&n) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_days(Days::new(n.floor() as u64))
}

fn generic_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok().map(|dt| dt.date()))
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

/// Trims header names and suffixes repeats: `Name`, `Name__1`, `Name__2`.
pub fn unique_columns<S: AsRef<str>>(cols: &[S]) -> Vec<String> {
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    cols.iter()
        .map(|c| {
            let c = c.as_ref().trim().to_string();
            match seen.get_mut(&c) {
                Some(n) => {
                    *n += 1;
                    format!("{}__{}", c, n)
                }
                None => {
                    seen.insert(c.clone(), 0);
                    c
                }
            }
        })
        .collect()
}

/// Session totals print as integers when integral.
pub fn format_count(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_formatted_string(&Locale::en)
    } else {
        format_number(n, 2)
    }
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus thousands separators, e.g. `1,234,567.89`.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

pub fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return format_number(0.0, 2);
    }
    format_number(part as f64 * 100.0 / whole as f64, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn flags_accept_fixed_tokens_only() {
        for yes in ["yes", " YES ", "y", "True", "1", "Completed", "done"] {
            assert!(to_flag(&Cell::from(yes)), "{yes}");
        }
        for no in ["no", "", "2", "n/a", "completed?"] {
            assert!(!to_flag(&Cell::from(no)), "{no}");
        }
        assert!(to_flag(&Cell::Number(1.0)));
        assert!(to_flag(&Cell::Bool(true)));
        assert!(!to_flag(&Cell::Empty));
    }

    #[test]
    fn counts_default_to_zero() {
        assert_eq!(to_count(&Cell::from("3")), 3.0);
        assert_eq!(to_count(&Cell::from(" 2.5 ")), 2.5);
        assert_eq!(to_count(&Cell::from("abc")), 0.0);
        assert_eq!(to_count(&Cell::Empty), 0.0);
        assert_eq!(to_count(&Cell::Number(-1.0)), -1.0);
    }

    #[test]
    fn categories_keep_the_two_unknowns_apart() {
        assert_eq!(to_category(&Cell::from("  Kyiv ")), "Kyiv");
        assert_eq!(to_category(&Cell::from("")), PLACEHOLDER);
        assert_eq!(to_category_in(&Cell::from("Boy"), &["boy", "girl"]), "boy");
        assert_eq!(to_category_in(&Cell::from("other"), &["boy", "girl"]), NON_STANDARD);
        assert_eq!(to_category_in(&Cell::Empty, &["boy", "girl"]), PLACEHOLDER);
        assert_ne!(PLACEHOLDER, NON_STANDARD);
    }

    #[test]
    fn gender_maps_blank_and_foreign_to_unknown() {
        assert_eq!(to_gender(&Cell::from(" Girl "), GenderScheme::Child), "girl");
        assert_eq!(to_gender(&Cell::Empty, GenderScheme::Child), "unknown");
        assert_eq!(to_gender(&Cell::from("male"), GenderScheme::Child), "unknown");
        assert_eq!(to_gender(&Cell::from("Male"), GenderScheme::Adult), "male");
    }

    #[test]
    fn dates_follow_precedence() {
        assert_eq!(to_date(&Cell::Date(d(2024, 1, 2))), Some(d(2024, 1, 2)));
        assert_eq!(to_date(&Cell::from("2025-09-04")), Some(d(2025, 9, 4)));
        assert_eq!(to_date(&Cell::from("2025/09/04")), Some(d(2025, 9, 4)));
        assert_eq!(to_date(&Cell::from("9/5/2025")), Some(d(2025, 9, 5)));
        assert_eq!(to_date(&Cell::from("09042025")), Some(d(2025, 9, 4)));
        assert_eq!(to_date(&Cell::from("45235")), Some(d(2023, 11, 5)));
        assert_eq!(to_date(&Cell::Number(45234.0)), Some(d(2023, 11, 4)));
        assert_eq!(to_date(&Cell::from("2025-09-04 00:00:00")), Some(d(2025, 9, 4)));
    }

    #[test]
    fn compact_dates_stored_as_numbers_parse() {
        assert_eq!(to_date(&Cell::Number(10042025.0)), Some(d(2025, 10, 4)));
        assert_eq!(to_date(&Cell::Number(1312025.0)), Some(d(2025, 1, 31)));
        assert_eq!(to_date(&Cell::Number(10042025.5)), None);
        assert_eq!(to_date(&Cell::Number(13012025.0)), None);
    }

    #[test]
    fn slash_dates_are_never_day_first() {
        assert_eq!(to_date(&Cell::from("13/01/2025")), None);
        assert_eq!(to_date(&Cell::from("01/13/2025")), Some(d(2025, 1, 13)));
    }

    #[test]
    fn bad_dates_are_absent() {
        for bad in ["", "soon", "00000000", "2025-02-30", "99999"] {
            assert_eq!(to_date(&Cell::from(bad)), None, "{bad}");
        }
        assert_eq!(to_date(&Cell::Number(0.0)), None);
        assert_eq!(to_date(&Cell::Number(60001.0)), None);
        assert_eq!(to_date(&Cell::Empty), None);
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        assert_eq!(unique_columns(&["a", "a", " b", "a"]), vec!["a", "a__1", "b", "a__2"]);
    }

    #[test]
    fn numbers_format_with_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_count(1200.0), "1,200");
        assert_eq!(format_count(2.5), "2.50");
        assert_eq!(percent(1, 4), "25.00");
        assert_eq!(percent(0, 0), "0.00");
    }
}
