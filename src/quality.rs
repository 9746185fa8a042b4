// Data-quality checks over raw rows: identity conflicts between names and
// phone numbers, and likely duplicate child registrations.
//
// Only conflicting groups are reported.
use crate::error::Result;
use crate::types::{Cell, MetricRow, Sheet, Table};
use crate::util::to_date;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

/// Case-folded, whitespace-collapsed name; `None` when blank.
pub fn name_key(cell: &Cell) -> Option<String> {
    let text = cell.as_text()?;
    Some(text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
}

/// Digits of a phone number; falls back to the trimmed text when it has none.
pub fn phone_key(cell: &Cell) -> Option<String> {
    let text = cell.as_text()?;
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    Some(if digits.is_empty() { text } else { digits })
}

/// One key mapping to several distinct values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    /// Key as first written in the data.
    pub key: String,
    /// Distinct values, as first written, in row order.
    pub values: Vec<String>,
    /// Original row indices of the group.
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConflictReport {
    /// Distinct non-blank keys examined.
    pub keys_checked: usize,
    pub conflicts: Vec<ConflictGroup>,
}

type KeyFn = fn(&Cell) -> Option<String>;

fn find_conflicts(table: &Table, key_col: &str, key_fn: KeyFn, value_col: &str, value_fn: KeyFn) -> Result<ConflictReport> {
    let keys = table.column(key_col)?;
    let values = table.column(value_col)?;

    struct Group {
        key: String,
        seen: Vec<String>,
        values: Vec<String>,
        rows: Vec<usize>,
    }
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for (r, (k, v)) in keys.iter().zip(&values).enumerate() {
        let Some(norm) = key_fn(k) else { continue };
        let g = match index.get(&norm) {
            Some(&g) => g,
            None => {
                index.insert(norm, groups.len());
                groups.push(Group { key: k.as_text().unwrap_or_default(), seen: vec![], values: vec![], rows: vec![] });
                groups.len() - 1
            }
        };
        let group = &mut groups[g];
        group.rows.push(table.origin(r));
        if let Some(vnorm) = value_fn(v) {
            if !group.seen.contains(&vnorm) {
                group.seen.push(vnorm);
                group.values.push(v.as_text().unwrap_or_default());
            }
        }
    }

    let keys_checked = groups.len();
    let conflicts: Vec<ConflictGroup> = groups
        .into_iter()
        .filter(|g| g.values.len() > 1)
        .map(|g| ConflictGroup { key: g.key, values: g.values, rows: g.rows })
        .collect();
    debug!(keys = keys_checked, conflicts = conflicts.len(), key_col, value_col, "conflict check done");
    Ok(ConflictReport { keys_checked, conflicts })
}

/// Names linked to more than one distinct phone number.
pub fn name_phone_conflicts(table: &Table, name_col: &str, phone_col: &str) -> Result<ConflictReport> {
    find_conflicts(table, name_col, name_key, phone_col, phone_key)
}

/// Phone numbers linked to more than one distinct name.
pub fn phone_name_conflicts(table: &Table, name_col: &str, phone_col: &str) -> Result<ConflictReport> {
    find_conflicts(table, phone_col, phone_key, name_col, name_key)
}

impl ConflictReport {
    pub fn summary_rows(&self, key_label: &str, value_label: &str) -> Vec<MetricRow> {
        vec![
            MetricRow::new(&format!("{} values checked", key_label), self.keys_checked),
            MetricRow::new(
                &format!("{} values with more than one {}", key_label, value_label),
                self.conflicts.len(),
            ),
        ]
    }

    pub fn sheet(&self, name: &str, key_label: &str, value_label: &str) -> Sheet {
        let headers = [
            key_label.to_string(),
            format!("Distinct {}", value_label),
            format!("{} values", value_label),
            "Rows".to_string(),
        ];
        let mut sheet = Sheet::new(name, &headers);
        for c in &self.conflicts {
            sheet.push(vec![
                c.key.clone(),
                c.values.len().to_string(),
                c.values.join("; "),
                join_rows(&c.rows),
            ]);
        }
        sheet
    }
}

fn join_rows(rows: &[usize]) -> String {
    rows.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

/// Columns used by the duplicate-child check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateColumns {
    pub child_name: String,
    pub settlement: String,
    pub parent_name: String,
    pub parent_phone: String,
    pub date_of_birth: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateVerdict {
    /// Date of birth agrees, or at least two of parent name, phone and date of birth agree.
    Likely,
    /// Same name and settlement but the supporting fields disagree.
    Review,
}

impl DuplicateVerdict {
    pub fn label(self) -> &'static str {
        match self {
            DuplicateVerdict::Likely => "Likely duplicate",
            DuplicateVerdict::Review => "Review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub row_index: usize,
    pub parent_name: String,
    pub parent_phone: String,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub child_name: String,
    pub settlement: String,
    pub entries: Vec<DuplicateEntry>,
    /// Supporting fields whose non-blank values all agree.
    pub shared: Vec<&'static str>,
    pub verdict: DuplicateVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DuplicateReport {
    pub rows_checked: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// Groups rows by child name and settlement, then compares parent name,
/// phone and date of birth within each repeated group.
pub fn child_duplicates(table: &Table, cols: &DuplicateColumns) -> Result<DuplicateReport> {
    let names = table.column(&cols.child_name)?;
    let settlements = table.column(&cols.settlement)?;
    let parents = table.column(&cols.parent_name)?;
    let phones = table.column(&cols.parent_phone)?;
    let dobs = table.column(&cols.date_of_birth)?;

    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut buckets: Vec<(String, String, Vec<usize>)> = Vec::new();
    let mut rows_checked = 0usize;
    for r in 0..table.len() {
        let Some(name) = name_key(names[r]) else { continue };
        rows_checked += 1;
        let settlement = name_key(settlements[r]).unwrap_or_default();
        let key = (name, settlement);
        match index.get(&key) {
            Some(&b) => buckets[b].2.push(r),
            None => {
                index.insert(key, buckets.len());
                buckets.push((
                    names[r].as_text().unwrap_or_default(),
                    settlements[r].as_text().unwrap_or_default(),
                    vec![r],
                ));
            }
        }
    }

    let mut groups = Vec::new();
    for (child_name, settlement, rows) in buckets.into_iter().filter(|b| b.2.len() > 1) {
        let entries: Vec<DuplicateEntry> = rows
            .iter()
            .map(|&r| DuplicateEntry {
                row_index: table.origin(r),
                parent_name: parents[r].as_text().unwrap_or_default(),
                parent_phone: phones[r].as_text().unwrap_or_default(),
                date_of_birth: to_date(dobs[r]),
            })
            .collect();

        let mut shared = Vec::new();
        if agrees(rows.iter().map(|&r| name_key(parents[r]))) {
            shared.push("parent name");
        }
        if agrees(rows.iter().map(|&r| phone_key(phones[r]))) {
            shared.push("parent phone");
        }
        let dob_agrees = agrees(entries.iter().map(|e| e.date_of_birth));
        if dob_agrees {
            shared.push("date of birth");
        }
        let verdict = if dob_agrees || shared.len() >= 2 {
            DuplicateVerdict::Likely
        } else {
            DuplicateVerdict::Review
        };
        groups.push(DuplicateGroup { child_name, settlement, entries, shared, verdict });
    }
    debug!(rows = rows_checked, groups = groups.len(), "duplicate child check done");
    Ok(DuplicateReport { rows_checked, groups })
}

/// At least one value present and every present value equal.
fn agrees<T: PartialEq>(values: impl Iterator<Item = Option<T>>) -> bool {
    let mut first: Option<T> = None;
    for v in values.flatten() {
        match &first {
            None => first = Some(v),
            Some(f) if *f != v => return false,
            Some(_) => {}
        }
    }
    first.is_some()
}

impl DuplicateReport {
    pub fn rows_involved(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn likely(&self) -> usize {
        self.groups.iter().filter(|g| g.verdict == DuplicateVerdict::Likely).count()
    }

    pub fn summary_rows(&self) -> Vec<MetricRow> {
        vec![
            MetricRow::new("Rows with a child name", self.rows_checked),
            MetricRow::new("Repeated child name + settlement groups", self.groups.len()),
            MetricRow::new("Rows in repeated groups", self.rows_involved()),
            MetricRow::new("Likely duplicate groups", self.likely()),
        ]
    }

    /// One line per row of every repeated group.
    pub fn sheet(&self, name: &str) -> Sheet {
        let headers = [
            "Child Full Name",
            "Settlement",
            "Row",
            "Full Parent Name",
            "Parents phone",
            "Date of birth",
            "Matching fields",
            "Verdict",
        ];
        let mut sheet = Sheet::new(name, &headers);
        for g in &self.groups {
            for e in &g.entries {
                sheet.push(vec![
                    g.child_name.clone(),
                    g.settlement.clone(),
                    e.row_index.to_string(),
                    e.parent_name.clone(),
                    e.parent_phone.clone(),
                    e.date_of_birth.map(|d| d.to_string()).unwrap_or_default(),
                    g.shared.join(", "),
                    g.verdict.label().to_string(),
                ]);
            }
        }
        sheet
    }
}
