// First-achievement timelines.
//
// Two triggers share the same output shape:
//
// * a program's own completion flag paired with that program's own date
//   column (`first_completion`), and
// * a running session total crossing `SESSION_THRESHOLD` as an entity's
//   rows accumulate in date order (`first_cumulative`).
//
// Each entity contributes at most one `Achievement`. Monthly rollups only
// see achievements with a known date.
use crate::entity::{EntitySet, Identity};
use crate::error::{ReportError, Result};
use crate::sessions::{row_totals, SESSION_THRESHOLD};
use crate::structured::MAX_PROGRAMS;
use crate::types::{
    GenderPivotRow, GenderScheme, GenderSplit, MetricRow, Month, MonthlyCategoryRow, MonthlyCountRow,
    Sheet, Table,
};
use crate::util::{format_count, to_date, to_flag, to_gender};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// A program whose completion flag and completion date live in two columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedProgram {
    pub name: String,
    pub completed: String,
    pub date: String,
}

impl DatedProgram {
    pub fn new(name: &str, completed: &str, date: &str) -> Self {
        DatedProgram { name: name.to_string(), completed: completed.to_string(), date: date.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub key: String,
    /// Local row that produced the achievement.
    pub row: usize,
    /// The same row's index in the loaded sheet.
    pub row_index: usize,
    pub date: Option<NaiveDate>,
    /// Program that completed first; `None` for session thresholds.
    pub category: Option<String>,
    pub gender: &'static str,
    /// Entity's total sessions, for session thresholds.
    pub total_sessions: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub scheme: GenderScheme,
    /// Fixed category set used to zero-fill the monthly program table.
    pub categories: Vec<String>,
    pub achievements: Vec<Achievement>,
    /// Entities considered.
    pub considered: usize,
    /// Entities whose trigger condition is true, dated or not.
    pub triggered: usize,
    /// Flag set but no usable date.
    pub missing_dates: usize,
}

/// Earliest dated completion per entity across `programs`.
///
/// A program's date only counts on rows where its own flag is true. Ties on
/// the date go to the first program in declaration order, then to the lowest
/// row. `missing_dates` counts rows with a true flag whose date is absent.
pub fn first_completion(
    table: &Table,
    identity: &Identity,
    programs: &[DatedProgram],
    gender_col: &str,
    scheme: GenderScheme,
) -> Result<Timeline> {
    if programs.is_empty() || programs.len() > MAX_PROGRAMS {
        return Err(ReportError::ProgramCount { got: programs.len() });
    }
    let n = table.len();
    let mut row_first: Vec<Option<(NaiveDate, usize)>> = vec![None; n];
    let mut row_flagged = vec![false; n];
    let mut row_missing = vec![false; n];

    for (p, prog) in programs.iter().enumerate() {
        let done = table.column(&prog.completed)?;
        let dates = table.column(&prog.date)?;
        for r in 0..n {
            if !to_flag(done[r]) {
                continue;
            }
            row_flagged[r] = true;
            match to_date(dates[r]) {
                Some(d) => {
                    if row_first[r].map_or(true, |(best, _)| d < best) {
                        row_first[r] = Some((d, p));
                    }
                }
                None => row_missing[r] = true,
            }
        }
    }
    let missing_dates = row_missing.iter().filter(|m| **m).count();

    let genders: Vec<&'static str> = table
        .column(gender_col)?
        .into_iter()
        .map(|c| to_gender(c, scheme))
        .collect();
    let set = EntitySet::resolve(table, identity)?;

    let mut achievements = Vec::new();
    let mut triggered = 0usize;
    for e in set.iter() {
        if e.rows.iter().any(|&r| row_flagged[r]) {
            triggered += 1;
        }
        // Rows are ascending, so the strict comparison keeps the lowest row on ties.
        let mut best: Option<(NaiveDate, usize, usize)> = None;
        for &r in &e.rows {
            if let Some((d, p)) = row_first[r] {
                if best.map_or(true, |(bd, _, _)| d < bd) {
                    best = Some((d, p, r));
                }
            }
        }
        if let Some((d, p, r)) = best {
            achievements.push(Achievement {
                key: e.key.clone(),
                row: r,
                row_index: table.origin(r),
                date: Some(d),
                category: Some(programs[p].name.clone()),
                gender: genders[r],
                total_sessions: None,
            });
        }
    }

    if missing_dates > 0 {
        warn!(rows = missing_dates, "completed flag set but completion date missing or unparseable");
    }
    debug!(entities = set.len(), achieved = achievements.len(), "first completion timeline built");
    Ok(Timeline {
        scheme,
        categories: programs.iter().map(|p| p.name.clone()).collect(),
        achievements,
        considered: set.len(),
        triggered,
        missing_dates,
    })
}

/// First row at which an entity's running session total reaches the threshold.
///
/// Rows are ordered by date, undated rows last, then by row index. Entities
/// whose total never reaches the threshold have no achievement; entities that
/// reach it on an undated row have an undated achievement.
pub fn first_cumulative(
    table: &Table,
    identity: &Identity,
    session_columns: &[String],
    date_col: &str,
    gender_col: &str,
    scheme: GenderScheme,
) -> Result<Timeline> {
    let totals = row_totals(table, session_columns)?;
    let dates: Vec<Option<NaiveDate>> = table.column(date_col)?.into_iter().map(to_date).collect();
    let genders: Vec<&'static str> = table
        .column(gender_col)?
        .into_iter()
        .map(|c| to_gender(c, scheme))
        .collect();
    let set = EntitySet::resolve(table, identity)?;

    let mut achievements = Vec::new();
    let mut triggered = 0usize;
    for e in set.iter() {
        let total: f64 = e.rows.iter().map(|&r| totals[r]).sum();
        if total < SESSION_THRESHOLD {
            continue;
        }
        triggered += 1;

        let mut ordered = e.rows.clone();
        ordered.sort_by_key(|&r| (dates[r].is_none(), dates[r], r));
        let mut running = 0.0;
        // Summing in a different order can leave the running total a rounding
        // error short of a total that met the threshold; the last row crosses.
        let crossing = ordered
            .iter()
            .copied()
            .find(|&r| {
                running += totals[r];
                running >= SESSION_THRESHOLD
            })
            .or_else(|| ordered.last().copied());
        if let Some(r) = crossing {
            achievements.push(Achievement {
                key: e.key.clone(),
                row: r,
                row_index: table.origin(r),
                date: dates[r],
                category: None,
                gender: genders[r],
                total_sessions: Some(total),
            });
        }
    }

    let dated = achievements.iter().filter(|a| a.date.is_some()).count();
    let missing_dates = triggered - dated;
    if missing_dates > 0 {
        warn!(entities = missing_dates, "indicator reached but no usable date");
    }
    debug!(entities = set.len(), triggered, dated, "cumulative session timeline built");
    Ok(Timeline {
        scheme,
        categories: Vec::new(),
        achievements,
        considered: set.len(),
        triggered,
        missing_dates,
    })
}

impl Timeline {
    /// Achievements with a known date.
    pub fn dated(&self) -> impl Iterator<Item = (&Achievement, NaiveDate)> + '_ {
        self.achievements.iter().filter_map(|a| a.date.map(|d| (a, d)))
    }

    pub fn achieved(&self) -> usize {
        self.dated().count()
    }

    pub fn months(&self) -> Vec<Month> {
        self.dated()
            .map(|(_, d)| Month::of(d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn monthly_total(&self) -> Vec<MonthlyCountRow> {
        let mut counts: BTreeMap<Month, usize> = BTreeMap::new();
        for (_, d) in self.dated() {
            *counts.entry(Month::of(d)).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(m, count)| MonthlyCountRow { month: m.to_string(), count })
            .collect()
    }

    /// Month x category counts; every category appears for every month.
    pub fn monthly_by_category(&self) -> Vec<MonthlyCategoryRow> {
        let mut counts: BTreeMap<(Month, &str), usize> = BTreeMap::new();
        for (a, d) in self.dated() {
            if let Some(c) = &a.category {
                *counts.entry((Month::of(d), c.as_str())).or_default() += 1;
            }
        }
        let mut rows = Vec::new();
        for m in self.months() {
            let mut cats: Vec<&str> = self.categories.iter().map(String::as_str).collect();
            cats.sort_unstable();
            cats.dedup();
            for c in cats {
                rows.push(MonthlyCategoryRow {
                    month: m.to_string(),
                    category: c.to_string(),
                    count: counts.get(&(m, c)).copied().unwrap_or(0),
                });
            }
        }
        rows
    }

    pub fn monthly_by_gender(&self) -> Vec<GenderPivotRow> {
        let mut split: BTreeMap<Month, GenderSplit> = BTreeMap::new();
        for (a, d) in self.dated() {
            split.entry(Month::of(d)).or_default().add(self.scheme, a.gender);
        }
        split
            .into_iter()
            .map(|(m, split)| GenderPivotRow { keys: vec![m.to_string()], split })
            .collect()
    }

    /// Month x category gender pivot; every category appears for every month.
    pub fn monthly_by_category_gender(&self) -> Vec<GenderPivotRow> {
        let mut split: BTreeMap<(Month, &str), GenderSplit> = BTreeMap::new();
        for (a, d) in self.dated() {
            let cat = a.category.as_deref().unwrap_or("");
            split.entry((Month::of(d), cat)).or_default().add(self.scheme, a.gender);
        }
        let mut cats: Vec<&str> = self.categories.iter().map(String::as_str).collect();
        cats.extend(split.keys().map(|(_, c)| *c));
        cats.sort_unstable();
        cats.dedup();
        let mut rows = Vec::new();
        for m in self.months() {
            for &c in &cats {
                rows.push(GenderPivotRow {
                    keys: vec![m.to_string(), c.to_string()],
                    split: split.remove(&(m, c)).unwrap_or_default(),
                });
            }
        }
        rows
    }

    /// Dated achievements in `month` (all months when `None`), by date then row.
    pub fn in_month(&self, month: Option<Month>) -> Vec<&Achievement> {
        let mut out: Vec<(&Achievement, NaiveDate)> = self
            .dated()
            .filter(|(_, d)| month.map_or(true, |m| Month::of(*d) == m))
            .collect();
        out.sort_by_key(|(a, d)| (*d, a.row_index));
        out.into_iter().map(|(a, _)| a).collect()
    }

    /// Achievers joined back to their originating row.
    ///
    /// `fields` pairs an output header with a column of `table`.
    pub fn listing(
        &self,
        name: &str,
        table: &Table,
        fields: &[(&str, &str)],
        month: Option<Month>,
    ) -> Result<Sheet> {
        let idx: Vec<usize> = fields
            .iter()
            .map(|(_, col)| table.column_index(col))
            .collect::<Result<_>>()?;
        let mut headers: Vec<&str> = fields.iter().map(|(h, _)| *h).collect();
        headers.extend(["Row", "First date", "Program", "Gender", "Total sessions"]);
        let mut sheet = Sheet::new(name, &headers);
        for a in self.in_month(month) {
            let mut row: Vec<String> = idx.iter().map(|&c| table.cell(a.row, c).to_string()).collect();
            row.push(a.row_index.to_string());
            row.push(a.date.map(|d| d.to_string()).unwrap_or_default());
            row.push(a.category.clone().unwrap_or_default());
            row.push(a.gender.to_string());
            row.push(a.total_sessions.map(format_count).unwrap_or_default());
            sheet.push(row);
        }
        Ok(sheet)
    }

    pub fn summary_rows(&self, population: &str) -> Vec<MetricRow> {
        vec![
            MetricRow::new(&format!("{} considered", population), self.considered),
            MetricRow::new("Condition met", self.triggered),
            MetricRow::new("Dated first achievements", self.achieved()),
            MetricRow::new("Condition met but date missing", self.missing_dates),
            MetricRow::new("Condition not met", self.considered - self.triggered),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn programs() -> Vec<DatedProgram> {
        vec![DatedProgram::new("A", "a_done", "a_date"), DatedProgram::new("B", "b_done", "b_date")]
    }

    fn structured_table() -> Table {
        Table::from_rows(
            &["id", "a_done", "a_date", "b_done", "b_date", "gender"],
            vec![
                // earliest is B on row 0
                vec!["1".into(), "yes".into(), "03/10/2025".into(), "yes".into(), "02/01/2025".into(), "girl".into()],
                // false flag nulls its own date
                vec!["2".into(), "no".into(), "01/01/2025".into(), "yes".into(), "03/05/2025".into(), "boy".into()],
                // flag set, date unparseable
                vec!["3".into(), "yes".into(), "someday".into(), "no".into(), Cell::Empty, "".into()],
                vec!["4".into(), "no".into(), Cell::Empty, "no".into(), Cell::Empty, "boy".into()],
                // same entity as row 1 with an earlier A date
                vec!["2".into(), "yes".into(), "02/20/2025".into(), "no".into(), Cell::Empty, "boy".into()],
            ],
        )
    }

    #[test]
    fn earliest_flagged_date_wins() {
        let t = structured_table();
        let tl = first_completion(&t, &Identity::Column("id".into()), &programs(), "gender", GenderScheme::Child)
            .unwrap();
        assert_eq!(tl.considered, 4);
        assert_eq!(tl.triggered, 3);
        assert_eq!(tl.missing_dates, 1);
        assert_eq!(tl.achievements.len(), 2);

        let first = &tl.achievements[0];
        assert_eq!(first.key, "1");
        assert_eq!(first.date, Some(d(2025, 2, 1)));
        assert_eq!(first.category.as_deref(), Some("B"));
        assert_eq!(first.gender, "girl");

        let second = &tl.achievements[1];
        assert_eq!(second.date, Some(d(2025, 2, 20)));
        assert_eq!(second.category.as_deref(), Some("A"));
        assert_eq!(second.row_index, 4);
    }

    #[test]
    fn ties_go_to_first_program() {
        let t = Table::from_rows(
            &["a_done", "a_date", "b_done", "b_date", "gender"],
            vec![vec!["yes".into(), "2025-01-05".into(), "yes".into(), "01/05/2025".into(), "boy".into()]],
        );
        let tl = first_completion(&t, &Identity::Row, &programs(), "gender", GenderScheme::Child).unwrap();
        assert_eq!(tl.achievements[0].category.as_deref(), Some("A"));
    }

    #[test]
    fn monthly_rollups_are_zero_filled() {
        let t = structured_table();
        let tl = first_completion(&t, &Identity::Column("id".into()), &programs(), "gender", GenderScheme::Child)
            .unwrap();
        let totals = tl.monthly_total();
        assert_eq!(totals, vec![MonthlyCountRow { month: "2025-02".into(), count: 2 }]);

        let by_cat = tl.monthly_by_category();
        assert_eq!(by_cat.len(), 2);
        assert!(by_cat.iter().all(|r| r.count == 1));

        let by_gender = tl.monthly_by_gender();
        assert_eq!(by_gender[0].split.counts, [1, 1, 0]);
        assert_eq!(by_gender[0].total(), 2);

        let by_cat_gender = tl.monthly_by_category_gender();
        assert_eq!(by_cat_gender.len(), 2);
        assert_eq!(by_cat_gender[0].keys, vec!["2025-02".to_string(), "A".to_string()]);
    }

    #[test]
    fn gender_pivot_lists_programs_without_achievers() {
        let t = Table::from_rows(
            &["a_done", "a_date", "b_done", "b_date", "gender"],
            vec![vec!["yes".into(), "02/01/2025".into(), "no".into(), Cell::Empty, "girl".into()]],
        );
        let tl = first_completion(&t, &Identity::Row, &programs(), "gender", GenderScheme::Child).unwrap();
        let rows = tl.monthly_by_category_gender();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].keys, vec!["2025-02".to_string(), "A".to_string()]);
        assert_eq!(rows[0].total(), 1);
        assert_eq!(rows[1].keys, vec!["2025-02".to_string(), "B".to_string()]);
        assert_eq!(rows[1].total(), 0);
    }

    #[test]
    fn fractional_sessions_cross_on_the_last_row() {
        // 0.7 + 0.7 + 0.6 reaches 2.0 in row order, but date order sums to
        // 1.9999999999999998.
        let t = Table::from_rows(
            &["id", "s1", "date", "gender"],
            vec![
                vec!["x".into(), "0.7".into(), "01/01/2025".into(), "boy".into()],
                vec!["x".into(), "0.7".into(), "03/01/2025".into(), "boy".into()],
                vec!["x".into(), "0.6".into(), "02/01/2025".into(), "boy".into()],
            ],
        );
        let tl = first_cumulative(
            &t,
            &Identity::Column("id".into()),
            &["s1".to_string()],
            "date",
            "gender",
            GenderScheme::Child,
        )
        .unwrap();
        assert_eq!(tl.triggered, 1);
        assert_eq!(tl.missing_dates, 0);
        assert_eq!(tl.achievements[0].date, Some(d(2025, 3, 1)));
        assert_eq!(tl.achievements[0].row_index, 1);
    }

    fn session_table() -> Table {
        Table::from_rows(
            &["id", "s1", "s2", "date", "gender"],
            vec![
                vec!["x".into(), "1".into(), Cell::Empty, "03/01/2025".into(), "girl".into()],
                vec!["x".into(), "1".into(), Cell::Empty, "01/15/2025".into(), "girl".into()],
                vec!["x".into(), Cell::Empty, "1".into(), "02/01/2025".into(), "girl".into()],
                vec!["y".into(), "2".into(), Cell::Empty, Cell::Empty, "boy".into()],
                vec!["z".into(), "1".into(), Cell::Empty, "01/01/2025".into(), "boy".into()],
                vec!["w".into(), "1".into(), Cell::Empty, Cell::Empty, "male".into()],
                vec!["w".into(), "1".into(), Cell::Empty, "04/10/2025".into(), "boy".into()],
            ],
        )
    }

    fn session_cols() -> Vec<String> {
        vec!["s1".into(), "s2".into()]
    }

    #[test]
    fn running_total_crosses_in_date_order() {
        let t = session_table();
        let tl = first_cumulative(
            &t,
            &Identity::Column("id".into()),
            &session_cols(),
            "date",
            "gender",
            GenderScheme::Child,
        )
        .unwrap();
        assert_eq!(tl.considered, 4);
        assert_eq!(tl.triggered, 3);

        let x = tl.achievements.iter().find(|a| a.key == "x").unwrap();
        assert_eq!(x.date, Some(d(2025, 2, 1)));
        assert_eq!(x.row_index, 2);
        assert_eq!(x.total_sessions, Some(3.0));

        let y = tl.achievements.iter().find(|a| a.key == "y").unwrap();
        assert_eq!(y.date, None);

        // The undated row sorts after the dated one.
        let w = tl.achievements.iter().find(|a| a.key == "w").unwrap();
        assert_eq!(w.row_index, 5);
        assert_eq!(w.date, None);

        assert!(tl.achievements.iter().all(|a| a.key != "z"));
        assert_eq!(tl.achieved(), 1);
        assert_eq!(tl.missing_dates, 2);
        assert_eq!(tl.monthly_total().len(), 1);
    }

    #[test]
    fn per_row_threshold_without_identifier() {
        let t = session_table();
        let tl = first_cumulative(&t, &Identity::Row, &session_cols(), "date", "gender", GenderScheme::Child)
            .unwrap();
        assert_eq!(tl.considered, 7);
        assert_eq!(tl.triggered, 1);
        assert_eq!(tl.achievements[0].row_index, 3);
        assert_eq!(tl.missing_dates, 1);
        assert!(tl.monthly_by_gender().is_empty());
    }

    #[test]
    fn listing_filters_by_month() {
        let t = structured_table();
        let tl = first_completion(&t, &Identity::Column("id".into()), &programs(), "gender", GenderScheme::Child)
            .unwrap();
        let feb: Month = "2025-02".parse().unwrap();
        let sheet = tl.listing("List", &t, &[("Child ID", "id")], Some(feb)).unwrap();
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.rows[0][0], "1");
        assert_eq!(sheet.rows[0][2], "2025-02-01");
        let march: Month = "2025-03".parse().unwrap();
        assert!(tl.listing("List", &t, &[("Child ID", "id")], Some(march)).unwrap().is_empty());
        assert!(tl.listing("List", &t, &[("x", "missing")], None).is_err());
    }

    #[test]
    fn empty_table_builds_empty_timeline() {
        let t = Table::new(&["a_done", "a_date", "b_done", "b_date", "gender"]);
        let tl = first_completion(&t, &Identity::Row, &programs(), "gender", GenderScheme::Adult).unwrap();
        assert_eq!(tl.considered, 0);
        assert!(tl.monthly_total().is_empty());
        assert!(tl.monthly_by_category().is_empty());
        assert_eq!(tl.summary_rows("Adults")[4].value, "0");
    }
}
