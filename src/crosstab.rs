// Frequency tables and gender cross-tabs over categorical fields.
use crate::entity::{EntitySet, FieldValues, Identity};
use crate::error::Result;
use crate::types::{FrequencyRow, GenderPivotRow, GenderScheme, GenderSplit, PathCount, Sheet, Table};
use crate::util::{to_category, to_gender_text};
use std::collections::HashMap;
use tracing::debug;

/// Geography hierarchy, top to bottom.
pub const GEO_LEVELS: [&str; 4] = ["Oblast", "Raion", "Hromada", "Settlement"];

/// Counts values, sorted by descending count then ascending value.
pub fn frequency<S: AsRef<str>>(values: &[S]) -> Vec<FrequencyRow> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.as_ref()).or_default() += 1;
    }
    let mut rows: Vec<FrequencyRow> = counts
        .into_iter()
        .map(|(value, count)| FrequencyRow { value: value.to_string(), count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    rows
}

/// Counts joint value paths, sorted by descending count then path.
pub fn path_counts(paths: impl IntoIterator<Item = Vec<String>>) -> Vec<PathCount> {
    let mut counts: HashMap<Vec<String>, usize> = HashMap::new();
    for p in paths {
        *counts.entry(p).or_default() += 1;
    }
    let mut rows: Vec<PathCount> = counts.into_iter().map(|(path, count)| PathCount { path, count }).collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.path.cmp(&b.path)));
    rows
}

/// Normalizes a categorical column and resolves it to one value per entity.
fn resolved_categories(
    table: &Table,
    set: &EntitySet,
    column: &str,
    normalize: fn(&crate::types::Cell) -> String,
) -> Result<Vec<String>> {
    let values: Vec<String> = table.column(column)?.into_iter().map(normalize).collect();
    Ok(FieldValues::Categories(values).resolve(set).into_categories())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeographyReport {
    /// One `[oblast, raion, hromada, settlement]` per entity.
    pub locations: Vec<[String; 4]>,
    pub by_level: [Vec<FrequencyRow>; 4],
    pub by_top_sub: Vec<PathCount>,
    pub by_full_path: Vec<PathCount>,
}

/// Geography breakdown. With an identifier, each level independently takes
/// the entity's first non-placeholder value, so one entity's oblast and
/// settlement may come from different rows.
pub fn geography(table: &Table, identity: &Identity, columns: &[String; 4]) -> Result<GeographyReport> {
    let set = EntitySet::resolve(table, identity)?;
    let mut levels: Vec<Vec<String>> = Vec::with_capacity(4);
    for col in columns {
        levels.push(resolved_categories(table, &set, col, to_category)?);
    }
    let locations: Vec<[String; 4]> = (0..set.len())
        .map(|i| {
            [
                levels[0][i].clone(),
                levels[1][i].clone(),
                levels[2][i].clone(),
                levels[3][i].clone(),
            ]
        })
        .collect();

    let by_level = [
        frequency(&levels[0]),
        frequency(&levels[1]),
        frequency(&levels[2]),
        frequency(&levels[3]),
    ];
    let by_top_sub = path_counts(locations.iter().map(|l| l[..2].to_vec()));
    let by_full_path = path_counts(locations.iter().map(|l| l.to_vec()));
    debug!(entities = locations.len(), oblasts = by_level[0].len(), "geography computed");
    Ok(GeographyReport { locations, by_level, by_top_sub, by_full_path })
}

impl GeographyReport {
    pub fn n_total(&self) -> usize {
        self.locations.len()
    }

    /// Distinct values at `level` (0 = oblast .. 3 = settlement).
    pub fn distinct(&self, level: usize) -> usize {
        self.by_level[level].len()
    }

    pub fn top_sub_in(&self, top: &str) -> Vec<PathCount> {
        self.by_top_sub.iter().filter(|p| p.path[0] == top).cloned().collect()
    }

    pub fn full_path_in(&self, top: &str) -> Vec<PathCount> {
        self.by_full_path.iter().filter(|p| p.path[0] == top).cloned().collect()
    }

    pub fn level_sheet(&self, name: &str, level: usize, count_header: &str) -> Sheet {
        frequency_sheet(name, GEO_LEVELS[level], count_header, &self.by_level[level])
    }

    pub fn path_sheet(name: &str, depth: usize, count_header: &str, rows: &[PathCount]) -> Sheet {
        let mut headers: Vec<&str> = GEO_LEVELS[..depth].to_vec();
        headers.push(count_header);
        let mut sheet = Sheet::new(name, &headers);
        for r in rows {
            let mut out = r.path.clone();
            out.push(r.count.to_string());
            sheet.push(out);
        }
        sheet
    }
}

pub fn frequency_sheet(name: &str, value_header: &str, count_header: &str, rows: &[FrequencyRow]) -> Sheet {
    let mut sheet = Sheet::new(name, &[value_header, count_header]);
    for r in rows {
        sheet.push(vec![r.value.clone(), r.count.to_string()]);
    }
    sheet
}

/// A single categorical status (disability, displacement) crossed with gender.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub scheme: GenderScheme,
    pub n_total: usize,
    pub totals: Vec<FrequencyRow>,
    /// Sorted by descending Total then status.
    pub by_gender: Vec<GenderPivotRow>,
}

pub fn status_by_gender(
    table: &Table,
    identity: &Identity,
    status_col: &str,
    gender_col: &str,
    scheme: GenderScheme,
) -> Result<StatusReport> {
    let set = EntitySet::resolve(table, identity)?;
    let status = resolved_categories(table, &set, status_col, to_category)?;
    let gender = resolved_categories(table, &set, gender_col, to_gender_text)?;

    let mut split: HashMap<&str, GenderSplit> = HashMap::new();
    for (s, g) in status.iter().zip(&gender) {
        split.entry(s.as_str()).or_default().add(scheme, scheme.classify(g));
    }
    let mut by_gender: Vec<GenderPivotRow> = split
        .into_iter()
        .map(|(s, split)| GenderPivotRow { keys: vec![s.to_string()], split })
        .collect();
    by_gender.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.keys.cmp(&b.keys)));

    let totals = frequency(&status);
    debug_assert_eq!(by_gender.iter().map(GenderPivotRow::total).sum::<usize>(), status.len());
    Ok(StatusReport { scheme, n_total: status.len(), totals, by_gender })
}

impl StatusReport {
    /// Gender split of one status, matched case-insensitively; zeros when absent.
    pub fn split_for(&self, status: &str) -> GenderSplit {
        self.by_gender
            .iter()
            .find(|r| r.keys[0].trim().to_lowercase() == status.trim().to_lowercase())
            .map(|r| r.split)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn geo_cols() -> [String; 4] {
        ["o".into(), "r".into(), "h".into(), "s".into()]
    }

    fn geo_table() -> Table {
        Table::from_rows(
            &["id", "o", "r", "h", "s"],
            vec![
                vec!["1".into(), "Kyiv".into(), "Shevchenkivskyi".into(), "A".into(), "".into()],
                vec!["1".into(), "".into(), Cell::Empty, "A".into(), "X".into()],
                vec!["2".into(), "Lviv".into(), "Stryiskyi".into(), "B".into(), "Y".into()],
                vec!["3".into(), Cell::Empty, "".into(), "".into(), Cell::Empty],
            ],
        )
    }

    #[test]
    fn geography_picks_each_level_independently() {
        let g = geography(&geo_table(), &Identity::Column("id".into()), &geo_cols()).unwrap();
        assert_eq!(g.n_total(), 3);
        assert_eq!(g.locations[0], ["Kyiv".to_string(), "Shevchenkivskyi".into(), "A".into(), "X".into()]);
        let oblasts: Vec<(&str, usize)> = g.by_level[0].iter().map(|r| (r.value.as_str(), r.count)).collect();
        assert_eq!(oblasts, vec![("Kyiv", 1), ("Lviv", 1), ("Unknown", 1)]);
        assert_eq!(g.distinct(3), 3);
    }

    #[test]
    fn geography_paths_filter_by_top_level() {
        let g = geography(&geo_table(), &Identity::Row, &geo_cols()).unwrap();
        assert_eq!(g.n_total(), 4);
        assert_eq!(g.by_level[0][0].value, "Unknown");
        assert_eq!(g.by_level[0][0].count, 2);
        assert_eq!(g.top_sub_in("Kyiv").len(), 1);
        assert_eq!(g.full_path_in("Lviv")[0].path, vec!["Lviv", "Stryiskyi", "B", "Y"]);
        let sheet = GeographyReport::path_sheet("Geo", 2, "Children", &g.by_top_sub);
        assert_eq!(sheet.headers, vec!["Oblast", "Raion", "Children"]);
    }

    #[test]
    fn frequency_ties_break_by_name() {
        let rows = frequency(&["b", "a", "c", "c"]);
        let values: Vec<&str> = rows.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(values, vec!["c", "a", "b"]);
    }

    #[test]
    fn disability_totals_and_gender_split() {
        let t = Table::from_rows(
            &["id", "disability", "gender"],
            vec![
                vec!["1".into(), "yes".into(), "boy".into()],
                vec!["2".into(), "no".into(), "girl".into()],
                vec!["3".into(), "".into(), "boy".into()],
                vec!["4".into(), Cell::Empty, "".into()],
            ],
        );
        let r = status_by_gender(&t, &Identity::Column("id".into()), "disability", "gender", GenderScheme::Child)
            .unwrap();
        assert_eq!(r.n_total, 4);
        let totals: HashMap<&str, usize> = r.totals.iter().map(|f| (f.value.as_str(), f.count)).collect();
        assert_eq!(totals["yes"], 1);
        assert_eq!(totals["no"], 1);
        assert_eq!(totals["Unknown"], 2);

        assert_eq!(r.by_gender[0].keys[0], "Unknown");
        assert_eq!(r.by_gender[0].split.counts, [1, 0, 1]);
        assert_eq!(r.split_for("YES").get(GenderScheme::Child, "boy"), 1);
        assert_eq!(r.split_for("no").get(GenderScheme::Child, "girl"), 1);
        assert_eq!(r.split_for("maybe").total(), 0);
        for row in &r.by_gender {
            assert_eq!(row.total(), row.split.counts.iter().sum::<usize>());
        }
    }

    #[test]
    fn null_marker_counts_as_unknown() {
        let t = Table::from_rows(
            &["d", "g"],
            vec![
                vec!["yes".into(), "boy".into()],
                vec!["no".into(), "girl".into()],
                vec!["".into(), "boy".into()],
                vec!["None".into(), "".into()],
            ],
        );
        let r = status_by_gender(&t, &Identity::Row, "d", "g", GenderScheme::Child).unwrap();
        assert_eq!(r.totals[0], FrequencyRow { value: "Unknown".into(), count: 2 });
    }

    #[test]
    fn adult_scheme_uses_female_male() {
        let t = Table::from_rows(&["idp", "g"], vec![vec!["IDP".into(), "Female".into()]]);
        let r = status_by_gender(&t, &Identity::Row, "idp", "g", GenderScheme::Adult).unwrap();
        assert_eq!(r.by_gender[0].split.counts, [1, 0, 0]);
    }

    #[test]
    fn empty_input_gives_empty_tables() {
        let t = Table::new(&["o", "r", "h", "s"]);
        let g = geography(&t, &Identity::Row, &geo_cols()).unwrap();
        assert_eq!(g.n_total(), 0);
        assert!(g.by_full_path.is_empty());
    }
}
