// Session threshold indicator: total sessions across activity columns and
// whether an entity reached the fixed threshold.
use crate::entity::{EntitySet, FieldValues, Identity};
use crate::error::{ReportError, Result};
use crate::types::{MetricRow, Table};
use crate::util::{percent, to_count};
use tracing::debug;

/// Sessions an entity needs to count towards the indicator.
pub const SESSION_THRESHOLD: f64 = 2.0;

pub const MAX_SESSION_COLUMNS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct EntitySessions {
    pub key: String,
    pub rows: Vec<usize>,
    pub total: f64,
    pub meets: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionIndicator {
    pub entities: Vec<EntitySessions>,
    pub blank_identifiers: usize,
}

/// Per-row sum of the session columns.
pub fn row_totals(table: &Table, columns: &[String]) -> Result<Vec<f64>> {
    if columns.is_empty() || columns.len() > MAX_SESSION_COLUMNS {
        return Err(ReportError::SessionColumnCount { got: columns.len(), max: MAX_SESSION_COLUMNS });
    }
    let mut totals = vec![0.0; table.len()];
    for col in columns {
        for (t, cell) in totals.iter_mut().zip(table.column(col)?) {
            *t += to_count(cell);
        }
    }
    Ok(totals)
}

pub fn session_indicator(table: &Table, identity: &Identity, columns: &[String]) -> Result<SessionIndicator> {
    let totals = row_totals(table, columns)?;
    let set = EntitySet::resolve(table, identity)?;
    let per_entity = FieldValues::Counts(totals).resolve(&set).into_counts();

    let entities: Vec<EntitySessions> = set
        .entities
        .into_iter()
        .zip(per_entity)
        .map(|(e, total)| EntitySessions {
            key: e.key,
            rows: e.rows,
            total,
            meets: total >= SESSION_THRESHOLD,
        })
        .collect();
    let indicator = SessionIndicator { entities, blank_identifiers: set.blank_identifiers };
    debug!(
        entities = indicator.considered(),
        meeting = indicator.meeting(),
        "session indicator computed"
    );
    Ok(indicator)
}

impl SessionIndicator {
    pub fn considered(&self) -> usize {
        self.entities.len()
    }

    pub fn meeting(&self) -> usize {
        self.entities.iter().filter(|e| e.meets).count()
    }

    pub fn mask(&self) -> Vec<bool> {
        self.entities.iter().map(|e| e.meets).collect()
    }

    /// Local rows belonging to entities that meet the indicator, in table order.
    pub fn qualifying_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self
            .entities
            .iter()
            .filter(|e| e.meets)
            .flat_map(|e| e.rows.iter().copied())
            .collect();
        rows.sort_unstable();
        rows
    }

    /// Copy of `table` restricted to qualifying entities; the input for the
    /// geography, disability and displacement breakdowns.
    pub fn filter_table(&self, table: &Table) -> Table {
        table.select_rows(&self.qualifying_rows())
    }

    pub fn summary_rows(&self, population: &str) -> Vec<MetricRow> {
        let meeting = self.meeting();
        vec![
            MetricRow::new(&format!("{} considered", population), self.considered()),
            MetricRow::new(&format!("{} with >=2 sessions", population), meeting),
            MetricRow::new(&format!("{} with <2 sessions", population), self.considered() - meeting),
            MetricRow::new("Share meeting indicator (%)", percent(meeting, self.considered())),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn cols() -> Vec<String> {
        vec!["s1".to_string(), "s2".to_string()]
    }

    #[test]
    fn totals_sum_across_columns_and_rows() {
        let t = Table::from_rows(
            &["id", "s1", "s2"],
            vec![
                vec![Cell::from("a"), Cell::from("1"), Cell::Empty],
                vec![Cell::from("b"), Cell::from("x"), Cell::from(3.0)],
                vec![Cell::from("a"), Cell::Empty, Cell::from("1")],
                vec![Cell::from("c"), Cell::Empty, Cell::Empty],
            ],
        );
        let ind = session_indicator(&t, &Identity::Column("id".into()), &cols()).unwrap();
        let totals: Vec<f64> = ind.entities.iter().map(|e| e.total).collect();
        assert_eq!(totals, vec![2.0, 3.0, 0.0]);
        assert_eq!(ind.mask(), vec![true, true, false]);
        assert_eq!(ind.qualifying_rows(), vec![0, 1, 2]);
        let filtered = ind.filter_table(&t);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.origin(2), 2);
    }

    #[test]
    fn single_rows_without_identifier() {
        let t = Table::from_rows(
            &["s1", "s2"],
            vec![vec![Cell::from("1"), Cell::from("1")], vec![Cell::from("1"), Cell::Empty]],
        );
        let ind = session_indicator(&t, &Identity::Row, &cols()).unwrap();
        assert_eq!(ind.meeting(), 1);
        assert_eq!(ind.qualifying_rows(), vec![0]);
    }

    #[test]
    fn column_count_is_validated() {
        let t = Table::new(&["s1"]);
        let nine: Vec<String> = (0..9).map(|i| format!("c{i}")).collect();
        assert!(matches!(
            session_indicator(&t, &Identity::Row, &nine),
            Err(ReportError::SessionColumnCount { got: 9, max: 8 })
        ));
        assert!(session_indicator(&t, &Identity::Row, &[]).is_err());
    }

    #[test]
    fn empty_input_meets_nothing() {
        let t = Table::new(&["s1", "s2"]);
        let ind = session_indicator(&t, &Identity::Row, &cols()).unwrap();
        assert_eq!(ind.considered(), 0);
        assert_eq!(ind.summary_rows("Children")[3].value, "0.00");
    }
}
