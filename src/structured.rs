// Structured-program participation: which of up to four named completion
// flags each child has, their combinations and distribution.
use crate::entity::{EntitySet, FieldValues, Identity};
use crate::error::{ReportError, Result};
use crate::types::{CombinationRow, MetricRow, ProgramCountRow, Sheet, Table};
use crate::util::{to_flag, unique_columns};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const MAX_PROGRAMS: usize = 4;

/// Label of an entity with no completed program.
pub const NO_PROGRAM: &str = "NONE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    /// Completion flag column.
    pub column: String,
}

impl Program {
    pub fn new(name: &str, column: &str) -> Self {
        Program { name: name.to_string(), column: column.to_string() }
    }
}

/// Which entities the export view lists, by number of completed programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFilter {
    #[default]
    All,
    AtLeastOne,
    NoProgram,
    TwoOrMore,
    ExactlyOne,
}

impl ExportFilter {
    pub fn matches(self, completed: usize) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::AtLeastOne => completed >= 1,
            ExportFilter::NoProgram => completed == 0,
            ExportFilter::TwoOrMore => completed >= 2,
            ExportFilter::ExactlyOne => completed == 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityPrograms {
    pub key: String,
    /// Local index of the entity's first row.
    pub first_row: usize,
    pub flags: Vec<bool>,
    pub completed: usize,
    pub combination: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructuredReport {
    pub programs: Vec<String>,
    pub entities: Vec<EntityPrograms>,
    pub n_total: usize,
    pub n_any: usize,
    /// Entities with exactly 0, 1, 2, 3 and 4 completed programs.
    pub distribution: [usize; MAX_PROGRAMS + 1],
    pub per_program: Vec<ProgramCountRow>,
    pub only_one: Vec<ProgramCountRow>,
    pub combinations: Vec<CombinationRow>,
}

pub fn structured_participation(
    table: &Table,
    identity: &Identity,
    programs: &[Program],
) -> Result<StructuredReport> {
    if programs.is_empty() || programs.len() > MAX_PROGRAMS {
        return Err(ReportError::ProgramCount { got: programs.len() });
    }
    let mut seen = HashMap::new();
    for p in programs {
        if let Some(other) = seen.insert(p.column.as_str(), p.name.as_str()) {
            warn!(column = %p.column, first = other, second = %p.name, "column used by two programs; it will be counted twice");
        }
    }

    let set = EntitySet::resolve(table, identity)?;
    let mut columns: Vec<Vec<bool>> = Vec::with_capacity(programs.len());
    for p in programs {
        let flags: Vec<bool> = table.column(&p.column)?.into_iter().map(to_flag).collect();
        columns.push(FieldValues::Flags(flags).resolve(&set).into_flags());
    }

    let names: Vec<String> = programs.iter().map(|p| p.name.clone()).collect();
    let mut entities = Vec::with_capacity(set.len());
    let mut distribution = [0usize; MAX_PROGRAMS + 1];
    let mut per_program = vec![0usize; programs.len()];
    let mut only_one = vec![0usize; programs.len()];
    let mut combos: HashMap<String, usize> = HashMap::new();

    for (i, e) in set.iter().enumerate() {
        let flags: Vec<bool> = columns.iter().map(|c| c[i]).collect();
        let completed = flags.iter().filter(|f| **f).count();
        let picked: Vec<&str> = names
            .iter()
            .zip(&flags)
            .filter(|(_, f)| **f)
            .map(|(n, _)| n.as_str())
            .collect();
        let combination = if picked.is_empty() { NO_PROGRAM.to_string() } else { picked.join("+") };

        distribution[completed] += 1;
        for (p, f) in flags.iter().enumerate() {
            if *f {
                per_program[p] += 1;
                if completed == 1 {
                    only_one[p] += 1;
                }
            }
        }
        *combos.entry(combination.clone()).or_default() += 1;
        entities.push(EntityPrograms {
            key: e.key.clone(),
            first_row: e.first_row(),
            flags,
            completed,
            combination,
        });
    }

    let mut combinations: Vec<CombinationRow> = combos
        .into_iter()
        .map(|(combination, count)| CombinationRow { combination, count })
        .collect();
    combinations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.combination.cmp(&b.combination)));

    let to_rows = |counts: Vec<usize>| -> Vec<ProgramCountRow> {
        names
            .iter()
            .zip(counts)
            .map(|(program, children)| ProgramCountRow { program: program.clone(), children })
            .collect()
    };

    let n_total = entities.len();
    let n_any = n_total - distribution[0];
    debug!(entities = n_total, any = n_any, "structured participation computed");
    Ok(StructuredReport {
        programs: names.clone(),
        entities,
        n_total,
        n_any,
        distribution,
        per_program: to_rows(per_program),
        only_one: to_rows(only_one),
        combinations,
    })
}

impl StructuredReport {
    pub fn summary_rows(&self) -> Vec<MetricRow> {
        let mut rows = vec![
            MetricRow::new("Total children", self.n_total),
            MetricRow::new("At least 1 structured program", self.n_any),
            MetricRow::new("0 structured programs", self.distribution[0]),
            MetricRow::new("1 structured program", self.distribution[1]),
        ];
        for k in 2..=MAX_PROGRAMS {
            rows.push(MetricRow::new(&format!("{} structured programs", k), self.distribution[k]));
        }
        rows
    }

    /// Entities passing `filter`, joined back to their first row's fields.
    pub fn export_view(&self, table: &Table, filter: ExportFilter) -> Sheet {
        let mut headers: Vec<String> = table.columns().to_vec();
        headers.extend(self.programs.iter().cloned());
        headers.push("__Structured_Programs_Count".to_string());
        headers.push("__Structured_Combination".to_string());
        let mut sheet = Sheet::new("Export_Rows", &unique_columns(&headers));

        for e in self.entities.iter().filter(|e| filter.matches(e.completed)) {
            let mut row: Vec<String> = table.row(e.first_row).iter().map(|c| c.to_string()).collect();
            row.extend(e.flags.iter().map(|f| f.to_string()));
            row.push(e.completed.to_string());
            row.push(e.combination.clone());
            sheet.push(row);
        }
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn programs() -> Vec<Program> {
        vec![Program::new("A", "prog_A"), Program::new("B", "prog_B")]
    }

    fn table() -> Table {
        Table::from_rows(
            &["id", "prog_A", "prog_B"],
            vec![
                vec![Cell::from(1i64), Cell::from("yes"), Cell::from("no")],
                vec![Cell::from(2i64), Cell::from("no"), Cell::from("no")],
                vec![Cell::from(3i64), Cell::from("yes"), Cell::from("yes")],
            ],
        )
    }

    #[test]
    fn counts_three_children() {
        let r = structured_participation(&table(), &Identity::Column("id".into()), &programs()).unwrap();
        assert_eq!(r.n_total, 3);
        assert_eq!(r.n_any, 2);
        assert_eq!(r.distribution, [1, 1, 1, 0, 0]);
        assert_eq!(r.per_program[0].children, 2);
        assert_eq!(r.per_program[1].children, 1);
        assert_eq!(r.only_one[0].children, 1);
        assert_eq!(r.only_one[1].children, 0);
    }

    #[test]
    fn combinations_sorted_by_count_then_label() {
        let r = structured_participation(&table(), &Identity::Row, &programs()).unwrap();
        let labels: Vec<&str> = r.combinations.iter().map(|c| c.combination.as_str()).collect();
        assert_eq!(labels, vec!["A", "A+B", "NONE"]);
    }

    #[test]
    fn repeated_rows_or_together() {
        let t = Table::from_rows(
            &["id", "prog_A", "prog_B"],
            vec![
                vec![Cell::from("x"), Cell::from("yes"), Cell::Empty],
                vec![Cell::from("x"), Cell::Empty, Cell::from("done")],
            ],
        );
        let r = structured_participation(&t, &Identity::Column("id".into()), &programs()).unwrap();
        assert_eq!(r.n_total, 1);
        assert_eq!(r.distribution[2], 1);
        assert_eq!(r.entities[0].combination, "A+B");
    }

    #[test]
    fn export_filter_selects_entities() {
        let t = table();
        let r = structured_participation(&t, &Identity::Row, &programs()).unwrap();
        assert_eq!(r.export_view(&t, ExportFilter::All).len(), 3);
        assert_eq!(r.export_view(&t, ExportFilter::AtLeastOne).len(), 2);
        assert_eq!(r.export_view(&t, ExportFilter::NoProgram).len(), 1);
        assert_eq!(r.export_view(&t, ExportFilter::TwoOrMore).len(), 1);
        let one = r.export_view(&t, ExportFilter::ExactlyOne);
        assert_eq!(one.len(), 1);
        assert_eq!(one.headers.last().map(String::as_str), Some("__Structured_Combination"));
        assert_eq!(one.rows[0][0], "1");
    }

    #[test]
    fn empty_table_gives_empty_report() {
        let t = Table::new(&["prog_A", "prog_B"]);
        let r = structured_participation(&t, &Identity::Row, &programs()).unwrap();
        assert_eq!(r.n_total, 0);
        assert_eq!(r.distribution, [0; 5]);
        assert!(r.combinations.is_empty());
    }

    #[test]
    fn program_count_is_validated() {
        let t = table();
        assert!(matches!(
            structured_participation(&t, &Identity::Row, &[]),
            Err(ReportError::ProgramCount { got: 0 })
        ));
    }

    #[test]
    fn duplicate_columns_double_count() {
        let t = table();
        let progs = vec![Program::new("A", "prog_A"), Program::new("A2", "prog_A")];
        let r = structured_participation(&t, &Identity::Row, &progs).unwrap();
        assert_eq!(r.distribution, [1, 0, 2, 0, 0]);
    }
}
