// Entity resolution: collapsing rows that share an identifier into one
// logical individual.
use crate::error::Result;
use crate::types::Table;
use crate::util::{is_placeholder, PLACEHOLDER};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How rows map to entities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// One row is one entity.
    #[default]
    Row,
    /// Rows sharing a non-blank value of this column are one entity.
    Column(String),
}

/// One logical individual and its rows (local indices, ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub key: String,
    pub rows: Vec<usize>,
}

impl Entity {
    pub fn first_row(&self) -> usize {
        self.rows[0]
    }
}

/// Entities of a table in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntitySet {
    pub entities: Vec<Entity>,
    /// Rows dropped because their identifier was blank.
    pub blank_identifiers: usize,
    pub grouped: bool,
}

impl EntitySet {
    pub fn resolve(table: &Table, identity: &Identity) -> Result<Self> {
        let col = match identity {
            Identity::Row => {
                let entities = (0..table.len())
                    .map(|i| Entity { key: table.origin(i).to_string(), rows: vec![i] })
                    .collect();
                return Ok(EntitySet { entities, blank_identifiers: 0, grouped: false });
            }
            Identity::Column(c) => c,
        };

        let ids = table.column(col)?;
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut entities: Vec<Entity> = Vec::new();
        let mut blank = 0usize;
        for (row, cell) in ids.iter().enumerate() {
            let Some(key) = cell.as_text() else {
                blank += 1;
                continue;
            };
            match index.get(&key) {
                Some(&e) => entities[e].rows.push(row),
                None => {
                    index.insert(key.clone(), entities.len());
                    entities.push(Entity { key, rows: vec![row] });
                }
            }
        }
        if blank > 0 {
            warn!(column = %col, rows = blank, "rows with blank identifier excluded from grouping");
        }
        debug!(rows = table.len(), entities = entities.len(), "resolved entities");
        Ok(EntitySet { entities, blank_identifiers: blank, grouped: true })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }
}

/// Per-field reduction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Logical OR across the group.
    Any,
    /// Sum across the group.
    Sum,
    /// First non-placeholder value in row order, else the placeholder.
    FirstKnown,
}

/// A normalized column, row-aligned before resolution and entity-aligned after.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Flags(Vec<bool>),
    Counts(Vec<f64>),
    Categories(Vec<String>),
}

impl FieldValues {
    /// Default policy for the value type.
    pub fn aggregation(&self) -> Aggregation {
        match self {
            FieldValues::Flags(_) => Aggregation::Any,
            FieldValues::Counts(_) => Aggregation::Sum,
            FieldValues::Categories(_) => Aggregation::FirstKnown,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValues::Flags(v) => v.len(),
            FieldValues::Counts(v) => v.len(),
            FieldValues::Categories(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collapses row values to one value per entity using this field's policy.
    pub fn resolve(&self, set: &EntitySet) -> FieldValues {
        self.resolve_as(set, self.aggregation())
    }

    /// Collapses row values under an explicit policy. Values are first
    /// converted to the type the policy reduces.
    pub fn resolve_as(&self, set: &EntitySet, policy: Aggregation) -> FieldValues {
        match policy {
            Aggregation::Any => {
                let v = self.clone().into_flags();
                FieldValues::Flags(grouped_reduce(set, &v, false, |acc, x| acc || *x))
            }
            Aggregation::Sum => {
                let v = self.clone().into_counts();
                FieldValues::Counts(grouped_reduce(set, &v, 0.0, |acc, x| acc + *x))
            }
            Aggregation::FirstKnown => FieldValues::Categories(first_known(set, &self.clone().into_categories())),
        }
    }

    pub fn into_flags(self) -> Vec<bool> {
        match self {
            FieldValues::Flags(v) => v,
            FieldValues::Counts(v) => v.into_iter().map(|n| n != 0.0).collect(),
            FieldValues::Categories(v) => v.into_iter().map(|s| !is_placeholder(&s)).collect(),
        }
    }

    pub fn into_counts(self) -> Vec<f64> {
        match self {
            FieldValues::Flags(v) => v.into_iter().map(|b| f64::from(u8::from(b))).collect(),
            FieldValues::Counts(v) => v,
            FieldValues::Categories(v) => v.iter().map(|_| 0.0).collect(),
        }
    }

    pub fn into_categories(self) -> Vec<String> {
        match self {
            FieldValues::Flags(v) => v.into_iter().map(|b| b.to_string()).collect(),
            FieldValues::Counts(v) => v.into_iter().map(|n| n.to_string()).collect(),
            FieldValues::Categories(v) => v,
        }
    }
}

/// Folds each entity's row values, in row order, into one value.
pub fn grouped_reduce<T, A, F>(set: &EntitySet, values: &[T], init: A, fold: F) -> Vec<A>
where
    A: Clone,
    F: Fn(A, &T) -> A,
{
    set.entities
        .iter()
        .map(|e| e.rows.iter().fold(init.clone(), |acc, &r| fold(acc, &values[r])))
        .collect()
}

fn first_known(set: &EntitySet, values: &[String]) -> Vec<String> {
    grouped_reduce(set, values, None::<String>, |acc, v| {
        acc.or_else(|| (!is_placeholder(v)).then(|| v.clone()))
    })
    .into_iter()
    .map(|v| v.unwrap_or_else(|| PLACEHOLDER.to_string()))
    .collect()
}
