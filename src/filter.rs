use std::collections::HashSet;
use tracing::{debug, trace};

use crate::table::{Column, Table, Values};

/// Columns the dashboard offers a selector for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterColumn {
    Year,
    Month,
    Day,
    Time,
    Building,
}

impl FilterColumn {
    pub const ALL: [FilterColumn; 5] = [
        FilterColumn::Year,
        FilterColumn::Month,
        FilterColumn::Day,
        FilterColumn::Time,
        FilterColumn::Building,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterColumn::Year => "Year",
            FilterColumn::Month => "Month",
            FilterColumn::Day => "Day",
            FilterColumn::Time => "Time",
            FilterColumn::Building => "Building",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Selected value per filter column. `None` means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    values: [Option<String>; 5],
}

impl Selection {
    pub fn new() -> Self {
        Selection::default()
    }

    pub fn with(mut self, column: FilterColumn, value: impl Into<String>) -> Self {
        self.set(column, Some(value.into()));
        self
    }

    /// An empty string is stored as "no constraint".
    pub fn set(&mut self, column: FilterColumn, value: Option<String>) {
        self.values[column.slot()] = value.filter(|v| !v.is_empty());
    }

    pub fn get(&self, column: FilterColumn) -> Option<&str> {
        self.values[column.slot()].as_deref()
    }

    pub fn clear(&mut self) {
        self.values = Default::default();
    }

    #[cfg(test)]
    pub fn is_unset(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// The set constraints, in selector order.
    pub fn constraints(&self) -> impl Iterator<Item = (FilterColumn, &str)> {
        FilterColumn::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|v| (c, v)))
    }
}

/// Rows of `table` matching every set constraint of `selection`, as a copy.
pub fn filter(table: &Table, selection: &Selection) -> Table {
    let rows = matching_rows(table, selection);
    debug!(
        "Filter {:?} kept {} of {} rows",
        selection,
        rows.len(),
        table.nrows()
    );
    table.take(&rows)
}

/// Indices of the rows matching every set constraint, in table order.
pub fn matching_rows(table: &Table, selection: &Selection) -> Vec<usize> {
    let mut mask: Vec<usize> = (0..table.nrows()).collect();
    for (column, value) in selection.constraints() {
        match table.column(column.name()) {
            Some(c) => mask = search_column(value, c, &mask),
            None => trace!("No column {}, ignoring its filter", column.name()),
        }
    }
    mask
}

// Rows in mask whose cell equals term. Missing cells never match.
fn search_column(term: &str, column: &Column, mask: &[usize]) -> Vec<usize> {
    mask.iter()
        .copied()
        .filter(|&ridx| column.get(ridx) == Some(term))
        .collect()
}

/// Sorted distinct values of a filter column. Empty if the table lacks it.
pub fn choices(table: &Table, column: FilterColumn) -> Vec<String> {
    let Some(col) = table.column(column.name()) else {
        return Vec::new();
    };

    // One representative row per distinct value
    let mut seen = HashSet::new();
    let mut distinct: Vec<usize> = Vec::new();
    for ridx in 0..col.len() {
        if let Some(v) = col.get(ridx)
            && seen.insert(v)
        {
            distinct.push(ridx);
        }
    }

    match &col.values {
        Values::Numeric(n) => distinct.sort_by(|&a, &b| {
            n[a].unwrap_or(f64::NAN)
                .total_cmp(&n[b].unwrap_or(f64::NAN))
        }),
        Values::Temporal(d) => distinct.sort_by_key(|&r| d[r]),
        Values::Text => distinct.sort_by(|&a, &b| col.display(a).cmp(col.display(b))),
    }

    distinct
        .into_iter()
        .map(|r| col.display(r).to_string())
        .collect()
}
