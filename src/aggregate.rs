use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::domain::DashError;
use crate::table::{Column, Table, Values};

/// Which columns get averaged (and shown by a search).
///
/// `Range` is a half-open range of column positions and clamps to the
/// columns a table actually has. `Names` picks columns by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Range { start: usize, end: usize },
    Names(Vec<String>),
}

impl Default for ColumnSelector {
    fn default() -> Self {
        ColumnSelector::Range { start: 5, end: 20 }
    }
}

impl ColumnSelector {
    /// Positions of the selected columns in `table`.
    pub fn resolve(&self, table: &Table) -> Vec<usize> {
        match self {
            ColumnSelector::Range { start, end } => {
                let ncols = table.ncols();
                (std::cmp::min(*start, ncols)..std::cmp::min(*end, ncols)).collect()
            }
            ColumnSelector::Names(names) => names
                .iter()
                .filter_map(|name| {
                    let idx = table.columns().iter().position(|c| &c.name == name);
                    if idx.is_none() {
                        warn!("Unknown column \"{name}\" in column selection");
                    }
                    idx
                })
                .collect(),
        }
    }
}

impl FromStr for ColumnSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((start, end)) = s.split_once(':') {
            let start: usize = start
                .trim()
                .parse()
                .map_err(|e| format!("invalid range start \"{start}\": {e}"))?;
            let end: usize = end
                .trim()
                .parse()
                .map_err(|e| format!("invalid range end \"{end}\": {e}"))?;
            if start > end {
                return Err(format!("range start {start} is after end {end}"));
            }
            return Ok(ColumnSelector::Range { start, end });
        }

        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err("expected START:END or a comma separated list of columns".to_string());
        }
        Ok(ColumnSelector::Names(names))
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Range { start, end } => write!(f, "{start}:{end}"),
            ColumnSelector::Names(names) => write!(f, "{}", names.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMean {
    pub name: String,
    pub mean: f64,
}

/// Per-column means in column order. `NaN` marks a column without a mean.
#[derive(Debug, Clone, Default)]
pub struct AverageResult {
    rows: usize,
    means: Vec<ColumnMean>,
}

impl AverageResult {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn means(&self) -> &[ColumnMean] {
        &self.means
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.means.iter().find(|m| m.name == name).map(|m| m.mean)
    }

    pub fn len(&self) -> usize {
        self.means.len()
    }
}

/// Means of the selected columns over all rows of `table`.
///
/// Callers are expected to check for an empty table first; it is rejected
/// with `EmptySelection`.
pub fn average(table: &Table, columns: &ColumnSelector) -> Result<AverageResult, DashError> {
    if table.nrows() == 0 {
        return Err(DashError::EmptySelection);
    }

    let means = columns
        .resolve(table)
        .into_iter()
        .map(|idx| {
            let column = &table.columns()[idx];
            ColumnMean {
                name: column.name.clone(),
                mean: column_mean(column),
            }
        })
        .collect::<Vec<_>>();
    debug!("Averaged {} columns over {} rows", means.len(), table.nrows());

    Ok(AverageResult {
        rows: table.nrows(),
        means,
    })
}

// Missing values are skipped. Values are summed in sorted order so the result
// does not depend on row order.
fn column_mean(column: &Column) -> f64 {
    match &column.values {
        Values::Numeric(values) => {
            let mut present: Vec<f64> = values
                .iter()
                .flatten()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            if present.is_empty() {
                return f64::NAN;
            }
            present.sort_by(f64::total_cmp);
            present.iter().sum::<f64>() / present.len() as f64
        }
        Values::Text | Values::Temporal(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterColumn, Selection, filter};
    use crate::table::testing::table_from_rows;

    const HEADER: [&str; 16] = [
        "A", "B", "C", "D", "E", "Year", "Month", "Day", "Time", "Building", "M1", "M2", "M3",
        "M4", "M5", "M6",
    ];

    fn scenario() -> Table {
        table_from_rows(
            &HEADER,
            &[
                &[
                    "a", "b", "c", "d", "e", "2020", "1", "1", "08:00", "B1", "1", "2", "3", "4",
                    "5", "6",
                ],
                &[
                    "a", "b", "c", "d", "e", "2021", "1", "1", "08:00", "B1", "10", "20", "30",
                    "40", "50", "60",
                ],
                &[
                    "a", "b", "c", "d", "e", "2020", "2", "1", "09:00", "B2", "3", "4", "5", "6",
                    "7", "",
                ],
            ],
        )
    }

    #[test]
    fn range_clamps_to_existing_columns() {
        let table = scenario();
        let positions = ColumnSelector::default().resolve(&table);
        assert_eq!(positions, (5..16).collect::<Vec<_>>());
        let past_end = ColumnSelector::Range { start: 30, end: 40 };
        assert!(past_end.resolve(&table).is_empty());
    }

    #[test]
    fn filtered_scenario_averages_matching_rows() {
        let table = scenario();
        let filtered = filter(&table, &Selection::new().with(FilterColumn::Year, "2020"));
        assert_eq!(filtered.nrows(), 2);

        let result = average(&filtered, &ColumnSelector::default()).unwrap();
        assert_eq!(result.rows(), 2);
        assert_eq!(result.len(), 11);
        assert_eq!(result.means()[0].name, "Year");
        assert_eq!(result.get("Year"), Some(2020.0));
        assert_eq!(result.get("M1"), Some(2.0));
        assert_eq!(result.get("M5"), Some(6.0));
        // one of the two rows is missing M6
        assert_eq!(result.get("M6"), Some(6.0));
    }

    #[test]
    fn text_columns_average_to_nan() {
        let table = scenario();
        let result = average(&table, &ColumnSelector::default()).unwrap();
        let time = result.get("Time").unwrap();
        assert!(time.is_nan());
        assert!(result.get("Building").unwrap().is_nan());
    }

    #[test]
    fn single_row_average_is_the_row() {
        let table = scenario().take(&[1]);
        let result = average(&table, &ColumnSelector::default()).unwrap();
        for m in ["M1", "M2", "M3", "M4", "M5", "M6"] {
            let expected: f64 = table.column(m).unwrap().get(0).unwrap().parse().unwrap();
            assert_eq!(result.get(m), Some(expected));
        }
    }

    #[test]
    fn average_ignores_row_order() {
        let table = table_from_rows(
            &["M1", "M2"],
            &[&["0.1", "1e16"], &["0.2", "1"], &["0.3", "-1e16"], &["", "3"]],
        );
        let selector = ColumnSelector::Range { start: 0, end: 2 };
        let base = average(&table, &selector).unwrap();
        for order in [[3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
            let shuffled = average(&table.take(&order), &selector).unwrap();
            assert_eq!(shuffled.means(), base.means());
        }
    }

    #[test]
    fn all_missing_column_is_nan() {
        let table = table_from_rows(&["M1", "M2"], &[&["1", ""], &["2", ""]]);
        let result = average(&table, &ColumnSelector::Range { start: 0, end: 2 }).unwrap();
        assert_eq!(result.get("M1"), Some(1.5));
        assert!(result.get("M2").unwrap().is_nan());
    }

    #[test]
    fn empty_table_is_rejected() {
        let table = scenario().take(&[]);
        let err = average(&table, &ColumnSelector::default()).unwrap_err();
        assert!(matches!(err, DashError::EmptySelection));
    }

    #[test]
    fn named_selection_skips_unknown_columns() {
        let table = scenario();
        let selector: ColumnSelector = "M2, Nope,M1".parse().unwrap();
        let result = average(&table, &selector).unwrap();
        let names: Vec<&str> = result.means().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["M2", "M1"]);
    }

    #[test]
    fn averages_loaded_fixture() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("east_small.csv");
        let table = Table::load(&path).unwrap();
        let selection = Selection::new()
            .with(FilterColumn::Year, "2020")
            .with(FilterColumn::Building, "B1");
        let filtered = filter(&table, &selection);
        assert_eq!(filtered.nrows(), 2);

        let result = average(&filtered, &ColumnSelector::default()).unwrap();
        let names: Vec<&str> = result.means().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names.first(), Some(&"M1"));
        assert_eq!(names.last(), Some(&"M15"));
        assert!((result.get("M1").unwrap() - 9.815).abs() < 1e-9);
        assert!(result.get("Date").is_none());
    }

    #[test]
    fn parse_selector() {
        assert_eq!(
            "5:20".parse::<ColumnSelector>(),
            Ok(ColumnSelector::Range { start: 5, end: 20 })
        );
        assert!("20:5".parse::<ColumnSelector>().is_err());
        assert!("x:5".parse::<ColumnSelector>().is_err());
        assert!(" , ".parse::<ColumnSelector>().is_err());
        assert_eq!(ColumnSelector::default().to_string(), "5:20");
    }
}
