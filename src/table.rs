use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::*;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::domain::DashError;

/// Column that gets parsed into date/time values on load.
pub const DATE_COLUMN: &str = "Date";

/// Rendering of a missing cell.
pub const MISSING: &str = "∅";

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%d-%m-%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Cell contents read as missing values, on top of empty cells.
const NA_TOKENS: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug)]
enum FileType {
    CSV,
    TSV,
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

/// Typed view on a column next to its rendered cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Text,
    Numeric(Vec<Option<f64>>),
    Temporal(Vec<Option<NaiveDateTime>>),
}

impl Values {
    fn take(&self, rows: &[usize]) -> Values {
        match self {
            Values::Text => Values::Text,
            Values::Numeric(v) => Values::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Values::Temporal(v) => Values::Temporal(rows.iter().map(|&r| v[r]).collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub idx: usize,
    pub name: String,
    pub dtype: DataType,
    pub max_width: usize,
    pub data: Vec<Option<String>>,
    pub values: Values,
}

impl Column {
    pub fn new(
        idx: usize,
        name: impl Into<String>,
        dtype: DataType,
        data: Vec<Option<String>>,
        values: Values,
    ) -> Self {
        let max_width = data
            .iter()
            .map(|v| v.as_deref().unwrap_or(MISSING).chars().count())
            .max()
            .unwrap_or(0);
        Column {
            idx,
            name: name.into(),
            dtype,
            max_width,
            data,
            values,
        }
    }

    pub fn as_string(&self) -> String {
        format!(
            "{} \"{}\", {:?}, width_max: {}, # rows {}",
            self.idx,
            self.name,
            self.dtype,
            self.max_width,
            self.data.len(),
        )
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        self.data.get(row).and_then(|v| v.as_deref())
    }

    /// Cell text as shown to the user.
    pub fn display(&self, row: usize) -> &str {
        self.get(row).unwrap_or(MISSING)
    }

    #[cfg(test)]
    pub fn is_numeric(&self) -> bool {
        matches!(self.values, Values::Numeric(_))
    }

    fn take(&self, rows: &[usize]) -> Column {
        Column::new(
            self.idx,
            self.name.clone(),
            self.dtype.clone(),
            rows.iter().map(|&r| self.data[r].clone()).collect(),
            self.values.take(rows),
        )
    }
}

/// In-memory dataset. Column order and names are fixed once built.
#[derive(Debug, Clone, Default)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    nrows: usize,
}

impl Table {
    pub fn empty() -> Self {
        Table::default()
    }

    pub fn from_columns(name: impl Into<String>, columns: Vec<Column>) -> Result<Self, DashError> {
        let nrows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(c) = columns.iter().find(|c| c.len() != nrows) {
            return Err(DashError::LoadingFailed(format!(
                "Column \"{}\" has {} rows, expected {}",
                c.name,
                c.len(),
                nrows
            )));
        }
        Ok(Table {
            name: name.into(),
            columns,
            nrows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// True when there is nothing to show: no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.nrows == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Copy of the given rows, in the given order, with all columns kept.
    pub fn take(&self, rows: &[usize]) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            nrows: rows.len(),
        }
    }

    /// Copy of the first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let rows: Vec<usize> = (0..std::cmp::min(n, self.nrows)).collect();
        self.take(&rows)
    }

    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Table, DashError> {
        let file_info = Table::get_file_info(path.to_path_buf())?;
        debug!(
            "Loading {:?} file of {} bytes",
            file_info.file_type, file_info.file_size
        );

        let start_time = Instant::now();
        let frame = match file_info.file_type {
            FileType::CSV => Table::load_delimited(&file_info.path, b','),
            FileType::TSV => Table::load_delimited(&file_info.path, b'\t'),
        };
        let df = frame
            .and_then(|f| f.collect())
            .map_err(|e| DashError::ParseError(e.to_string()))?;

        // Each column is converted in its own task. Cells are kept as Strings
        // for display next to their typed values.
        let c_: Result<Vec<Column>, _> = df
            .get_column_names()
            .par_iter()
            .enumerate()
            .map(|(idx, name)| Table::load_column(&df, idx, name))
            .collect();
        let columns = c_?;

        let data_loading_duration = start_time.elapsed().as_millis();
        info!(
            "Loading {} rows x {} columns took {data_loading_duration}ms ...",
            df.height(),
            columns.len()
        );
        for c in columns.iter() {
            debug!("Column: {}", c.as_string());
        }

        let name = file_info
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        Table::from_columns(name, columns)
    }

    fn load_delimited(path: &Path, separator: u8) -> Result<LazyFrame, PolarsError> {
        LazyCsvReader::new(PlPath::Local(path.into()))
            .with_has_header(true)
            .with_separator(separator)
            .with_infer_schema_length(None)
            .with_null_values(Some(NullValues::AllColumns(
                NA_TOKENS.iter().map(|t| PlSmallStr::from(*t)).collect(),
            )))
            .finish()
    }

    fn load_column(df: &DataFrame, idx: usize, col_name: &str) -> Result<Column, DashError> {
        let source = df.column(col_name)?;
        let dtype = source.dtype().clone();

        let rendered = source.cast(&DataType::String)?;
        let mut data: Vec<Option<String>> = rendered
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.replace("\r\n", " ↵ ").replace('\n', " ↵ ")))
            .collect();

        let values = if col_name == DATE_COLUMN {
            let dates = Table::parse_date_column(&data)?;
            data = Table::render_dates(&dates);
            Values::Temporal(dates)
        } else if Table::is_numeric_type(&dtype) {
            let floats = source.cast(&DataType::Float64)?;
            Values::Numeric(floats.f64()?.into_iter().collect())
        } else {
            Values::Text
        };

        Ok(Column::new(idx, col_name, dtype, data, values))
    }

    fn is_numeric_type(dtype: &DataType) -> bool {
        matches!(
            dtype,
            DataType::Boolean
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
                | DataType::Float32
                | DataType::Float64
        )
    }

    fn parse_date_column(data: &[Option<String>]) -> Result<Vec<Option<NaiveDateTime>>, DashError> {
        data.iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => parse_datetime(s).map(Some).ok_or_else(|| {
                    DashError::ParseError(format!(
                        "Unable to parse \"{s}\" in column {DATE_COLUMN}, row {}",
                        row + 1
                    ))
                }),
            })
            .collect()
    }

    fn render_dates(dates: &[Option<NaiveDateTime>]) -> Vec<Option<String>> {
        let date_only = dates
            .iter()
            .flatten()
            .all(|d| d.time().num_seconds_from_midnight() == 0 && d.time().nanosecond() == 0);
        let fmt = if date_only {
            "%Y-%m-%d"
        } else {
            "%Y-%m-%d %H:%M:%S"
        };
        dates
            .iter()
            .map(|d| d.map(|d| d.format(fmt).to_string()))
            .collect()
    }

    fn detect_file_type(path: &Path) -> Result<FileType, DashError> {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_uppercase())
            .as_deref()
        {
            Some("CSV") | Some("TXT") => Ok(FileType::CSV),
            Some("TSV") | Some("TAB") => Ok(FileType::TSV),
            _ => Err(DashError::UnknownFileType(path.to_path_buf())),
        }
    }

    fn get_file_info(path: PathBuf) -> Result<FileInfo, DashError> {
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DashError::FileNotFound(path.clone()),
            ErrorKind::PermissionDenied => DashError::PermissionDenied(path.clone()),
            _ => DashError::IoError(e),
        })?;
        if !metadata.is_file() {
            return Err(DashError::LoadingFailed(format!(
                "{} is not a file!",
                path.display()
            )));
        }

        let file_size = metadata.len();
        let file_type = Table::detect_file_type(&path)?;

        Ok(FileInfo {
            path,
            file_size,
            file_type,
        })
    }
}

/// Parses a calendar date with an optional time of day.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for date_fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, date_fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
        for sep in [" ", "T"] {
            for time_fmt in TIME_FORMATS {
                let fmt = format!("{date_fmt}{sep}{time_fmt}");
                if let Ok(dt) = NaiveDateTime::parse_from_str(value, &fmt) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// Result of the one-time load. A failed load carries the empty table.
#[derive(Debug)]
pub struct LoadOutcome {
    pub table: Arc<Table>,
    pub error: Option<DashError>,
}

/// Process-wide memo of the loaded dataset.
///
/// The file is read on the first `load` only; every later call returns the
/// same outcome until `invalidate` is called.
#[derive(Debug)]
pub struct TableCache {
    path: PathBuf,
    slot: Mutex<Option<Arc<LoadOutcome>>>,
}

impl TableCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            slot: Mutex::new(None),
        }
    }

    pub fn load(&self) -> Arc<LoadOutcome> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = slot.as_ref() {
            debug!("Using cached table for {}", self.path.display());
            return Arc::clone(outcome);
        }

        let outcome = match Table::load(&self.path) {
            Ok(table) => LoadOutcome {
                table: Arc::new(table),
                error: None,
            },
            Err(e) => {
                error!("Loading {} failed: {e}", self.path.display());
                LoadOutcome {
                    table: Arc::new(Table::empty()),
                    error: Some(e),
                }
            }
        };
        let outcome = Arc::new(outcome);
        *slot = Some(Arc::clone(&outcome));
        outcome
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            debug!("Dropped cached table for {}", self.path.display());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Builds a table from literal cells. Empty cells are missing, columns
    /// whose cells all parse as numbers become numeric.
    pub(crate) fn table_from_rows(header: &[&str], rows: &[&[&str]]) -> Table {
        let columns = header
            .iter()
            .enumerate()
            .map(|(cidx, name)| {
                let data: Vec<Option<String>> = rows
                    .iter()
                    .map(|r| Some(r[cidx]).filter(|s| !s.is_empty()).map(String::from))
                    .collect();
                let numbers: Option<Vec<Option<f64>>> = data
                    .iter()
                    .map(|c| match c {
                        None => Some(None),
                        Some(s) => s.parse::<f64>().ok().map(Some),
                    })
                    .collect();
                match numbers {
                    Some(n) if data.iter().any(|c| c.is_some()) => {
                        Column::new(cidx, *name, DataType::Float64, data, Values::Numeric(n))
                    }
                    _ => Column::new(cidx, *name, DataType::String, data, Values::Text),
                }
            })
            .collect();
        Table::from_columns("test", columns).unwrap()
    }
}
