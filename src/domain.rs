use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;

use crate::aggregate::ColumnSelector;

pub const DEFAULT_DATA_PATH: &str = "East_Final.csv";

pub const HELP_TEXT: &str = "\
Filters
  ↑/k ↓/j     select filter
  ←/h →/l     change value
Actions
  Enter, s    search
  r           reset filters
  a           average
Views
  d           data summary
  PgUp PgDn   scroll results
  Home End    first/last row
  ?           this help
  Esc         close popup
  q           quit";

#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    PolarsError(PolarsError),
    LoadingFailed(String),
    FileNotFound(PathBuf),
    PermissionDenied(PathBuf),
    UnknownFileType(PathBuf),
    ParseError(String),
    EmptySelection,
    InvalidConfig(String),
}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<PolarsError> for DashError {
    fn from(err: PolarsError) -> Self {
        DashError::PolarsError(err)
    }
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "I/O error: {e}"),
            DashError::PolarsError(e) => write!(f, "Error loading data: {e}"),
            DashError::LoadingFailed(msg) => write!(f, "Error loading data: {msg}"),
            DashError::FileNotFound(path) => write!(
                f,
                "File not found: {}. Please add the CSV file next to the dashboard.",
                path.display()
            ),
            DashError::PermissionDenied(path) => {
                write!(f, "Permission denied: {}", path.display())
            }
            DashError::UnknownFileType(path) => {
                write!(f, "Unknown file type: {}", path.display())
            }
            DashError::ParseError(msg) => write!(f, "Error loading data: {msg}"),
            DashError::EmptySelection => write!(f, "No data found with the selected filters"),
            DashError::InvalidConfig(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DashConfig {
    pub data_path: PathBuf,
    pub columns: ColumnSelector,
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub preview_rows: usize,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            columns: ColumnSelector::default(),
            event_poll_time: 100,
            max_column_width: 20,
            preview_rows: 5,
        }
    }
}

/// The three buttons of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Search,
    Reset,
    Average,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Quit,
    FocusUp,
    FocusDown,
    SelectPrev,
    SelectNext,
    Action(Action),
    Summary,
    Help,
    Exit,
    ScrollUp,
    ScrollDown,
    ScrollBeginning,
    ScrollEnd,
    Resize(usize, usize),
}
