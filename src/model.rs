use std::sync::Arc;
use std::time::Instant;
use tracing::{info, trace, warn};

use crate::aggregate::{self, AverageResult};
use crate::domain::{Action, DashConfig, DashError, HELP_TEXT, Message};
use crate::filter::{self, FilterColumn, Selection};
use crate::table::{Column, Table};
use crate::ui::{
    BUTTONS_HEIGHT, COLUMN_WIDTH_MARGIN, RESULT_BORDER, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT,
    TITLE_HEIGHT,
};

pub const DASHBOARD_TITLE: &str = "CHW Data Average Analysis";
pub const NO_DATA_LOADED: &str = "No data loaded. Please check the file path or CSV content.";
pub const NO_SEARCH_RESULTS: &str = "No data found with the selected filters";
pub const NO_AVERAGE_DATA: &str = "No data found to calculate averages";
pub const AVERAGES_HEADING: &str = "Averages for Selected Filters";

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    FAILED,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    DASHBOARD,
    POPUP,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
}

impl ColumnView {
    fn empty() -> Self {
        ColumnView {
            name: "".to_string(),
            width: 0,
            data: Vec::new(),
        }
    }

    fn from_values(name: &str, data: Vec<String>, max_width: usize) -> Self {
        let widest = data.iter().map(|s| s.chars().count()).max().unwrap_or(0);
        let width = std::cmp::max(name.chars().count(), widest) + COLUMN_WIDTH_MARGIN;
        ColumnView {
            name: name.to_string(),
            width: std::cmp::min(width, max_width),
            data,
        }
    }
}

/// A selector widget: the empty "no constraint" choice followed by the
/// distinct values of its column.
#[derive(Debug, Clone)]
pub struct Selector {
    column: FilterColumn,
    choices: Vec<String>,
    position: usize, // 0 is the empty choice, i > 0 is choices[i - 1]
}

impl Selector {
    fn new(table: &Table, column: FilterColumn) -> Self {
        Selector {
            column,
            choices: filter::choices(table, column),
            position: 0,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self.position {
            0 => None,
            p => self.choices.get(p - 1).map(String::as_str),
        }
    }

    fn next(&mut self) {
        self.position = (self.position + 1) % (self.choices.len() + 1);
    }

    fn previous(&mut self) {
        if self.position == 0 {
            self.position = self.choices.len();
        } else {
            self.position -= 1;
        }
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// What the result area currently holds.
#[derive(Debug, Clone)]
pub enum Outcome {
    Idle,
    Rows { table: Table, index: Vec<usize> },
    Averages(AverageResult),
    Warning(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorView {
    pub label: &'static str,
    pub value: String,
    pub position: usize,
    pub choices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupView {
    Help(String),
    Summary {
        total_records: usize,
        columns: Vec<String>,
        head: Vec<ColumnView>,
    },
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let chrome = TITLE_HEIGHT + BUTTONS_HEIGHT + STATUSLINE_HEIGHT + RESULT_BORDER;
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_height: ui_height.saturating_sub(chrome + TABLE_HEADER_HEIGHT),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct UIData {
    pub name: String,
    pub selectors: Vec<SelectorView>,
    pub focus: usize,
    pub heading: String,
    pub table: Vec<ColumnView>,
    pub index: ColumnView,
    pub nrows: usize,
    pub offset_row: usize,
    pub warning: Option<String>,
    pub fatal: Option<Vec<String>>,
    pub popup: Option<PopupView>,
    pub layout: UILayout,
    pub status_message: String,
    pub last_status_message_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            selectors: Vec::new(),
            focus: 0,
            heading: String::new(),
            table: Vec::new(),
            index: ColumnView::empty(),
            nrows: 0,
            offset_row: 0,
            warning: None,
            fatal: None,
            popup: None,
            layout: UILayout::default(),
            status_message: String::new(),
            last_status_message_update: Instant::now(),
        }
    }
}

pub struct Model {
    config: DashConfig,
    pub status: Status,
    modus: Modus,
    table: Arc<Table>,
    load_error: Option<String>,
    selectors: Vec<Selector>,
    focus: usize,
    outcome: Outcome,
    offset_row: usize,
    popup: Option<PopupView>,
    uilayout: UILayout,
    uidata: UIData,
    status_message: String,
    last_status_message_update: Instant,
}

impl Model {
    /// Builds the dashboard on top of an already loaded table. A load error
    /// or an empty table puts the model in the FAILED state.
    pub fn init(
        config: &DashConfig,
        table: Arc<Table>,
        load_error: Option<&DashError>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let selectors = FilterColumn::ALL
            .iter()
            .map(|&c| Selector::new(&table, c))
            .collect();
        let failed = load_error.is_some() || table.is_empty();
        let mut model = Self {
            config: config.clone(),
            status: if failed { Status::FAILED } else { Status::READY },
            modus: Modus::DASHBOARD,
            table,
            load_error: load_error.map(|e| e.to_string()),
            selectors,
            focus: 0,
            outcome: Outcome::Idle,
            offset_row: 0,
            popup: None,
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            status_message: String::new(),
            last_status_message_update: Instant::now(),
        };
        if failed {
            warn!("{NO_DATA_LOADED}");
            model.set_status_message(NO_DATA_LOADED);
        } else {
            let msg = format!(
                "Loaded {} records from {}",
                model.table.nrows(),
                model.table.name()
            );
            model.set_status_message(msg);
        }
        model.update_uidata();
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    #[cfg(test)]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    #[cfg(test)]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Current selector state as a filter selection.
    pub fn selection(&self) -> Selection {
        let mut selection = Selection::new();
        for s in self.selectors.iter() {
            selection.set(s.column, s.value().map(String::from));
        }
        selection
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DashError> {
        if let Some(msg) = message {
            // A failed load leaves nothing to interact with
            let modus = if self.status == Status::FAILED {
                Modus::POPUP
            } else {
                self.modus
            };
            match modus {
                Modus::DASHBOARD => match msg {
                    Message::Quit => self.quit(),
                    Message::FocusUp => self.move_focus(-1),
                    Message::FocusDown => self.move_focus(1),
                    Message::SelectPrev => self.selectors[self.focus].previous(),
                    Message::SelectNext => self.selectors[self.focus].next(),
                    Message::Action(action) => self.dispatch(action),
                    Message::Summary => self.show_summary(),
                    Message::Help => self.show_help(),
                    Message::ScrollUp => self.scroll(-(self.page_size() as i64)),
                    Message::ScrollDown => self.scroll(self.page_size() as i64),
                    Message::ScrollBeginning => self.offset_row = 0,
                    Message::ScrollEnd => self.scroll(i64::MAX / 2),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help | Message::Summary => self.close_popup(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        self.update_uidata();
        Ok(())
    }

    // -------------------- Actions ---------------------- //

    /// Single entry point for the three dashboard buttons.
    pub fn dispatch(&mut self, action: Action) {
        info!("{action:?} with {:?}", self.selection());
        match action {
            Action::Search => self.search(),
            Action::Reset => self.reset(),
            Action::Average => self.average(),
        }
        self.offset_row = 0;
        self.update_uidata();
    }

    fn search(&mut self) {
        let start_time = Instant::now();
        let rows = filter::matching_rows(&self.table, &self.selection());
        if rows.is_empty() {
            self.warn(NO_SEARCH_RESULTS);
            return;
        }
        let table = self.table.take(&rows);
        info!(
            "Search found {} rows in {}ms",
            rows.len(),
            start_time.elapsed().as_millis()
        );
        self.set_status_message(format!("Found {} rows", rows.len()));
        self.outcome = Outcome::Rows { table, index: rows };
    }

    fn reset(&mut self) {
        for s in self.selectors.iter_mut() {
            s.reset();
        }
        self.outcome = Outcome::Idle;
        self.set_status_message("Filters reset");
    }

    fn average(&mut self) {
        let filtered = filter::filter(&self.table, &self.selection());
        if filtered.is_empty() {
            self.warn(NO_AVERAGE_DATA);
            return;
        }
        match aggregate::average(&filtered, &self.config.columns) {
            Ok(result) => {
                self.set_status_message(format!(
                    "Averaged {} columns over {} rows",
                    result.len(),
                    result.rows()
                ));
                self.outcome = Outcome::Averages(result);
            }
            Err(e) => self.warn(&e.to_string()),
        }
    }

    fn warn(&mut self, message: &str) {
        warn!("{message}");
        self.outcome = Outcome::Warning(message.to_string());
        self.set_status_message(message);
    }

    // -------------------- Control handling functions ---------------------- //

    fn move_focus(&mut self, step: i64) {
        let n = self.selectors.len() as i64;
        self.focus = (self.focus as i64 + step).rem_euclid(n) as usize;
    }

    fn page_size(&self) -> usize {
        std::cmp::max(self.uilayout.table_height, 1)
    }

    fn result_len(&self) -> usize {
        match &self.outcome {
            Outcome::Rows { table, .. } => table.nrows(),
            Outcome::Averages(result) => result.len(),
            Outcome::Idle | Outcome::Warning(_) => 0,
        }
    }

    fn scroll(&mut self, step: i64) {
        let last = self.result_len().saturating_sub(self.page_size()) as i64;
        self.offset_row = (self.offset_row as i64 + step).clamp(0, last) as usize;
    }

    fn show_help(&mut self) {
        self.modus = Modus::POPUP;
        self.popup = Some(PopupView::Help(HELP_TEXT.to_string()));
    }

    fn show_summary(&mut self) {
        let head = self.table.head(self.config.preview_rows);
        let columns = head
            .columns()
            .iter()
            .map(|c| self.column_view(c, 0, head.nrows()))
            .collect();
        self.modus = Modus::POPUP;
        self.popup = Some(PopupView::Summary {
            total_records: self.table.nrows(),
            columns: self
                .table
                .column_names()
                .into_iter()
                .map(String::from)
                .collect(),
            head: columns,
        });
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = Modus::DASHBOARD;
        self.popup = None;
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.scroll(0);
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    // -------------------- UI data ---------------------- //

    fn column_view(&self, column: &Column, rbegin: usize, rend: usize) -> ColumnView {
        let data = (rbegin..rend)
            .map(|r| column.display(r).to_string())
            .collect();
        ColumnView::from_values(&column.name, data, self.config.max_column_width)
    }

    fn update_uidata(&mut self) {
        let rend = std::cmp::min(self.offset_row + self.page_size(), self.result_len());
        let rbegin = std::cmp::min(self.offset_row, rend);

        let (heading, table, index, warning) = match &self.outcome {
            Outcome::Idle => (String::new(), Vec::new(), ColumnView::empty(), None),
            Outcome::Warning(msg) => (String::new(), Vec::new(), ColumnView::empty(), Some(msg.clone())),
            Outcome::Rows { table, index } => {
                let columns = self
                    .config
                    .columns
                    .resolve(table)
                    .into_iter()
                    .map(|cidx| self.column_view(&table.columns()[cidx], rbegin, rend))
                    .collect();
                let index_data = index[rbegin..rend]
                    .iter()
                    .map(|idx| idx.to_string())
                    .collect();
                (
                    format!("Search results ({} rows)", table.nrows()),
                    columns,
                    ColumnView::from_values("", index_data, usize::MAX),
                    None,
                )
            }
            Outcome::Averages(result) => {
                let means = &result.means()[rbegin..rend];
                let names = means.iter().map(|m| m.name.clone()).collect();
                let values = means.iter().map(|m| format_mean(m.mean)).collect();
                (
                    format!("{AVERAGES_HEADING} ({} rows)", result.rows()),
                    vec![
                        ColumnView::from_values("Column", names, self.config.max_column_width),
                        ColumnView::from_values("Mean", values, self.config.max_column_width),
                    ],
                    ColumnView::empty(),
                    None,
                )
            }
        };

        let fatal = if self.status == Status::FAILED {
            let mut lines = Vec::new();
            if let Some(e) = &self.load_error {
                lines.push(e.clone());
            }
            lines.push(NO_DATA_LOADED.to_string());
            Some(lines)
        } else {
            None
        };

        self.uidata = UIData {
            name: self.table.name().to_string(),
            selectors: self
                .selectors
                .iter()
                .map(|s| SelectorView {
                    label: s.column.name(),
                    value: s.value().unwrap_or("").to_string(),
                    position: s.position,
                    choices: s.choices.len(),
                })
                .collect(),
            focus: self.focus,
            heading,
            table,
            index,
            nrows: self.result_len(),
            offset_row: self.offset_row,
            warning,
            fatal,
            popup: self.popup.clone(),
            layout: self.uilayout.clone(),
            status_message: self.status_message.clone(),
            last_status_message_update: self.last_status_message_update,
        };
    }
}

/// Mean as shown in the dashboard. Undefined means stay visible as NaN.
pub fn format_mean(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{value:.4}")
    }
}
