use std::time::Duration;

use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, Wrap},
};

use crate::domain::DashConfig;
use crate::model::{ColumnView, DASHBOARD_TITLE, Model, PopupView, SelectorView, UIData};

pub const TITLE_HEIGHT: usize = 3;
pub const BUTTONS_HEIGHT: usize = 3;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const RESULT_BORDER: usize = 2;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const SIDEBAR_WIDTH: usize = 30;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

const STATUS_MESSAGE_FADE: Duration = Duration::from_secs(5);
const STATUS_HINT: &str = " ? help  q quit ";

#[derive(Debug)]
pub struct DashUI {
    preview_rows: usize,
}

impl DashUI {
    pub fn new(config: &DashConfig) -> Self {
        Self {
            preview_rows: config.preview_rows,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [main_area, status_area] = Layout::vertical([
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        if let Some(lines) = &uidata.fatal {
            self.render_fatal(lines, main_area, frame);
            self.render_statusline(uidata, status_area, frame);
            return;
        }

        let [sidebar, content] = Layout::horizontal([
            Constraint::Length(SIDEBAR_WIDTH as u16),
            Constraint::Min(0),
        ])
        .areas(main_area);
        let [title, buttons, result] = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT as u16),
            Constraint::Length(BUTTONS_HEIGHT as u16),
            Constraint::Min(0),
        ])
        .areas(content);

        self.render_selectors(uidata, sidebar, frame);
        self.render_title(uidata, title, frame);
        self.render_buttons(buttons, frame);
        self.render_result(uidata, result, frame);
        self.render_statusline(uidata, status_area, frame);

        if let Some(popup) = &uidata.popup {
            self.render_popup(popup, frame);
        }
    }

    fn render_fatal(&self, lines: &[String], area: Rect, frame: &mut Frame) {
        let mut text: Vec<Line> = lines
            .iter()
            .map(|l| Line::from(l.clone().red().bold()))
            .collect();
        text.push(Line::default());
        text.push(Line::from(vec![" Quit ".into(), "<Q>".blue().bold()]));

        let block = Block::bordered()
            .title(Line::from(format!(" {DASHBOARD_TITLE} ").bold()).centered())
            .border_set(border::THICK);
        let paragraph = Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .block(block);
        frame.render_widget(paragraph, area);
    }

    fn render_title(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let block = Block::bordered()
            .title_bottom(Line::from(format!(" {} ", uidata.name).yellow()).right_aligned())
            .border_set(border::THICK);
        let title = Paragraph::new(Line::from(DASHBOARD_TITLE.bold().blue()))
            .centered()
            .block(block);
        frame.render_widget(title, area);
    }

    fn render_selectors(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let block = Block::bordered().title(Line::from(" Filters ".bold()));
        let inner_width = (area.width as usize).saturating_sub(6);

        let mut lines: Vec<Line> = Vec::new();
        for (idx, selector) in uidata.selectors.iter().enumerate() {
            let focused = idx == uidata.focus;
            lines.push(Self::selector_label(selector, focused));
            lines.push(Self::selector_value(selector, inner_width));
            lines.push(Line::default());
        }
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn selector_label(selector: &SelectorView, focused: bool) -> Line<'static> {
        let count = format!(" {}/{}", selector.position, selector.choices).dark_gray();
        if focused {
            Line::from(vec![
                "▶ ".cyan().bold(),
                Span::styled(selector.label, Style::new().cyan().bold()),
                count,
            ])
        } else {
            Line::from(vec![
                "  ".into(),
                Span::styled(selector.label, Style::new().bold()),
                count,
            ])
        }
    }

    fn selector_value(selector: &SelectorView, width: usize) -> Line<'static> {
        if selector.choices == 0 {
            return Line::from("  (no choices)".dark_gray());
        }
        let value = if selector.value.is_empty() {
            "(any)"
        } else {
            selector.value.as_str()
        };
        let value = Self::get_visible_name(value, width);
        Line::from(vec![
            "  ".into(),
            Span::styled(
                format!("‹{value:^width$}›"),
                Style::new().black().on_yellow(),
            ),
        ])
    }

    fn render_buttons(&self, area: Rect, frame: &mut Frame) {
        let areas: [Rect; 3] = Layout::horizontal([Constraint::Ratio(1, 3); 3]).areas(area);
        let buttons = [("Search", "<Enter>"), ("Reset", "<R>"), ("Average", "<A>")];
        for ((label, key), area) in buttons.into_iter().zip(areas) {
            let line = Line::from(vec![format!(" {label} ").bold(), key.blue().bold()]);
            let button = Paragraph::new(line).centered().block(Block::bordered());
            frame.render_widget(button, area);
        }
    }

    fn render_result(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let mut block = Block::bordered().title(Line::from(format!(" {} ", uidata.heading).bold()));
        let visible = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        if visible > 0 {
            block = block.title_bottom(
                Line::from(format!(
                    " {}-{} of {} ",
                    uidata.offset_row + 1,
                    uidata.offset_row + visible,
                    uidata.nrows
                ))
                .right_aligned(),
            );
        }

        if let Some(warning) = &uidata.warning {
            let paragraph = Paragraph::new(Line::from(warning.clone().yellow().bold())).block(block);
            frame.render_widget(paragraph, area);
            return;
        }
        if uidata.table.is_empty() {
            let hint = Line::from(vec![
                "Choose filters, then ".into(),
                "Search".bold(),
                " or ".into(),
                "Average".bold(),
            ]);
            frame.render_widget(Paragraph::new(hint).dark_gray().block(block), area);
            return;
        }

        let index = (!uidata.index.data.is_empty()).then_some(&uidata.index);
        frame.render_widget(Self::build_table(&uidata.table, index).block(block), area);
    }

    fn build_table<'a>(columns: &'a [ColumnView], index: Option<&'a ColumnView>) -> Table<'a> {
        let mut widths = Vec::with_capacity(columns.len() + 1);
        let mut header = Vec::with_capacity(columns.len() + 1);
        if let Some(index) = index {
            widths.push(Constraint::Length(index.width as u16));
            header.push(Cell::from(""));
        }
        for c in columns {
            widths.push(Constraint::Length(c.width as u16));
            header.push(Cell::from(Self::get_visible_name(&c.name, c.width)));
        }

        let nrows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..nrows).map(|ridx| {
            let mut cells = Vec::with_capacity(columns.len() + 1);
            if let Some(index) = index {
                cells.push(Cell::from(index.data[ridx].as_str()).style(Style::new().dark_gray()));
            }
            cells.extend(columns.iter().map(|c| Cell::from(c.data[ridx].as_str())));
            Row::new(cells)
        });

        Table::new(rows, widths)
            .header(Row::new(header).style(Style::new().bold().underlined()))
            .column_spacing(1)
    }

    fn render_statusline(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let [message_area, hint_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(STATUS_HINT.len() as u16),
        ])
        .areas(area);

        let style = if uidata.last_status_message_update.elapsed() > STATUS_MESSAGE_FADE {
            Style::new().dark_gray()
        } else {
            Style::new()
        };
        let message = Span::styled(format!(" {}", uidata.status_message), style);
        frame.render_widget(Paragraph::new(Line::from(message)), message_area);
        frame.render_widget(
            Paragraph::new(Line::from(STATUS_HINT.blue().bold())).right_aligned(),
            hint_area,
        );
    }

    fn render_popup(&self, popup: &PopupView, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 80, 70);
        frame.render_widget(Clear, area);

        match popup {
            PopupView::Help(text) => {
                let block = Block::bordered()
                    .title(Line::from(" Help ".bold()).centered())
                    .title_bottom(Line::from(" <Esc> close ".blue()).centered())
                    .border_set(border::THICK);
                frame.render_widget(Paragraph::new(Text::from(text.as_str())).block(block), area);
            }
            PopupView::Summary {
                total_records,
                columns,
                head,
            } => {
                let block = Block::bordered()
                    .title(Line::from(" Data Summary ".bold()).centered())
                    .title_bottom(Line::from(" <Esc> close ".blue()).centered())
                    .border_set(border::THICK);
                let inner = block.inner(area);
                frame.render_widget(block, area);

                let column_list = format!("Columns available: {}", columns.join(", "));
                let list_lines = column_list.chars().count() / std::cmp::max(inner.width as usize, 1) + 1;
                let [info_area, table_area] = Layout::vertical([
                    Constraint::Length((list_lines + 3) as u16),
                    Constraint::Min(0),
                ])
                .areas(inner);

                let info = vec![
                    Line::from(format!("Total records: {total_records}")),
                    Line::from(column_list),
                    Line::default(),
                    Line::from(format!("First {} rows:", self.preview_rows).bold()),
                ];
                frame.render_widget(Paragraph::new(info).wrap(Wrap { trim: true }), info_area);
                frame.render_widget(Self::build_table(head, None), table_area);
            }
        }
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
        let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
        let [area] = vertical.areas(area);
        let [area] = horizontal.areas(area);
        area
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return "".to_string();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, DashError, Message};
    use crate::table::Table as DataTable;
    use crate::table::testing::table_from_rows;
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Arc;

    fn model(width: usize, height: usize) -> Model {
        let table = table_from_rows(
            &["Year", "Month", "Day", "Time", "Building", "M1", "M2"],
            &[
                &["2020", "1", "1", "08:00", "B1", "1", "text"],
                &["2021", "1", "1", "08:00", "B2", "3", "more"],
            ],
        );
        Model::init(&DashConfig::default(), Arc::new(table), None, width, height)
    }

    fn render(model: &Model) -> String {
        let mut ui = DashUI::new(&DashConfig::default());
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| ui.draw(model, f)).unwrap();

        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn renders_dashboard() {
        let screen = render(&model(100, 30));
        assert!(screen.contains(DASHBOARD_TITLE));
        for label in ["Year", "Month", "Day", "Time", "Building"] {
            assert!(screen.contains(label), "missing selector {label}");
        }
        assert!(screen.contains("Search"));
        assert!(screen.contains("Average"));
        assert!(screen.contains("(any)"));
    }

    #[test]
    fn renders_averages_with_nan() {
        let mut model = model(100, 30);
        model.dispatch(Action::Average);
        let screen = render(&model);
        assert!(screen.contains("Averages for Selected Filters"));
        assert!(screen.contains("2.0000"));
        assert!(screen.contains("NaN"));
    }

    #[test]
    fn renders_search_rows() {
        let mut model = model(100, 30);
        model.update(Some(Message::SelectNext)).unwrap();
        model.dispatch(Action::Search);
        let screen = render(&model);
        assert!(screen.contains("Search results (1 rows)"));
        assert!(screen.contains("text"));
        assert!(!screen.contains("more"));
    }

    #[test]
    fn renders_summary_popup() {
        let mut model = model(100, 30);
        model.update(Some(Message::Summary)).unwrap();
        let screen = render(&model);
        assert!(screen.contains("Total records: 2"));
        assert!(screen.contains("Columns available: Year, Month"));
    }

    #[test]
    fn renders_load_failure() {
        let err = DashError::FileNotFound("East_Final.csv".into());
        let model = Model::init(
            &DashConfig::default(),
            Arc::new(DataTable::empty()),
            Some(&err),
            100,
            30,
        );
        let screen = render(&model);
        assert!(screen.contains("File not found: East_Final.csv"));
        assert!(screen.contains("No data loaded."));
    }

    #[test]
    fn visible_name_is_shortened() {
        assert_eq!(DashUI::get_visible_name("Temperature", 8), "Tempe...");
        assert_eq!(DashUI::get_visible_name("M1", 8), "M1");
        assert_eq!(DashUI::get_visible_name("M1", 2), "");
    }
}
