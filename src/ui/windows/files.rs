use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use crate::models::FileRecord;
use crate::ui::windows::centered_popup_area;

pub struct FilesWindow;

impl FilesWindow {
    pub fn format_entry(file: &FileRecord, current: Option<&str>) -> String {
        let marker = if current == Some(file.filename.as_str()) {
            "*"
        } else {
            " "
        };
        format!(
            "{} {}  ({})",
            marker,
            file.filename,
            file.imported_at.format("%Y-%m-%d %H:%M")
        )
    }

    pub fn render(
        frame: &mut Frame,
        area: Rect,
        files: &[FileRecord],
        selected_index: usize,
        current: Option<&str>,
    ) {
        let popup_area = centered_popup_area(area, 60, 60);

        frame.render_widget(Clear, popup_area);
        let block = Block::default().title("Files").borders(Borders::ALL);
        let inner = block.inner(popup_area);
        frame.render_widget(block, popup_area);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(inner);
        let footer = Paragraph::new("Enter open | i import | q close");

        if files.is_empty() {
            let paragraph = Paragraph::new("Nothing imported yet")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(paragraph, rows[0]);
            frame.render_widget(footer, rows[1]);
            return;
        }

        let items: Vec<ListItem> = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let style = if i == selected_index {
                    Style::default().bg(Color::Blue).fg(Color::White)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(Self::format_entry(file, current))).style(style)
            })
            .collect();

        frame.render_widget(List::new(items), rows[0]);
        frame.render_widget(footer, rows[1]);
    }
}
