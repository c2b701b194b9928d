use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph},
};

pub struct ImportWindow;

impl ImportWindow {
    pub fn render(frame: &mut Frame, area: Rect, input: &str) {
        let width = area.width.saturating_sub(8).min(80);
        let popup_area = Rect::new(
            area.x + (area.width - width) / 2,
            area.y + area.height / 3,
            width,
            5.min(area.height),
        );

        frame.render_widget(Clear, popup_area);

        let lines = vec![
            Line::from(format!("> {}", input)),
            Line::from("Enter import | Esc cancel").style(Style::default().fg(Color::DarkGray)),
        ];
        let prompt = Paragraph::new(lines)
            .block(Block::default().title("Import word list").borders(Borders::ALL))
            .style(Style::default().add_modifier(Modifier::BOLD));
        frame.render_widget(prompt, popup_area);

        let cursor_x = popup_area.x + 3 + Line::from(input).width() as u16;
        if cursor_x < popup_area.x + popup_area.width.saturating_sub(1) {
            frame.set_cursor_position((cursor_x, popup_area.y + 1));
        }
    }
}
