use ratatui::{
    Frame,
    layout::Rect,
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph},
};

pub struct HelpWindow;

const HELP_TEXT: &[&str] = &[
    " Navigation:",
    "   j / Down          Next Word",
    "   k / Up            Previous Word",
    "   n / Right         Next Page",
    "   p / Left          Previous Page",
    "",
    " Flashcards:",
    "   1 / r             Reveal / Hide Word",
    "   a                 Reveal All",
    "   A                 Hide All",
    "   Space             Play Pronunciation",
    "   l                 Toggle Learned",
    "",
    " Editing:",
    "   Enter / e         Edit Cell",
    "   Tab               Switch Edit Column",
    "   Enter             Save Edit",
    "   Esc               Cancel Edit",
    "",
    " Mouse:",
    "   Double-click      Edit Cell",
    "   Click Sound       Play Pronunciation",
    "   Click Status      Toggle Learned",
    "",
    " Windows:",
    "   f                 Files",
    "   i                 Import File",
    "   q                 Quit / Close Window",
    "   ?                 Help",
];

impl HelpWindow {
    pub fn get_total_lines() -> usize {
        HELP_TEXT.len()
    }

    fn popup_area(area: Rect) -> Rect {
        let max_width = HELP_TEXT
            .iter()
            .map(|s| Line::from(*s).width())
            .max()
            .unwrap_or(0) as u16;
        let width = (max_width + 4).min(area.width);
        let height = (HELP_TEXT.len() as u16 + 2).min(area.height);

        let x = area.x + (area.width - width) / 2;
        let y = area.y + (area.height - height) / 2;
        Rect::new(x, y, width, height)
    }

    /// Largest scroll offset that still fills the popup.
    pub fn max_scroll_offset(area: Rect) -> u16 {
        let visible = Self::popup_area(area).height.saturating_sub(2) as usize;
        Self::get_total_lines().saturating_sub(visible) as u16
    }

    pub fn render(frame: &mut Frame, area: Rect, scroll_offset: u16) {
        let help_content: Vec<Line> = HELP_TEXT.iter().map(|&s| Line::from(s)).collect();
        let popup_area = Self::popup_area(area);

        frame.render_widget(Clear, popup_area);

        let help_paragraph = Paragraph::new(help_content)
            .block(Block::default().title("Help").borders(Borders::ALL))
            .scroll((scroll_offset, 0));

        frame.render_widget(help_paragraph, popup_area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_limit() {
        assert_eq!(HelpWindow::max_scroll_offset(Rect::new(0, 0, 80, 100)), 0);
        let short = Rect::new(0, 0, 80, 12);
        assert_eq!(
            HelpWindow::max_scroll_offset(short) as usize,
            HelpWindow::get_total_lines() - 10
        );
    }
}
