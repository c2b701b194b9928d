use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
};

use crate::grid::{EditState, EditableGrid};
use crate::models::{COLUMN_IPA, COLUMN_SOUND, COLUMN_STATUS, COLUMN_TRANS, COLUMN_WORD};

const COLUMN_SPACING: u16 = 1;
const CONCEALED: &str = "·····";

/// Where the last frame put the table, kept for mouse hit testing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    /// First body row on screen.
    pub body: Rect,
    pub widths: Vec<u16>,
    /// Index of the first grid row shown.
    pub offset: usize,
}

impl TableLayout {
    /// Map a screen position onto (row index, column index).
    pub fn hit_test(&self, x: u16, y: u16) -> Option<(usize, usize)> {
        if x < self.body.x
            || y < self.body.y
            || x >= self.body.x + self.body.width
            || y >= self.body.y + self.body.height
        {
            return None;
        }
        let row = self.offset + (y - self.body.y) as usize;

        let mut left = self.body.x;
        for (index, width) in self.widths.iter().enumerate() {
            let right = left + width;
            if x >= left && x < right {
                return Some((row, index));
            }
            left = right + COLUMN_SPACING;
        }
        None
    }
}

fn header_label(column: &str) -> &str {
    match column {
        COLUMN_WORD => "Word",
        COLUMN_TRANS => "Translation",
        COLUMN_IPA => "IPA",
        COLUMN_SOUND => "Sound",
        COLUMN_STATUS => "Status",
        other => other,
    }
}

fn is_masked(column: &str) -> bool {
    matches!(column, COLUMN_WORD | COLUMN_TRANS | COLUMN_IPA)
}

/// Split `total` between the columns. Sound and status are fixed; the text
/// columns share the rest 3:4:3.
pub fn column_widths(columns: &[String], total: u16) -> Vec<u16> {
    let gaps = COLUMN_SPACING * columns.len().saturating_sub(1) as u16;
    let fixed: u16 = columns
        .iter()
        .map(|c| match c.as_str() {
            COLUMN_SOUND => 6,
            COLUMN_STATUS => 10,
            _ => 0,
        })
        .sum();
    let flexible = total.saturating_sub(gaps + fixed);

    let mut widths: Vec<u16> = columns
        .iter()
        .map(|c| match c.as_str() {
            COLUMN_SOUND => 6,
            COLUMN_STATUS => 10,
            COLUMN_TRANS => flexible * 4 / 10,
            _ => flexible * 3 / 10,
        })
        .collect();

    // Rounding leftovers go to the last text column.
    let used: u16 = widths.iter().sum::<u16>() + gaps;
    if let Some(index) = columns.iter().rposition(|c| is_masked(c)) {
        widths[index] += total.saturating_sub(used);
    }
    widths
}

/// First row to show so that `selected` stays visible.
pub fn scroll_offset(selected: usize, visible: usize, current: usize) -> usize {
    if visible == 0 {
        return selected;
    }
    if selected < current {
        selected
    } else if selected >= current + visible {
        selected + 1 - visible
    } else {
        current
    }
}

pub struct TableView;

impl TableView {
    /// Draw the grid and return the layout used.
    pub fn render(
        frame: &mut Frame,
        area: Rect,
        grid: &EditableGrid,
        title: &str,
        previous_offset: usize,
    ) -> TableLayout {
        let block = Block::default().title(title).borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if grid.rows().is_empty() {
            let empty = Paragraph::new("No words here. Press 'f' to pick a file or 'i' to import one.")
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(empty, inner);
            return TableLayout::default();
        }

        let columns = grid.columns();
        let widths = column_widths(columns, inner.width);
        let body = Rect::new(
            inner.x,
            inner.y.saturating_add(1),
            inner.width,
            inner.height.saturating_sub(1),
        );
        let offset = scroll_offset(grid.selected_index(), body.height as usize, previous_offset);

        let header = Row::new(columns.iter().map(|c| Cell::from(header_label(c))))
            .style(Style::default().add_modifier(Modifier::BOLD));

        let editing = grid.session();
        let pending = match grid.state() {
            EditState::Pending(edit) => Some(edit),
            _ => None,
        };

        let rows: Vec<Row> = grid
            .rows()
            .iter()
            .enumerate()
            .skip(offset)
            .take(body.height as usize)
            .map(|(index, row)| {
                let cells = columns.iter().zip(&row.cells).map(|(column, value)| {
                    if let Some(session) = editing.filter(|s| s.row_id == row.id && &s.column == column) {
                        return Cell::from(session.buffer.clone())
                            .style(Style::default().bg(Color::Yellow).fg(Color::Black));
                    }
                    if let Some(edit) = pending.filter(|e| e.row_id == row.id && &e.column == column) {
                        return Cell::from(edit.proposed.clone()).style(
                            Style::default()
                                .fg(Color::DarkGray)
                                .add_modifier(Modifier::ITALIC),
                        );
                    }
                    if row.concealed && is_masked(column) {
                        return Cell::from(CONCEALED).style(Style::default().fg(Color::DarkGray));
                    }
                    let style = match (column.as_str(), value.as_str()) {
                        (COLUMN_STATUS, "learned") => Style::default().fg(Color::Green),
                        _ => Style::default(),
                    };
                    Cell::from(value.clone()).style(style)
                });
                let style = if index == grid.selected_index() {
                    Style::default().bg(Color::Blue).fg(Color::White)
                } else {
                    Style::default()
                };
                Row::new(cells).style(style)
            })
            .collect();

        let table = Table::new(rows, widths.iter().map(|w| Constraint::Length(*w)))
            .header(header)
            .column_spacing(COLUMN_SPACING);
        frame.render_widget(table, inner);

        let layout = TableLayout {
            body,
            widths,
            offset,
        };

        if let Some(session) = editing {
            Self::place_cursor(frame, grid, &layout, session.cursor, &session.buffer, &session.row_id, &session.column);
        }
        layout
    }

    fn place_cursor(
        frame: &mut Frame,
        grid: &EditableGrid,
        layout: &TableLayout,
        cursor: usize,
        buffer: &str,
        row_id: &str,
        column: &str,
    ) {
        let (Some(row), Some(col)) = (
            grid.rows().iter().position(|r| r.id == row_id),
            grid.column_index(column),
        ) else {
            return;
        };
        if row < layout.offset || row >= layout.offset + layout.body.height as usize {
            return;
        }

        let left: u16 = layout.widths[..col].iter().map(|w| w + COLUMN_SPACING).sum();
        let prefix: String = buffer.chars().take(cursor).collect();
        let prefix_width = Line::from(Span::raw(prefix)).width() as u16;
        let x = layout.body.x + left + prefix_width.min(layout.widths[col].saturating_sub(1));
        let y = layout.body.y + (row - layout.offset) as u16;
        frame.set_cursor_position((x, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::COLUMNS;

    fn columns() -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_widths_fill_the_area() {
        for total in [40u16, 80, 123] {
            let widths = column_widths(&columns(), total);
            let gaps = COLUMN_SPACING * (widths.len() as u16 - 1);
            assert_eq!(widths.iter().sum::<u16>() + gaps, total, "total={total}");
        }
    }

    #[test]
    fn test_hit_test_maps_cells() {
        let layout = TableLayout {
            body: Rect::new(1, 2, 40, 10),
            widths: vec![10, 10, 10, 4, 3],
            offset: 5,
        };
        assert_eq!(layout.hit_test(1, 2), Some((5, 0)));
        assert_eq!(layout.hit_test(12, 4), Some((7, 1)));
        // Column gap.
        assert_eq!(layout.hit_test(11, 2), None);
        assert_eq!(layout.hit_test(35, 2), Some((5, 3)));
        assert_eq!(layout.hit_test(0, 2), None);
        assert_eq!(layout.hit_test(5, 12), None);
    }

    #[test]
    fn test_scroll_keeps_selection_visible() {
        assert_eq!(scroll_offset(0, 10, 0), 0);
        assert_eq!(scroll_offset(12, 10, 0), 3);
        assert_eq!(scroll_offset(4, 10, 3), 3);
        assert_eq!(scroll_offset(1, 10, 3), 1);
    }
}
