//! Editable grid state: which cell is being edited, what it showed before,
//! and what the user typed.
//!
//! The grid knows nothing about storage. Confirming an edit yields a
//! [`CellEdit`]; whoever persists it reports back through
//! [`EditableGrid::resolve`], and the grid either shows the new value or
//! rolls the cell back to the original.

use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub id: String,
    pub cells: Vec<String>,
    /// Concealed rows hide their editable text and cannot be edited.
    pub concealed: bool,
}

/// A confirmed change to one cell, before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub row_id: String,
    pub column: String,
    pub original: String,
    pub proposed: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub row_id: String,
    pub column: String,
    pub original: String,
    pub buffer: String,
    /// Cursor position in characters.
    pub cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Editing(EditSession),
    /// Waiting for the persistence result. No new edit can start.
    Pending(CellEdit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    /// No editor was open.
    NotEditing,
    /// The value did not change; nothing to persist.
    Unchanged,
    Submit(CellEdit),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome<E> {
    NotEditing,
    Unchanged,
    Committed(CellEdit),
    /// `None` when the callback panicked.
    RolledBack(CellEdit, Option<E>),
}

#[derive(Debug, Clone, Default)]
pub struct EditableGrid {
    columns: Vec<String>,
    editable: Vec<String>,
    rows: Vec<GridRow>,
    state: EditState,
    selected: usize,
    edit_column: usize,
}

impl EditableGrid {
    /// Editable columns that are not part of `columns` are dropped.
    pub fn new(columns: &[&str], editable: &[&str]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let editable = editable
            .iter()
            .filter(|c| columns.iter().any(|col| col == *c))
            .map(|c| c.to_string())
            .collect();
        Self {
            columns,
            editable,
            ..Self::default()
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn editable_columns(&self) -> &[String] {
        &self.editable
    }

    pub fn is_editable(&self, column: &str) -> bool {
        self.editable.iter().any(|c| c == column)
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, EditState::Editing(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, EditState::Pending(_))
    }

    pub fn session(&self) -> Option<&EditSession> {
        match &self.state {
            EditState::Editing(session) => Some(session),
            _ => None,
        }
    }

    /// Replace every displayed row. An open editor is discarded; a pending
    /// commit survives so its result can still be applied.
    pub fn set_rows(&mut self, rows: Vec<GridRow>) {
        if self.is_editing() {
            self.state = EditState::Idle;
        }
        self.rows = rows;
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }

    /// Replace one row in place, matched by id.
    pub fn update_row(&mut self, row: GridRow) -> bool {
        match self.rows.iter_mut().find(|r| r.id == row.id) {
            Some(slot) => {
                *slot = row;
                true
            }
            None => false,
        }
    }

    pub fn value(&self, row_id: &str, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        let row = self.rows.iter().find(|r| r.id == row_id)?;
        row.cells.get(col).map(String::as_str)
    }

    fn set_value(&mut self, row_id: &str, column: &str, value: &str) {
        let Some(col) = self.column_index(column) else {
            return;
        };
        if let Some(cell) = self
            .rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .and_then(|r| r.cells.get_mut(col))
        {
            *cell = value.to_string();
        }
    }

    // ---------------- selection ----------------

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_row_id(&self) -> Option<&str> {
        self.rows.get(self.selected).map(|r| r.id.as_str())
    }

    pub fn select(&mut self, index: usize) {
        if !self.rows.is_empty() {
            self.selected = index.min(self.rows.len() - 1);
        }
    }

    pub fn select_next(&mut self) {
        self.select(self.selected.saturating_add(1));
    }

    pub fn select_prev(&mut self) {
        self.select(self.selected.saturating_sub(1));
    }

    /// Editable column used by keyboard editing.
    pub fn edit_column(&self) -> Option<&str> {
        self.editable.get(self.edit_column).map(String::as_str)
    }

    pub fn cycle_edit_column(&mut self) {
        if !self.editable.is_empty() {
            self.edit_column = (self.edit_column + 1) % self.editable.len();
        }
    }

    // ---------------- edit session ----------------

    /// Open an editor on a cell. Returns `false` when the cell cannot be
    /// edited: unknown row or column, non-editable column, concealed row,
    /// or a commit still pending.
    pub fn begin_edit(&mut self, row_id: &str, column: &str) -> bool {
        if self.is_pending() || !self.is_editable(column) {
            return false;
        }
        let Some(index) = self.rows.iter().position(|r| r.id == row_id) else {
            return false;
        };
        if self.rows[index].concealed {
            return false;
        }
        let Some(original) = self.value(row_id, column).map(str::to_string) else {
            return false;
        };

        // A previous editor is dropped without reaching the callback.
        self.selected = index;
        self.state = EditState::Editing(EditSession {
            row_id: row_id.to_string(),
            column: column.to_string(),
            cursor: original.chars().count(),
            buffer: original.clone(),
            original,
        });
        true
    }

    /// Open an editor on the visual cell at (`row_index`, `column_index`).
    pub fn begin_edit_at(&mut self, row_index: usize, column_index: usize) -> bool {
        let (Some(row), Some(column)) = (self.rows.get(row_index), self.columns.get(column_index))
        else {
            return false;
        };
        let (row_id, column) = (row.id.clone(), column.clone());
        self.begin_edit(&row_id, &column)
    }

    /// Open an editor on the selected row's keyboard edit column.
    pub fn begin_edit_selected(&mut self) -> bool {
        let (Some(row_id), Some(column)) = (
            self.selected_row_id().map(str::to_string),
            self.edit_column().map(str::to_string),
        ) else {
            return false;
        };
        self.begin_edit(&row_id, &column)
    }

    pub fn insert_char(&mut self, ch: char) {
        if let EditState::Editing(session) = &mut self.state {
            let at = byte_offset(&session.buffer, session.cursor);
            session.buffer.insert(at, ch);
            session.cursor += 1;
        }
    }

    pub fn backspace(&mut self) {
        if let EditState::Editing(session) = &mut self.state
            && session.cursor > 0
        {
            session.cursor -= 1;
            let at = byte_offset(&session.buffer, session.cursor);
            session.buffer.remove(at);
        }
    }

    pub fn delete(&mut self) {
        if let EditState::Editing(session) = &mut self.state
            && session.cursor < session.buffer.chars().count()
        {
            let at = byte_offset(&session.buffer, session.cursor);
            session.buffer.remove(at);
        }
    }

    pub fn move_cursor_left(&mut self) {
        if let EditState::Editing(session) = &mut self.state {
            session.cursor = session.cursor.saturating_sub(1);
        }
    }

    pub fn move_cursor_right(&mut self) {
        if let EditState::Editing(session) = &mut self.state {
            session.cursor = (session.cursor + 1).min(session.buffer.chars().count());
        }
    }

    pub fn move_cursor_home(&mut self) {
        if let EditState::Editing(session) = &mut self.state {
            session.cursor = 0;
        }
    }

    pub fn move_cursor_end(&mut self) {
        if let EditState::Editing(session) = &mut self.state {
            session.cursor = session.buffer.chars().count();
        }
    }

    /// Enter or focus loss. Closes the editor; a changed value moves the
    /// grid to `Pending` until [`resolve`](Self::resolve) is called.
    pub fn confirm(&mut self) -> Confirm {
        if !self.is_editing() {
            return Confirm::NotEditing;
        }
        let EditState::Editing(session) = std::mem::take(&mut self.state) else {
            return Confirm::NotEditing;
        };
        if session.buffer == session.original {
            return Confirm::Unchanged;
        }
        let edit = CellEdit {
            row_id: session.row_id,
            column: session.column,
            original: session.original,
            proposed: session.buffer,
        };
        self.state = EditState::Pending(edit.clone());
        Confirm::Submit(edit)
    }

    /// Escape. The cell keeps its value and nothing is persisted.
    pub fn cancel(&mut self) {
        if self.is_editing() {
            self.state = EditState::Idle;
        }
    }

    /// Apply the persistence result of the pending edit. Returns the edit
    /// that was resolved, if any.
    pub fn resolve(&mut self, committed: bool) -> Option<CellEdit> {
        let EditState::Pending(edit) = std::mem::take(&mut self.state) else {
            return None;
        };
        let shown = if committed { &edit.proposed } else { &edit.original };
        let shown = shown.clone();
        self.set_value(&edit.row_id, &edit.column, &shown);
        Some(edit)
    }

    /// Confirm the open editor and persist through `commit` synchronously.
    /// A panic inside `commit` counts as a failure.
    pub fn commit_with<T, E>(
        &mut self,
        commit: impl FnOnce(&CellEdit) -> Result<T, E>,
    ) -> EditOutcome<E> {
        let edit = match self.confirm() {
            Confirm::NotEditing => return EditOutcome::NotEditing,
            Confirm::Unchanged => return EditOutcome::Unchanged,
            Confirm::Submit(edit) => edit,
        };

        match catch_unwind(AssertUnwindSafe(|| commit(&edit))) {
            Ok(Ok(_)) => {
                self.resolve(true);
                EditOutcome::Committed(edit)
            }
            Ok(Err(err)) => {
                self.resolve(false);
                EditOutcome::RolledBack(edit, Some(err))
            }
            Err(_) => {
                self.resolve(false);
                EditOutcome::RolledBack(edit, None)
            }
        }
    }
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
