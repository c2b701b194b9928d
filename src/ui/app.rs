use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap},
};

use crate::controller::Controller;
use crate::error::{CommitError, CommitResult};
use crate::grid::EditState;
use crate::importer::{ImportEvent, Importer, import_name, spawn_import};
use crate::logging;
use crate::models::{
    COLUMN_SOUND, COLUMN_STATUS, FileRecord, ImportOutcome, ImportProgress, MessageType,
    WindowType,
};
use crate::ui::table::{TableLayout, TableView};
use crate::ui::windows::{files::FilesWindow, help::HelpWindow, import::ImportWindow};

const MESSAGE_TTL: Duration = Duration::from_secs(3);
const DOUBLE_CLICK: Duration = Duration::from_millis(400);
const WORKER_POLL: Duration = Duration::from_millis(100);

/// UI-specific state management
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub active_window: WindowType,
    pub message: Option<String>,
    pub message_type: Option<MessageType>,
    pub message_time: Option<Instant>,
    pub help_scroll_offset: u16,
    pub files: Vec<FileRecord>,
    pub files_selected_index: usize,
    pub import_input: String,
    pub import_progress: Option<(String, ImportProgress)>,
    pub should_quit: bool,
}

impl UiState {
    pub fn set_message(&mut self, message: impl Into<String>, message_type: MessageType) {
        self.message = Some(message.into());
        self.message_type = Some(message_type);
        self.message_time = Some(Instant::now());
    }

    pub fn clear_message(&mut self) {
        self.message = None;
        self.message_type = None;
        self.message_time = None;
    }

    /// Returns true if the current message is older than three seconds.
    pub fn message_expired(&self) -> bool {
        self.message_time.is_some_and(|t| t.elapsed() >= MESSAGE_TTL)
    }

    pub fn open_window(&mut self, window_type: WindowType) {
        match window_type {
            WindowType::Help => self.help_scroll_offset = 0,
            WindowType::ImportPrompt => self.import_input.clear(),
            WindowType::Table | WindowType::Files => {}
        }
        self.active_window = window_type;
    }
}

pub struct App {
    ui_state: UiState,
    controller: Controller,
    importer: Importer,
    import_rx: Option<Receiver<ImportEvent>>,
    commit_rx: Option<Receiver<(String, CommitResult)>>,
    table_layout: TableLayout,
    last_click: Option<(Instant, usize, usize)>,
    mouse_support: bool,
}

impl App {
    pub fn new(controller: Controller, importer: Importer, mouse_support: bool) -> Self {
        Self {
            ui_state: UiState::default(),
            controller,
            importer,
            import_rx: None,
            commit_rx: None,
            table_layout: TableLayout::default(),
            last_click: None,
            mouse_support,
        }
    }

    pub fn ui_state(&self) -> &UiState {
        &self.ui_state
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn is_busy(&self) -> bool {
        self.import_rx.is_some() || self.commit_rx.is_some()
    }

    /// Show `filename`, or the most recently imported file when `None`.
    pub fn open_file(&mut self, filename: Option<&str>) -> eyre::Result<()> {
        let name = match filename {
            Some(name) => Some(name.to_string()),
            None => self.controller.files()?.last().map(|f| f.filename.clone()),
        };
        if let Some(name) = name {
            self.controller.select_file(&name)?;
            self.flush_notices();
        }
        Ok(())
    }

    /// Run the main application loop
    pub fn run(&mut self) -> eyre::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        if self.mouse_support {
            crossterm::execute!(
                io::stdout(),
                crossterm::terminal::EnterAlternateScreen,
                crossterm::event::EnableMouseCapture
            )?;
        } else {
            crossterm::execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
        }

        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);
        self.finish_pending_commit();

        terminal.clear()?;
        terminal.show_cursor()?;
        crossterm::execute!(
            io::stdout(),
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::event::DisableMouseCapture
        )?;
        crossterm::terminal::disable_raw_mode()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> eyre::Result<()> {
        loop {
            if self.ui_state.should_quit {
                break;
            }

            if self.ui_state.message_expired() {
                self.ui_state.clear_message();
            }

            self.poll_workers();

            {
                let Self {
                    ui_state,
                    controller,
                    table_layout,
                    ..
                } = self;
                terminal.draw(|frame| {
                    *table_layout = Self::render_static(frame, ui_state, controller, table_layout.offset);
                })?;
            }

            let poll_timeout = if self.is_busy() {
                WORKER_POLL
            } else {
                match self.ui_state.message_time {
                    Some(t) => MESSAGE_TTL.saturating_sub(t.elapsed()).max(WORKER_POLL),
                    None => Duration::from_secs(60),
                }
            };

            if !crossterm::event::poll(poll_timeout)? {
                continue;
            }

            match crossterm::event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key_event(key),
                Event::Mouse(mouse) if self.mouse_support => self.handle_mouse_event(mouse),
                _ => {}
            }
        }
        Ok(())
    }

    // ---------------- workers ----------------

    /// Drain finished commits and import progress without blocking.
    pub fn poll_workers(&mut self) {
        let received = self.commit_rx.as_ref().map(|rx| rx.try_recv());
        match received {
            Some(Ok((key, result))) => {
                self.commit_rx = None;
                let _ = self.controller.settle(&key, result);
                self.flush_notices();
            }
            Some(Err(TryRecvError::Disconnected)) => {
                self.commit_rx = None;
                self.abort_pending_commit("commit worker stopped");
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        while let Some(received) = self.import_rx.as_ref().map(|rx| rx.try_recv()) {
            match received {
                Ok(ImportEvent::Progress(progress)) => {
                    if let Some((_, current)) = self.ui_state.import_progress.as_mut() {
                        *current = progress;
                    }
                }
                Ok(ImportEvent::Finished(outcome)) => {
                    self.import_rx = None;
                    self.ui_state.import_progress = None;
                    self.import_finished(outcome);
                }
                Ok(ImportEvent::Failed(err)) => {
                    self.import_rx = None;
                    self.ui_state.import_progress = None;
                    self.ui_state
                        .set_message(format!("Import failed: {}", err), MessageType::Error);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.import_rx = None;
                    self.ui_state.import_progress = None;
                }
            }
        }
    }

    fn import_finished(&mut self, outcome: ImportOutcome) {
        match outcome {
            ImportOutcome::Imported(summary) => {
                // Switching files drops the open editor, which counts as
                // losing focus: save what was typed first.
                if self.controller.grid().is_editing() {
                    self.start_commit();
                }
                self.ui_state.set_message(
                    format!(
                        "Imported {}: {} entries, {} new words",
                        summary.filename, summary.entries, summary.new_words
                    ),
                    MessageType::Info,
                );
                if let Err(err) = self.controller.select_file(&summary.filename) {
                    self.ui_state.set_message(err.to_string(), MessageType::Error);
                }
                self.refresh_file_list();
            }
            ImportOutcome::AlreadyImported(filename) => {
                self.ui_state.set_message(
                    format!("{} was already imported", filename),
                    MessageType::Warning,
                );
            }
        }
    }

    fn abort_pending_commit(&mut self, reason: &str) {
        let key = match self.controller.grid().state() {
            EditState::Pending(edit) => edit.row_id.clone(),
            _ => return,
        };
        let _ = self
            .controller
            .settle(&key, Err(CommitError::Aborted(reason.to_string())));
        self.flush_notices();
    }

    fn finish_pending_commit(&mut self) {
        if let Some(rx) = self.commit_rx.take() {
            match rx.recv() {
                Ok((key, result)) => {
                    let _ = self.controller.settle(&key, result);
                }
                Err(_) => self.abort_pending_commit("commit worker stopped"),
            }
        }
    }

    fn start_commit(&mut self) {
        if let Some(job) = self.controller.confirm_edit() {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let key = job.key.clone();
                let result = job.run();
                let _ = tx.send((key, result));
            });
            self.commit_rx = Some(rx);
        }
        self.flush_notices();
    }

    fn start_import(&mut self, input: &str) {
        if self.import_rx.is_some() {
            self.ui_state
                .set_message("An import is already running", MessageType::Warning);
            return;
        }
        let path = expand_home(input.trim());
        if !path.is_file() {
            self.ui_state.set_message(
                format!("No such file: {}", path.display()),
                MessageType::Error,
            );
            return;
        }

        logging::info(format!("starting import of {}", path.display()));
        self.ui_state.import_progress = Some((import_name(&path), ImportProgress::default()));
        self.import_rx = Some(spawn_import(self.importer.clone(), path));
    }

    fn flush_notices(&mut self) {
        if let Some(notice) = self.controller.take_notices().pop() {
            self.ui_state.set_message(notice.text, notice.kind);
        }
    }

    fn refresh_file_list(&mut self) {
        match self.controller.files() {
            Ok(files) => {
                self.ui_state.files_selected_index = self
                    .ui_state
                    .files_selected_index
                    .min(files.len().saturating_sub(1));
                self.ui_state.files = files;
            }
            Err(err) => self.ui_state.set_message(err.to_string(), MessageType::Error),
        }
    }

    fn report<T>(&mut self, result: Result<T, impl std::fmt::Display>) {
        if let Err(err) = result {
            self.ui_state.set_message(err.to_string(), MessageType::Error);
        }
        self.flush_notices();
    }

    // ---------------- keys ----------------

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.ui_state.should_quit = true;
            return;
        }

        match self.ui_state.active_window {
            WindowType::Table if self.controller.grid().is_editing() => self.handle_editor_keys(key),
            WindowType::Table => self.handle_table_keys(key),
            WindowType::Files => self.handle_files_keys(key),
            WindowType::ImportPrompt => self.handle_import_keys(key),
            WindowType::Help => self.handle_help_keys(key),
        }
    }

    fn handle_editor_keys(&mut self, key: KeyEvent) {
        let grid = self.controller.grid_mut();
        match key.code {
            KeyCode::Enter => self.start_commit(),
            KeyCode::Esc => grid.cancel(),
            KeyCode::Backspace => grid.backspace(),
            KeyCode::Delete => grid.delete(),
            KeyCode::Left => grid.move_cursor_left(),
            KeyCode::Right => grid.move_cursor_right(),
            KeyCode::Home => grid.move_cursor_home(),
            KeyCode::End => grid.move_cursor_end(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                grid.insert_char(c)
            }
            _ => {}
        }
    }

    fn selected_key(&self) -> Option<String> {
        self.controller.grid().selected_row_id().map(str::to_string)
    }

    fn handle_table_keys(&mut self, key: KeyEvent) {
        if self.ui_state.message.is_some() {
            self.ui_state.clear_message();
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.ui_state.should_quit = true,
            KeyCode::Char('?') => self.ui_state.open_window(WindowType::Help),
            KeyCode::Char('f') => {
                self.refresh_file_list();
                self.ui_state.open_window(WindowType::Files);
            }
            KeyCode::Char('i') => self.ui_state.open_window(WindowType::ImportPrompt),
            KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
                let result = self.controller.next_page();
                self.report(result);
            }
            KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => {
                let result = self.controller.prev_page();
                self.report(result);
            }
            KeyCode::Char('j') | KeyCode::Down => self.controller.grid_mut().select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.controller.grid_mut().select_prev(),
            KeyCode::Enter | KeyCode::Char('e') => self.begin_edit_selected(),
            KeyCode::Tab => {
                let grid = self.controller.grid_mut();
                grid.cycle_edit_column();
                if let Some(column) = grid.edit_column().map(str::to_string) {
                    self.ui_state
                        .set_message(format!("Editing column: {}", column), MessageType::Info);
                }
            }
            KeyCode::Char('1') | KeyCode::Char('r') => {
                if let Some(key) = self.selected_key() {
                    self.controller.toggle_reveal(&key);
                }
            }
            KeyCode::Char('a') => self.controller.reveal_all(),
            KeyCode::Char('A') => self.controller.conceal_all(),
            KeyCode::Char('l') => {
                if let Some(key) = self.selected_key() {
                    let result = self.controller.toggle_unlearned(&key);
                    self.report(result);
                }
            }
            KeyCode::Char(' ') => {
                if let Some(key) = self.selected_key() {
                    self.controller.play(&key);
                    self.flush_notices();
                }
            }
            _ => {}
        }
    }

    fn begin_edit_selected(&mut self) {
        if self.controller.grid().is_pending() {
            self.ui_state
                .set_message("Still saving the previous edit", MessageType::Warning);
            return;
        }
        if !self.controller.grid_mut().begin_edit_selected() {
            let concealed = self
                .controller
                .grid()
                .rows()
                .get(self.controller.grid().selected_index())
                .is_some_and(|row| row.concealed);
            if concealed {
                self.ui_state
                    .set_message("Reveal the word first (1)", MessageType::Info);
            }
        }
    }

    fn handle_list_nav(key: &KeyEvent, list_len: usize, index: &mut usize) -> bool {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if list_len > 0 {
                    *index = index.saturating_add(1).min(list_len - 1);
                }
                true
            }
            KeyCode::Char('k') | KeyCode::Up => {
                *index = index.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    fn handle_files_keys(&mut self, key: KeyEvent) {
        let mut index = self.ui_state.files_selected_index;
        if Self::handle_list_nav(&key, self.ui_state.files.len(), &mut index) {
            self.ui_state.files_selected_index = index;
            return;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.ui_state.open_window(WindowType::Table),
            KeyCode::Char('i') => self.ui_state.open_window(WindowType::ImportPrompt),
            KeyCode::Enter => {
                let Some(name) = self.ui_state.files.get(index).map(|f| f.filename.clone()) else {
                    return;
                };
                let result = self.controller.select_file(&name);
                self.report(result);
                self.ui_state.open_window(WindowType::Table);
            }
            _ => {}
        }
    }

    fn handle_import_keys(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.ui_state.open_window(WindowType::Table),
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.ui_state.import_input);
                self.ui_state.open_window(WindowType::Table);
                if !input.trim().is_empty() {
                    self.start_import(&input);
                }
            }
            KeyCode::Backspace => {
                self.ui_state.import_input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.ui_state.import_input.push(c);
            }
            _ => {}
        }
    }

    fn handle_help_keys(&mut self, key: KeyEvent) {
        let (term_width, term_height) = crossterm::terminal::size().unwrap_or((80, 24));
        let max_offset = HelpWindow::max_scroll_offset(Rect::new(0, 0, term_width, term_height));

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter | KeyCode::Char('?') => {
                self.ui_state.open_window(WindowType::Table);
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.ui_state.help_scroll_offset =
                    self.ui_state.help_scroll_offset.saturating_add(1).min(max_offset);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.ui_state.help_scroll_offset = self.ui_state.help_scroll_offset.saturating_sub(1);
            }
            _ => {}
        }
    }

    // ---------------- mouse ----------------

    pub fn handle_mouse_event(&mut self, mouse: MouseEvent) {
        if self.ui_state.active_window != WindowType::Table {
            return;
        }
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => self.click(mouse.column, mouse.row),
            MouseEventKind::ScrollDown if !self.controller.grid().is_editing() => {
                self.controller.grid_mut().select_next()
            }
            MouseEventKind::ScrollUp if !self.controller.grid().is_editing() => {
                self.controller.grid_mut().select_prev()
            }
            _ => {}
        }
    }

    fn click(&mut self, x: u16, y: u16) {
        let hit = self
            .table_layout
            .hit_test(x, y)
            .filter(|(row, _)| *row < self.controller.grid().rows().len());

        // Clicking anywhere but the open editor confirms it.
        if let Some(session) = self.controller.grid().session() {
            let grid = self.controller.grid();
            let on_editor = hit.is_some_and(|(row, col)| {
                grid.rows()[row].id == session.row_id
                    && grid.column_index(&session.column) == Some(col)
            });
            if on_editor {
                return;
            }
            self.start_commit();
        }

        let Some((row, col)) = hit else {
            self.last_click = None;
            return;
        };

        let now = Instant::now();
        let double = self
            .last_click
            .is_some_and(|(at, r, c)| r == row && c == col && now.duration_since(at) <= DOUBLE_CLICK);
        self.last_click = if double { None } else { Some((now, row, col)) };

        self.controller.grid_mut().select(row);
        let Some(column) = self.controller.grid().columns().get(col).cloned() else {
            return;
        };
        let Some(key) = self.selected_key() else {
            return;
        };

        match column.as_str() {
            COLUMN_SOUND => {
                self.controller.play(&key);
                self.flush_notices();
            }
            COLUMN_STATUS => {
                let result = self.controller.toggle_unlearned(&key);
                self.report(result);
            }
            _ if double => {
                if self.controller.grid().is_pending() {
                    self.ui_state
                        .set_message("Still saving the previous edit", MessageType::Warning);
                } else if !self.controller.grid_mut().begin_edit_at(row, col)
                    && self.controller.grid().is_editable(&column)
                {
                    self.ui_state
                        .set_message("Reveal the word first (1)", MessageType::Info);
                }
            }
            _ => {}
        }
    }

    // ---------------- rendering ----------------

    fn render_static(
        frame: &mut Frame,
        ui_state: &UiState,
        controller: &Controller,
        previous_offset: usize,
    ) -> TableLayout {
        let importing = ui_state.import_progress.is_some();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(if importing { 1 } else { 0 }),
            Constraint::Length(1),
        ])
        .split(frame.area());

        let file = controller.current_file().unwrap_or("no file");
        let page = format!("Page {}", controller.pagination().label());
        let header = build_header_line(&format!("vocab: {}", file), Some(&page), chunks[0].width);
        frame.render_widget(
            Paragraph::new(header).style(Style::default().fg(Color::Cyan)),
            chunks[0],
        );

        let title = format!(" {} words ", controller.pagination().total);
        let layout = TableView::render(frame, chunks[1], controller.grid(), &title, previous_offset);

        if let Some((name, progress)) = &ui_state.import_progress {
            let ratio = if progress.total == 0 {
                0.0
            } else {
                progress.processed as f64 / progress.total as f64
            };
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(Color::Green))
                .ratio(ratio.clamp(0.0, 1.0))
                .label(format!(
                    "Importing {}: {} / {}",
                    name, progress.processed, progress.total
                ));
            frame.render_widget(gauge, chunks[2]);
        }

        let footer = match controller.grid().state() {
            EditState::Editing(_) => "Enter save | Esc cancel",
            EditState::Pending(_) => "Saving...",
            EditState::Idle => "? help | f files | i import | 1 reveal | space play | q quit",
        };
        frame.render_widget(
            Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
            chunks[3],
        );

        match ui_state.active_window {
            WindowType::Help => HelpWindow::render(frame, frame.area(), ui_state.help_scroll_offset),
            WindowType::Files => FilesWindow::render(
                frame,
                frame.area(),
                &ui_state.files,
                ui_state.files_selected_index,
                controller.current_file(),
            ),
            WindowType::ImportPrompt => ImportWindow::render(frame, frame.area(), &ui_state.import_input),
            WindowType::Table => {}
        }

        if let (Some(message), Some(message_type)) = (&ui_state.message, ui_state.message_type) {
            render_message_static(frame, message, message_type);
        }

        layout
    }
}

fn render_message_static(frame: &mut Frame, message: &str, message_type: MessageType) {
    let color = match message_type {
        MessageType::Info => Color::Blue,
        MessageType::Warning => Color::Yellow,
        MessageType::Error => Color::Red,
    };

    let message_paragraph = Paragraph::new(message)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });

    let frame_area = frame.area();
    if frame_area.width < 5 || frame_area.height < 5 {
        return;
    }
    let area = Rect {
        x: frame_area.x + 2,
        y: frame_area.y + 2,
        width: frame_area.width - 4,
        height: 3,
    };

    frame.render_widget(Clear, area);
    frame.render_widget(message_paragraph, area);
}

/// Title on the left, `right_text` flush right, padded to `width` columns.
fn build_header_line(title: &str, right_text: Option<&str>, width: u16) -> String {
    let width = width as usize;
    let right: Vec<char> = right_text.unwrap_or("").chars().collect();
    let room = width.saturating_sub(right.len() + 1);

    let mut line: Vec<char> = title.chars().take(room).collect();
    line.resize(width.saturating_sub(right.len()), ' ');
    line.extend(right.iter().take(width - line.len()));
    line.into_iter().collect()
}

fn expand_home(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Playback;
    use crate::models::{COLUMN_TRANS, COLUMN_WORD};
    use crate::speech::{SilentSynthesizer, SpeechSynthesizer};
    use crate::store::Store;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct MutePlayer;

    impl Playback for MutePlayer {
        fn play(&self, _audio: &[u8], _format: &str, _wait: bool) -> eyre::Result<()> {
            Ok(())
        }
    }

    fn setup() -> (App, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("words.db")).unwrap();
        let synth: Arc<dyn SpeechSynthesizer> = Arc::new(SilentSynthesizer);
        let importer = Importer::new(store.clone(), synth.clone());

        let list = temp_dir.path().join("animals.tsv");
        fs::write(&list, "cat\t猫\tkæt\ndog\t狗\n").unwrap();
        importer.run(&list, |_| {}).unwrap();

        let controller = Controller::new(Arc::new(store), synth, Arc::new(MutePlayer), 30);
        let mut app = App::new(controller, importer, true);
        app.open_file(None).unwrap();
        (app, temp_dir)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn wait_for_workers(app: &mut App) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while app.is_busy() && Instant::now() < deadline {
            app.poll_workers();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!app.is_busy(), "workers did not finish");
    }

    #[test]
    fn test_opens_latest_file() {
        let (app, _dir) = setup();
        assert_eq!(app.controller().current_file(), Some("animals.tsv"));
        assert_eq!(app.controller().grid().rows().len(), 2);
    }

    #[test]
    fn test_concealed_row_refuses_edit() {
        let (mut app, _dir) = setup();
        press(&mut app, KeyCode::Char('e'));
        assert!(!app.controller().grid().is_editing());
        assert!(app.ui_state().message.is_some());
    }

    #[test]
    fn test_keyboard_edit_commits_in_background() {
        let (mut app, _dir) = setup();
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('e'));
        assert!(app.controller().grid().is_editing());
        type_text(&mut app, "s");
        press(&mut app, KeyCode::Enter);
        wait_for_workers(&mut app);

        let key = app.controller().grid().rows()[0].id.clone();
        assert_eq!(app.controller().grid().value(&key, COLUMN_WORD), Some("cats"));
        assert_eq!(app.controller().cache().get(&key).unwrap().word, "cats");
    }

    #[test]
    fn test_escape_cancels_edit() {
        let (mut app, _dir) = setup();
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Esc);

        assert!(!app.controller().grid().is_editing());
        assert!(!app.is_busy());
        let key = app.controller().grid().rows()[0].id.clone();
        assert_eq!(app.controller().grid().value(&key, COLUMN_TRANS), Some("猫"));
    }

    #[test]
    fn test_import_prompt_runs_import() {
        let (mut app, dir) = setup();
        let list = dir.path().join("birds.tsv");
        fs::write(&list, "owl\t猫头鹰\n").unwrap();

        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.ui_state().active_window, WindowType::ImportPrompt);
        type_text(&mut app, &list.to_string_lossy());
        press(&mut app, KeyCode::Enter);
        wait_for_workers(&mut app);

        assert_eq!(app.controller().current_file(), Some("birds.tsv"));
        assert_eq!(app.controller().grid().rows().len(), 1);
    }

    #[test]
    fn test_finished_import_saves_open_edit() {
        let (mut app, dir) = setup();
        let list = dir.path().join("birds.tsv");
        fs::write(&list, "owl\t猫头鹰\n").unwrap();

        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('e'));
        type_text(&mut app, "s");
        app.start_import(&list.to_string_lossy());
        wait_for_workers(&mut app);

        assert!(!app.controller().grid().is_editing());
        assert_eq!(app.controller().current_file(), Some("birds.tsv"));
        assert!(app.ui_state().message.as_deref().unwrap().contains("birds.tsv"));

        assert!(app.controller.select_file("animals.tsv").unwrap());
        let key = app.controller().grid().rows()[0].id.clone();
        assert_eq!(app.controller().grid().value(&key, COLUMN_WORD), Some("cats"));
    }

    #[test]
    fn test_files_window_switches_file() {
        let (mut app, dir) = setup();
        let list = dir.path().join("birds.tsv");
        fs::write(&list, "owl\t猫头鹰\n").unwrap();
        app.importer.run(&list, |_| {}).unwrap();

        press(&mut app, KeyCode::Char('f'));
        assert_eq!(app.ui_state().files.len(), 2);
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.ui_state().active_window, WindowType::Table);
        assert_eq!(app.controller().current_file(), Some("birds.tsv"));
    }

    #[test]
    fn test_double_click_opens_editor_and_outside_click_saves() {
        let (mut app, _dir) = setup();
        app.table_layout = TableLayout {
            body: Rect::new(1, 2, 60, 10),
            widths: vec![10, 10, 10, 6, 10],
            offset: 0,
        };
        press(&mut app, KeyCode::Char('a'));

        let click = |app: &mut App, x, y| {
            app.handle_mouse_event(MouseEvent {
                kind: MouseEventKind::Down(MouseButton::Left),
                column: x,
                row: y,
                modifiers: KeyModifiers::NONE,
            })
        };

        click(&mut app, 13, 3);
        assert!(!app.controller().grid().is_editing());
        click(&mut app, 13, 3);
        assert!(app.controller().grid().is_editing());

        type_text(&mut app, "狗");
        click(&mut app, 40, 10);
        wait_for_workers(&mut app);

        let key = app.controller().grid().rows()[1].id.clone();
        assert_eq!(app.controller().grid().value(&key, COLUMN_TRANS), Some("狗狗"));
    }

    #[test]
    fn test_header_line_layout() {
        assert_eq!(build_header_line("vocab", Some("1 / 2"), 14), "vocab    1 / 2");
        assert_eq!(build_header_line("a long title", Some("1 / 2"), 10), "a lo 1 / 2");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/a.tsv"), PathBuf::from("/tmp/a.tsv"));
    }
}
