use std::collections::HashSet;
use std::sync::Arc;

use crate::audio::Playback;
use crate::cache::{DisplayCache, Pagination};
use crate::error::{CommitError, CommitResult, StoreError};
use crate::grid::{CellEdit, Confirm, EditableGrid, GridRow};
use crate::logging;
use crate::models::{
    COLUMN_IPA, COLUMN_SOUND, COLUMN_STATUS, COLUMN_TRANS, COLUMN_WORD, COLUMNS, EDITABLE_COLUMNS,
    FileRecord, MessageType, Notice, StagedChange, WordField, WordRow,
};
use crate::speech::SpeechSynthesizer;
use crate::store::WordRepository;

pub const SOUND_MARKER: &str = "▶";
pub const NO_SOUND_MARKER: &str = "-";

/// Result of the synchronous half of a commit.
pub enum PreparedCommit {
    /// Settled without touching storage (stale row or unchanged value).
    Resolved(CommitResult),
    /// Needs a storage round trip.
    Persist(CommitJob),
}

/// The storage half of a commit. Owns everything it needs so it can run on
/// a worker thread while the grid waits in its pending state.
pub struct CommitJob {
    pub key: String,
    working: WordRow,
    field: WordField,
    repo: Arc<dyn WordRepository>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl CommitJob {
    pub fn run(self) -> CommitResult {
        self.repo
            .update_field(&self.working, self.field, self.synthesizer.as_ref())
            .map_err(CommitError::from)
    }
}

/// Connects the table to storage: pagination, the page cache, the edit
/// commit pipeline, and the learned/reveal toggles.
pub struct Controller {
    repo: Arc<dyn WordRepository>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn Playback>,
    audio_format: String,
    cache: DisplayCache,
    pagination: Pagination,
    file: Option<(i64, String)>,
    revealed: HashSet<String>,
    grid: EditableGrid,
    notices: Vec<Notice>,
}

impl Controller {
    pub fn new(
        repo: Arc<dyn WordRepository>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn Playback>,
        page_size: usize,
    ) -> Self {
        Self {
            repo,
            synthesizer,
            player,
            audio_format: "mp3".to_string(),
            cache: DisplayCache::new(),
            pagination: Pagination::new(page_size),
            file: None,
            revealed: HashSet::new(),
            grid: EditableGrid::new(COLUMNS, EDITABLE_COLUMNS),
            notices: Vec::new(),
        }
    }

    pub fn with_audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into();
        self
    }

    pub fn cache(&self) -> &DisplayCache {
        &self.cache
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn grid(&self) -> &EditableGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut EditableGrid {
        &mut self.grid
    }

    pub fn current_file(&self) -> Option<&str> {
        self.file.as_ref().map(|(_, name)| name.as_str())
    }

    pub fn is_revealed(&self, key: &str) -> bool {
        self.revealed.contains(key)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, kind: MessageType, text: impl Into<String>) {
        let text = text.into();
        match kind {
            MessageType::Error => logging::error(&text),
            MessageType::Warning => logging::warn(&text),
            MessageType::Info => logging::info(&text),
        }
        self.notices.push(Notice { text, kind });
    }

    // ---------------- files & pages ----------------

    pub fn files(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.repo.list_files()
    }

    /// Switch to a file by name and show its first page. Returns `false`
    /// when no such file was imported. On a storage error the previous file
    /// stays selected.
    pub fn select_file(&mut self, filename: &str) -> Result<bool, StoreError> {
        let Some(id) = self.repo.file_id(filename)? else {
            self.notify(MessageType::Warning, format!("No imported file named '{}'", filename));
            return Ok(false);
        };
        let mut first = self.pagination;
        first.reset();
        let (pagination, rows) = self.load_page(id, first)?;
        self.file = Some((id, filename.to_string()));
        self.install_page(pagination, rows);
        Ok(true)
    }

    /// Reload the current page from storage and replace the cache.
    pub fn refresh_page(&mut self) -> Result<(), StoreError> {
        let Some((file_id, _)) = self.file else {
            self.cache.clear();
            self.pagination.reset();
            self.sync_grid();
            return Ok(());
        };
        let (pagination, rows) = self.load_page(file_id, self.pagination)?;
        self.install_page(pagination, rows);
        Ok(())
    }

    pub fn next_page(&mut self) -> Result<bool, StoreError> {
        self.turn_page(Pagination::next)
    }

    pub fn prev_page(&mut self) -> Result<bool, StoreError> {
        self.turn_page(Pagination::prev)
    }

    fn turn_page(&mut self, step: fn(&mut Pagination) -> bool) -> Result<bool, StoreError> {
        let Some((file_id, _)) = self.file else {
            return Ok(false);
        };
        let mut target = self.pagination;
        if !step(&mut target) {
            return Ok(false);
        }
        let (pagination, rows) = self.load_page(file_id, target)?;
        self.install_page(pagination, rows);
        Ok(true)
    }

    /// Count and fetch one page without touching the controller's state.
    fn load_page(
        &self,
        file_id: i64,
        mut pagination: Pagination,
    ) -> Result<(Pagination, Vec<WordRow>), StoreError> {
        let total = self.repo.count_displays(file_id)?;
        pagination.set_total(total);
        let rows = self
            .repo
            .page(file_id, pagination.page_size, pagination.offset())?;
        logging::debug(format!(
            "page {} of file {}: {} rows",
            pagination.label(),
            file_id,
            rows.len()
        ));
        Ok((pagination, rows))
    }

    fn install_page(&mut self, pagination: Pagination, rows: Vec<WordRow>) {
        self.pagination = pagination;
        self.cache.replace_page(rows);
        self.revealed.clear();
        self.sync_grid();
    }

    // ---------------- grid rows ----------------

    pub fn grid_row(&self, row: &WordRow) -> GridRow {
        let cells = self
            .grid
            .columns()
            .iter()
            .map(|column| match column.as_str() {
                COLUMN_WORD => row.word.clone(),
                COLUMN_TRANS => row.trans.clone(),
                COLUMN_IPA => row.ipa.clone().unwrap_or_default(),
                COLUMN_SOUND if row.has_audio() => SOUND_MARKER.to_string(),
                COLUMN_SOUND => NO_SOUND_MARKER.to_string(),
                COLUMN_STATUS => row.status_label().to_string(),
                _ => String::new(),
            })
            .collect();
        GridRow {
            id: row.key.clone(),
            cells,
            concealed: !self.revealed.contains(&row.key),
        }
    }

    fn sync_grid(&mut self) {
        let rows = self.cache.rows().map(|r| self.grid_row(r)).collect();
        self.grid.set_rows(rows);
    }

    fn sync_grid_row(&mut self, key: &str) {
        if let Some(row) = self.cache.get(key) {
            let grid_row = self.grid_row(row);
            self.grid.update_row(grid_row);
        }
    }

    // ---------------- commit pipeline ----------------

    /// Turn a grid edit into a staged change on a word field.
    pub fn stage(&self, edit: &CellEdit) -> Result<StagedChange, CommitError> {
        let field: WordField = edit.column.parse().map_err(CommitError::Invalid)?;
        Ok(StagedChange {
            key: edit.row_id.clone(),
            field,
            original: edit.original.clone(),
            proposed: edit.proposed.clone(),
        })
    }

    /// Validate a change against the cache and build the working copy.
    /// The cache itself is not touched.
    pub fn prepare_commit(&mut self, change: StagedChange) -> PreparedCommit {
        let Some(cached) = self.cache.get(&change.key) else {
            return PreparedCommit::Resolved(Err(CommitError::Stale));
        };
        if cached.field(change.field) == change.proposed {
            return PreparedCommit::Resolved(Ok(cached.clone()));
        }

        let working = cached.with_field(change.field, &change.proposed);
        PreparedCommit::Persist(CommitJob {
            key: change.key,
            working,
            field: change.field,
            repo: Arc::clone(&self.repo),
            synthesizer: Arc::clone(&self.synthesizer),
        })
    }

    /// Apply a persistence result to the cache: a confirmed row replaces the
    /// cached one wholesale; a failure leaves the cache as it was.
    pub fn finish_commit(&mut self, key: &str, result: CommitResult) -> CommitResult {
        match result {
            Ok(row) => {
                if !self.cache.replace(row.clone()) {
                    logging::debug(format!("committed row {} is no longer on this page", key));
                }
                Ok(row)
            }
            Err(err) => {
                let kind = if err.is_rejection() {
                    MessageType::Warning
                } else {
                    MessageType::Error
                };
                self.notify(kind, format!("Edit not saved: {}", err));
                Err(err)
            }
        }
    }

    /// Run the full commit pipeline synchronously.
    pub fn commit(&mut self, change: StagedChange) -> CommitResult {
        let key = change.key.clone();
        let result = match self.prepare_commit(change) {
            PreparedCommit::Resolved(result) => result,
            PreparedCommit::Persist(job) => job.run(),
        };
        self.finish_commit(&key, result)
    }

    /// Confirm the grid's open editor. Returns a job when storage has to be
    /// consulted; the grid then stays pending until [`settle`](Self::settle).
    pub fn confirm_edit(&mut self) -> Option<CommitJob> {
        let edit = match self.grid.confirm() {
            Confirm::NotEditing | Confirm::Unchanged => return None,
            Confirm::Submit(edit) => edit,
        };
        let change = match self.stage(&edit) {
            Ok(change) => change,
            Err(err) => {
                self.settle(&edit.row_id, Err(err));
                return None;
            }
        };
        match self.prepare_commit(change) {
            PreparedCommit::Resolved(result) => {
                self.settle(&edit.row_id, result);
                None
            }
            PreparedCommit::Persist(job) => Some(job),
        }
    }

    /// Finish a commit started by [`confirm_edit`](Self::confirm_edit):
    /// update the cache, then show the new value or roll the cell back.
    pub fn settle(&mut self, key: &str, result: CommitResult) -> CommitResult {
        let result = self.finish_commit(key, result);
        self.grid.resolve(result.is_ok());
        self.sync_grid_row(key);
        result
    }

    /// Confirm and persist the open editor on the calling thread.
    pub fn commit_open_edit(&mut self) -> Option<CommitResult> {
        let job = self.confirm_edit()?;
        let key = job.key.clone();
        let result = job.run();
        Some(self.settle(&key, result))
    }

    // ---------------- row actions ----------------

    /// Flip the learned flag of a cached row. Returns the new
    /// `is_unlearned` value.
    pub fn toggle_unlearned(&mut self, key: &str) -> Result<bool, CommitError> {
        if self.cache.get(key).is_none() {
            return Err(CommitError::Stale);
        }
        match self.repo.toggle_unlearned(key) {
            Ok(row) => {
                let unlearned = row.is_unlearned;
                self.cache.replace(row);
                self.sync_grid_row(key);
                Ok(unlearned)
            }
            Err(err) => {
                let err = CommitError::from(err);
                self.notify(MessageType::Error, format!("Status not saved: {}", err));
                Err(err)
            }
        }
    }

    /// Show or hide one row's text. Returns whether the row is now revealed.
    pub fn toggle_reveal(&mut self, key: &str) -> bool {
        if self.cache.get(key).is_none() {
            return false;
        }
        let revealed = if self.revealed.remove(key) {
            false
        } else {
            self.revealed.insert(key.to_string());
            true
        };
        self.sync_grid_row(key);
        revealed
    }

    pub fn reveal_all(&mut self) {
        self.revealed = self.cache.keys().iter().cloned().collect();
        self.sync_grid();
    }

    pub fn conceal_all(&mut self) {
        self.revealed.clear();
        self.sync_grid();
    }

    /// Play the cached audio of a row. Returns whether playback started.
    pub fn play(&mut self, key: &str) -> bool {
        let Some(row) = self.cache.get(key) else {
            return false;
        };
        let Some(audio) = row.audio.as_deref().filter(|a| !a.is_empty()) else {
            let word = row.word.clone();
            self.notify(MessageType::Info, format!("No audio for '{}'", word));
            return false;
        };
        match self.player.play(audio, &self.audio_format, false) {
            Ok(()) => true,
            Err(err) => {
                self.notify(MessageType::Error, format!("Playback failed: {}", err));
                false
            }
        }
    }
}
