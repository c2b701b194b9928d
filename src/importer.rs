use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use crate::error::StoreError;
use crate::logging;
use crate::models::{Entry, ImportOutcome, ImportProgress, ImportSummary};
use crate::speech::SpeechSynthesizer;
use crate::store::Store;

/// Entries written per transaction.
pub const BATCH_SIZE: usize = 5;

/// Parse one `word<TAB>translation[<TAB>ipa]` line.
pub fn parse_line(line: &str) -> Option<Entry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut fields = line.split('\t');
    let word = fields.next()?.trim();
    let trans = fields.next()?.trim();
    let ipa = fields
        .next()
        .map(str::trim)
        .filter(|ipa| !ipa.is_empty())
        .map(str::to_string);
    Some(Entry {
        word: word.to_string(),
        trans: trans.to_string(),
        ipa,
    })
}

pub fn read_entries(path: &Path) -> Result<Vec<Entry>, StoreError> {
    let content = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.lines().filter_map(parse_line).collect())
}

/// Files are identified by base name, so the same list imported from two
/// directories counts as one file.
pub fn import_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[derive(Clone)]
pub struct Importer {
    store: Store,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Importer {
    pub fn new(store: Store, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { store, synthesizer }
    }

    /// Import a word list. `on_progress` is called after every batch.
    pub fn run(
        &self,
        path: &Path,
        mut on_progress: impl FnMut(ImportProgress),
    ) -> Result<ImportOutcome, StoreError> {
        let filename = import_name(path);
        if self.store.file_exists(&filename)? {
            logging::info(format!("{} already imported, skipping", filename));
            return Ok(ImportOutcome::AlreadyImported(filename));
        }

        let entries = read_entries(path)?;
        let total = entries.len();
        logging::info(format!("importing {} entries from {}", total, filename));

        let mut summary = ImportSummary {
            filename: filename.clone(),
            entries: total,
            ..Default::default()
        };
        let mut file_id: Option<i64> = None;
        let mut word_ids: HashMap<(String, String), i64> = HashMap::new();

        let batches: Vec<&[Entry]> = if entries.is_empty() {
            vec![&entries[..]]
        } else {
            entries.chunks(BATCH_SIZE).collect()
        };

        let mut processed = 0;
        for batch in batches {
            let fresh = self.resolve_batch(batch, &mut word_ids, &mut summary)?;

            let (id, displays) = self.store.session(|tx| {
                let id = match file_id {
                    Some(id) => id,
                    None => Store::insert_file(tx, &filename)?,
                };
                for (entry, audio) in &fresh {
                    let word_id = Store::insert_word(tx, entry, audio)?;
                    word_ids.insert(entry.lookup_key(), word_id);
                }
                let mut displays = 0;
                for entry in batch {
                    let key = entry.lookup_key();
                    let word_id = word_ids.get(&key).copied().ok_or_else(|| {
                        StoreError::NotFound {
                            what: "word",
                            key: entry.word.clone(),
                        }
                    })?;
                    if Store::insert_display(tx, id, word_id)? {
                        displays += 1;
                    }
                }
                Ok((id, displays))
            })?;

            file_id = Some(id);
            summary.file_id = id;
            summary.new_words += fresh.len();
            summary.displays += displays;
            processed += batch.len();
            on_progress(ImportProgress { processed, total });
        }

        logging::info(format!(
            "imported {}: {} entries, {} new words, {} reused",
            summary.filename, summary.entries, summary.new_words, summary.reused_words
        ));
        Ok(ImportOutcome::Imported(summary))
    }

    /// Look up every word of a batch and synthesize audio for the ones that
    /// are new. Runs outside any write transaction.
    fn resolve_batch(
        &self,
        batch: &[Entry],
        word_ids: &mut HashMap<(String, String), i64>,
        summary: &mut ImportSummary,
    ) -> Result<Vec<(Entry, Vec<u8>)>, StoreError> {
        let mut fresh = Vec::new();
        let mut seen = HashSet::new();
        for entry in batch {
            let key = entry.lookup_key();
            if word_ids.contains_key(&key) || seen.contains(&key) {
                continue;
            }
            if let Some(id) = self
                .store
                .session(|tx| Store::find_word(tx, &key.0, &key.1))?
            {
                word_ids.insert(key, id);
                summary.reused_words += 1;
                continue;
            }

            let audio = self.synthesizer.synthesize(&entry.word);
            if audio.is_empty() {
                logging::warn(format!("no audio for '{}'", entry.word));
            }
            seen.insert(key);
            fresh.push((entry.clone(), audio));
        }
        Ok(fresh)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportEvent {
    Progress(ImportProgress),
    Finished(ImportOutcome),
    Failed(String),
}

/// Run an import on a background thread. The receiver yields progress
/// events followed by exactly one `Finished` or `Failed`.
pub fn spawn_import(importer: Importer, path: PathBuf) -> Receiver<ImportEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = importer.run(&path, |progress| {
            let _ = progress_tx.send(ImportEvent::Progress(progress));
        });
        let event = match result {
            Ok(outcome) => ImportEvent::Finished(outcome),
            Err(err) => {
                logging::error(format!("import of {} failed: {}", path.display(), err));
                ImportEvent::Failed(err.to_string())
            }
        };
        let _ = tx.send(event);
    });
    rx
}
