use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, params};

use crate::error::StoreError;
use crate::logging;
use crate::models::{Entry, FileRecord, WordField, WordRow, display_key};
use crate::speech::SpeechSynthesizer;

pub type StoreResult<T> = Result<T, StoreError>;

const ROW_SELECT: &str = "
    SELECT d.id, d.iid, d.word_id, d.file_id, w.word, w.trans, w.ipa, w.audio, w.is_unlearned
    FROM display d
    JOIN words w ON w.id = d.word_id";

/// Persistence collaborator used by the controller.
pub trait WordRepository: Send + Sync {
    fn list_files(&self) -> StoreResult<Vec<FileRecord>>;
    fn file_id(&self, filename: &str) -> StoreResult<Option<i64>>;
    fn count_displays(&self, file_id: i64) -> StoreResult<usize>;
    fn page(&self, file_id: i64, page_size: usize, offset: usize) -> StoreResult<Vec<WordRow>>;
    /// Persist `field` of `row` and return the reloaded row. Editing the word
    /// text regenerates its audio in the same call.
    fn update_field(
        &self,
        row: &WordRow,
        field: WordField,
        synthesizer: &dyn SpeechSynthesizer,
    ) -> StoreResult<WordRow>;
    fn toggle_unlearned(&self, key: &str) -> StoreResult<WordRow>;
}

/// SQLite-backed store. Holds only the database path; every logical
/// operation opens its own connection and commits or rolls back on return.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let store = Self { path };
        let conn = store.connect()?;
        Self::init_db(&conn)?;
        Ok(store)
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_db(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL UNIQUE,
                imported_at DATETIME DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS words (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                word TEXT NOT NULL,
                word_lower TEXT NOT NULL,
                trans TEXT NOT NULL,
                ipa TEXT,
                audio BLOB,
                is_unlearned INTEGER NOT NULL DEFAULT 1,
                UNIQUE (word_lower, trans)
            );

            CREATE INDEX IF NOT EXISTS ix_words_word_lower ON words (word_lower);

            CREATE TABLE IF NOT EXISTS display (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                iid TEXT NOT NULL UNIQUE,
                word_id INTEGER NOT NULL REFERENCES words(id) ON DELETE CASCADE,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS ix_display_file_id ON display (file_id);
            ",
        )?;
        Ok(())
    }

    /// Run `f` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub fn session<T>(&self, f: impl FnOnce(&Transaction) -> StoreResult<T>) -> StoreResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn file_exists(&self, filename: &str) -> StoreResult<bool> {
        Ok(self.file_id(filename)?.is_some())
    }

    pub fn get_or_create_file(&self, filename: &str) -> StoreResult<i64> {
        self.session(|tx| Self::insert_file(tx, filename))
    }

    pub fn get_or_create_word(
        &self,
        entry: &Entry,
        synthesizer: &dyn SpeechSynthesizer,
    ) -> StoreResult<i64> {
        let (lower, trans) = entry.lookup_key();
        if let Some(id) = self.session(|tx| Self::find_word(tx, &lower, &trans))? {
            return Ok(id);
        }
        let audio = synthesizer.synthesize(&entry.word);
        self.session(|tx| Self::insert_word(tx, entry, &audio))
    }

    pub fn row(&self, key: &str) -> StoreResult<WordRow> {
        self.session(|tx| Self::load_row(tx, key))
    }

    /// Every row of a file in display order.
    pub fn rows_for_file(&self, file_id: i64) -> StoreResult<Vec<WordRow>> {
        let count = self.count_displays(file_id)?;
        self.page(file_id, count.max(1), 0)
    }

    pub fn word_count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn display_count(&self) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM display", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn delete_file(&self, filename: &str) -> StoreResult<()> {
        self.session(|tx| {
            tx.execute("DELETE FROM files WHERE filename = ?", params![filename])?;
            Ok(())
        })
    }

    pub(crate) fn insert_file(conn: &Connection, filename: &str) -> StoreResult<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO files (filename) VALUES (?)",
            params![filename],
        )?;
        let id = conn.query_row(
            "SELECT id FROM files WHERE filename = ?",
            params![filename],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub(crate) fn find_word(conn: &Connection, lower: &str, trans: &str) -> StoreResult<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT id FROM words WHERE word_lower = ? AND trans = ?",
                params![lower, trans],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert a word unless its (lowercase, translation) pair exists, and
    /// return the id of the stored word either way.
    pub(crate) fn insert_word(conn: &Connection, entry: &Entry, audio: &[u8]) -> StoreResult<i64> {
        let (lower, trans) = entry.lookup_key();
        let audio = (!audio.is_empty()).then_some(audio);
        conn.execute(
            "INSERT OR IGNORE INTO words (word, word_lower, trans, ipa, audio) VALUES (?, ?, ?, ?, ?)",
            params![entry.word, lower, trans, entry.ipa, audio],
        )?;
        Self::find_word(conn, &lower, &trans)?.ok_or(StoreError::NotFound {
            what: "word",
            key: entry.word.clone(),
        })
    }

    /// Returns whether a new display row was created.
    pub(crate) fn insert_display(conn: &Connection, file_id: i64, word_id: i64) -> StoreResult<bool> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO display (iid, word_id, file_id) VALUES (?, ?, ?)",
            params![display_key(file_id, word_id), word_id, file_id],
        )?;
        Ok(changed > 0)
    }

    fn load_row(conn: &Connection, key: &str) -> StoreResult<WordRow> {
        conn.query_row(&format!("{ROW_SELECT} WHERE d.iid = ?"), params![key], map_row)
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                what: "display",
                key: key.to_string(),
            })
    }
}

fn map_row(row: &Row) -> rusqlite::Result<WordRow> {
    Ok(WordRow {
        display_id: row.get(0)?,
        key: row.get(1)?,
        word_id: row.get(2)?,
        file_id: row.get(3)?,
        word: row.get(4)?,
        trans: row.get(5)?,
        ipa: row.get(6)?,
        audio: row.get(7)?,
        is_unlearned: row.get(8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Trim the edited field the way import trims every column, then reject
/// empty words and translations. An empty phonetic becomes NULL.
fn normalize(row: &WordRow, field: WordField) -> StoreResult<WordRow> {
    let mut row = row.clone();
    match field {
        WordField::Word => {
            row.word = row.word.trim().to_string();
            if row.word.is_empty() {
                return Err(StoreError::Invalid("word cannot be empty".to_string()));
            }
        }
        WordField::Translation => {
            row.trans = row.trans.trim().to_string();
            if row.trans.is_empty() {
                return Err(StoreError::Invalid("translation cannot be empty".to_string()));
            }
        }
        WordField::Phonetic => {
            row.ipa = row
                .ipa
                .as_deref()
                .map(str::trim)
                .filter(|ipa| !ipa.is_empty())
                .map(str::to_string);
        }
    }
    Ok(row)
}

impl WordRepository for Store {
    fn list_files(&self) -> StoreResult<Vec<FileRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, filename, imported_at FROM files ORDER BY id")?;
        let files = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    imported_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    fn file_id(&self, filename: &str) -> StoreResult<Option<i64>> {
        let conn = self.connect()?;
        let id = conn
            .query_row(
                "SELECT id FROM files WHERE filename = ?",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn count_displays(&self, file_id: i64) -> StoreResult<usize> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM display WHERE file_id = ?",
            params![file_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn page(&self, file_id: i64, page_size: usize, offset: usize) -> StoreResult<Vec<WordRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{ROW_SELECT} WHERE d.file_id = ? ORDER BY d.id LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
            .query_map(params![file_id, page_size as i64, offset as i64], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn update_field(
        &self,
        row: &WordRow,
        field: WordField,
        synthesizer: &dyn SpeechSynthesizer,
    ) -> StoreResult<WordRow> {
        let row = &normalize(row, field)?;

        // Synthesize before opening the transaction so the write lock is not
        // held across a network call.
        let audio = match field {
            WordField::Word => {
                let bytes = synthesizer.synthesize(&row.word);
                if bytes.is_empty() {
                    logging::warn(format!("No audio generated for '{}'", row.word));
                }
                Some(bytes)
            }
            _ => None,
        };

        self.session(|tx| {
            let word_id: i64 = tx
                .query_row(
                    "SELECT word_id FROM display WHERE iid = ?",
                    params![row.key],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound {
                    what: "display",
                    key: row.key.clone(),
                })?;

            let result = match field {
                WordField::Word => {
                    let audio = audio.as_deref().filter(|a| !a.is_empty());
                    tx.execute(
                        "UPDATE words SET word = ?, word_lower = ?, audio = ? WHERE id = ?",
                        params![row.word, row.word.to_lowercase(), audio, word_id],
                    )
                }
                WordField::Translation => tx.execute(
                    "UPDATE words SET trans = ? WHERE id = ?",
                    params![row.trans, word_id],
                ),
                WordField::Phonetic => tx.execute(
                    "UPDATE words SET ipa = ? WHERE id = ?",
                    params![row.ipa, word_id],
                ),
            };

            match result {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Err(StoreError::Conflict {
                        word: row.word.clone(),
                        trans: row.trans.clone(),
                    });
                }
                Err(err) => return Err(err.into()),
            }

            Self::load_row(tx, &row.key)
        })
    }

    fn toggle_unlearned(&self, key: &str) -> StoreResult<WordRow> {
        self.session(|tx| {
            let changed = tx.execute(
                "UPDATE words SET is_unlearned = NOT is_unlearned
                 WHERE id = (SELECT word_id FROM display WHERE iid = ?)",
                params![key],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    what: "display",
                    key: key.to_string(),
                });
            }
            Self::load_row(tx, key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{FnSynthesizer, SilentSynthesizer};
    use tempfile::TempDir;

    fn setup_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(temp_dir.path().join("test_words.db")).unwrap();
        (store, temp_dir)
    }

    fn entry(word: &str, trans: &str, ipa: Option<&str>) -> Entry {
        Entry {
            word: word.to_string(),
            trans: trans.to_string(),
            ipa: ipa.map(str::to_string),
        }
    }

    fn seed(store: &Store, filename: &str, entries: &[Entry]) -> i64 {
        let file_id = store.get_or_create_file(filename).unwrap();
        for e in entries {
            let word_id = store.get_or_create_word(e, &SilentSynthesizer).unwrap();
            store
                .session(|tx| Store::insert_display(tx, file_id, word_id))
                .unwrap();
        }
        file_id
    }

    #[test]
    fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("init.db");
        assert!(!db_path.exists());
        let store = Store::open(&db_path).unwrap();
        assert!(db_path.exists());

        let conn = store.connect().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        for table in ["files", "words", "display"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }

        // Reopening an existing database is harmless.
        Store::open(&db_path).unwrap();
    }

    #[test]
    fn test_get_or_create_file_is_idempotent() {
        let (store, _temp_dir) = setup_test_store();
        let a = store.get_or_create_file("list.tsv").unwrap();
        let b = store.get_or_create_file("list.tsv").unwrap();
        assert_eq!(a, b);
        assert!(store.file_exists("list.tsv").unwrap());
        assert!(!store.file_exists("other.tsv").unwrap());
        assert_eq!(store.list_files().unwrap().len(), 1);
    }

    #[test]
    fn test_word_uniqueness_is_case_insensitive() {
        let (store, _temp_dir) = setup_test_store();
        let first = store
            .get_or_create_word(&entry("Cat", "猫", None), &SilentSynthesizer)
            .unwrap();
        let second = store
            .get_or_create_word(&entry("cat", "猫", Some("kæt")), &SilentSynthesizer)
            .unwrap();
        let other = store
            .get_or_create_word(&entry("cat", "貓", None), &SilentSynthesizer)
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(store.word_count().unwrap(), 2);
    }

    #[test]
    fn test_display_is_unique_per_file_and_word() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = store.get_or_create_file("a.tsv").unwrap();
        let word_id = store
            .get_or_create_word(&entry("dog", "狗", None), &SilentSynthesizer)
            .unwrap();
        assert!(store.session(|tx| Store::insert_display(tx, file_id, word_id)).unwrap());
        assert!(!store.session(|tx| Store::insert_display(tx, file_id, word_id)).unwrap());
        assert_eq!(store.display_count().unwrap(), 1);
    }

    #[test]
    fn test_page_is_ordered_and_bounded() {
        let (store, _temp_dir) = setup_test_store();
        let entries: Vec<Entry> = (0..7)
            .map(|i| entry(&format!("w{i}"), &format!("t{i}"), None))
            .collect();
        let file_id = seed(&store, "seven.tsv", &entries);

        assert_eq!(store.count_displays(file_id).unwrap(), 7);
        let first = store.page(file_id, 3, 0).unwrap();
        let last = store.page(file_id, 3, 6).unwrap();
        assert_eq!(
            first.iter().map(|r| r.word.as_str()).collect::<Vec<_>>(),
            vec!["w0", "w1", "w2"]
        );
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].word, "w6");
        assert!(store.page(file_id, 3, 9).unwrap().is_empty());
    }

    #[test]
    fn test_toggle_unlearned_twice_restores_state() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(&store, "a.tsv", &[entry("cat", "猫", None)]);
        let row = store.page(file_id, 10, 0).unwrap().remove(0);
        assert!(row.is_unlearned);

        let once = store.toggle_unlearned(&row.key).unwrap();
        assert!(!once.is_unlearned);
        let twice = store.toggle_unlearned(&row.key).unwrap();
        assert_eq!(twice, row);
    }

    #[test]
    fn test_toggle_unknown_key_is_not_found() {
        let (store, _temp_dir) = setup_test_store();
        let err = store.toggle_unlearned("99_99").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_update_word_regenerates_audio() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(&store, "a.tsv", &[entry("cat", "猫", Some("kæt"))]);
        let row = store.page(file_id, 10, 0).unwrap().remove(0);
        assert_eq!(row.audio, None);

        let voice = FnSynthesizer(|text: &str| format!("mp3:{text}").into_bytes());
        let edited = row.with_field(WordField::Word, "Cats");
        let saved = store.update_field(&edited, WordField::Word, &voice).unwrap();

        assert_eq!(saved.word, "Cats");
        assert_eq!(saved.audio, Some(b"mp3:Cats".to_vec()));
        assert_eq!(saved.ipa.as_deref(), Some("kæt"));

        let conn = store.connect().unwrap();
        let lower: String = conn
            .query_row("SELECT word_lower FROM words WHERE id = ?", params![row.word_id], |r| r.get(0))
            .unwrap();
        assert_eq!(lower, "cats");
    }

    #[test]
    fn test_update_word_with_failed_synthesis_clears_audio() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = store.get_or_create_file("a.tsv").unwrap();
        let voice = FnSynthesizer(|_: &str| vec![9, 9]);
        let word_id = store.get_or_create_word(&entry("cat", "猫", None), &voice).unwrap();
        store
            .session(|tx| Store::insert_display(tx, file_id, word_id))
            .unwrap();
        let row = store.page(file_id, 10, 0).unwrap().remove(0);
        assert_eq!(row.audio, Some(vec![9, 9]));

        let saved = store
            .update_field(&row.with_field(WordField::Word, "cats"), WordField::Word, &SilentSynthesizer)
            .unwrap();
        assert_eq!(saved.word, "cats");
        assert_eq!(saved.audio, None);
    }

    #[test]
    fn test_update_translation_conflict_is_rejected() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(
            &store,
            "a.tsv",
            &[entry("cat", "猫", None), entry("cat", "貓", None)],
        );
        let rows = store.page(file_id, 10, 0).unwrap();
        let edited = rows[1].with_field(WordField::Translation, "猫");
        let err = store
            .update_field(&edited, WordField::Translation, &SilentSynthesizer)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.row(&rows[1].key).unwrap(), rows[1]);
    }

    #[test]
    fn test_update_rejects_empty_word() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(&store, "a.tsv", &[entry("cat", "猫", None)]);
        let row = store.page(file_id, 10, 0).unwrap().remove(0);
        let err = store
            .update_field(&row.with_field(WordField::Word, "  "), WordField::Word, &SilentSynthesizer)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_update_trims_edited_values() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(&store, "a.tsv", &[entry("cat", "猫", Some("kæt"))]);
        let row = store.page(file_id, 10, 0).unwrap().remove(0);

        let saved = store
            .update_field(&row.with_field(WordField::Word, " cats  "), WordField::Word, &SilentSynthesizer)
            .unwrap();
        assert_eq!(saved.word, "cats");
        let saved = store
            .update_field(&saved.with_field(WordField::Translation, "猫们 "), WordField::Translation, &SilentSynthesizer)
            .unwrap();
        assert_eq!(saved.trans, "猫们");
        let saved = store
            .update_field(&saved.with_field(WordField::Phonetic, "  "), WordField::Phonetic, &SilentSynthesizer)
            .unwrap();
        assert_eq!(saved.ipa, None);

        let conn = store.connect().unwrap();
        let lower: String = conn
            .query_row("SELECT word_lower FROM words WHERE id = ?", params![row.word_id], |r| r.get(0))
            .unwrap();
        assert_eq!(lower, "cats");
    }

    #[test]
    fn test_padded_word_edit_still_conflicts() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(
            &store,
            "a.tsv",
            &[entry("cat", "猫", None), entry("kitty", "猫", None)],
        );
        let rows = store.page(file_id, 10, 0).unwrap();
        let err = store
            .update_field(&rows[1].with_field(WordField::Word, "Cat "), WordField::Word, &SilentSynthesizer)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.row(&rows[1].key).unwrap(), rows[1]);
    }

    #[test]
    fn test_update_phonetic_to_empty_stores_null() {
        let (store, _temp_dir) = setup_test_store();
        let file_id = seed(&store, "a.tsv", &[entry("cat", "猫", Some("kæt"))]);
        let row = store.page(file_id, 10, 0).unwrap().remove(0);
        let saved = store
            .update_field(&row.with_field(WordField::Phonetic, ""), WordField::Phonetic, &SilentSynthesizer)
            .unwrap();
        assert_eq!(saved.ipa, None);
    }

    #[test]
    fn test_deleting_file_cascades_to_displays() {
        let (store, _temp_dir) = setup_test_store();
        seed(&store, "a.tsv", &[entry("cat", "猫", None), entry("dog", "狗", None)]);
        assert_eq!(store.display_count().unwrap(), 2);
        store.delete_file("a.tsv").unwrap();
        assert_eq!(store.display_count().unwrap(), 0);
        assert_eq!(store.word_count().unwrap(), 2);
    }

    #[test]
    fn test_session_rolls_back_on_error() {
        let (store, _temp_dir) = setup_test_store();
        let result: StoreResult<()> = store.session(|tx| {
            Store::insert_file(tx, "ghost.tsv")?;
            Err(StoreError::Invalid("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(!store.file_exists("ghost.tsv").unwrap());
    }
}
