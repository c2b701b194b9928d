use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Grid column names, in display order.
pub const COLUMN_WORD: &str = "word";
pub const COLUMN_TRANS: &str = "trans";
pub const COLUMN_IPA: &str = "ipa";
pub const COLUMN_SOUND: &str = "sound";
pub const COLUMN_STATUS: &str = "status";

pub const COLUMNS: &[&str] = &[
    COLUMN_WORD,
    COLUMN_TRANS,
    COLUMN_IPA,
    COLUMN_SOUND,
    COLUMN_STATUS,
];

pub const EDITABLE_COLUMNS: &[&str] = &[COLUMN_WORD, COLUMN_TRANS, COLUMN_IPA];

#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub imported_at: DateTime<Utc>,
}

/// Build the display key for a (file, word) pair.
pub fn display_key(file_id: i64, word_id: i64) -> String {
    format!("{}_{}", file_id, word_id)
}

/// Denormalized snapshot of a display row joined with its word.
///
/// Rows are produced fresh by every storage query. The page cache only ever
/// swaps whole rows, so a `WordRow` held by the cache always reflects state
/// that storage has confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct WordRow {
    pub display_id: i64,
    pub key: String,
    pub word_id: i64,
    pub file_id: i64,
    pub word: String,
    pub trans: String,
    pub ipa: Option<String>,
    pub audio: Option<Vec<u8>>,
    pub is_unlearned: bool,
}

impl WordRow {
    pub fn field(&self, field: WordField) -> &str {
        match field {
            WordField::Word => &self.word,
            WordField::Translation => &self.trans,
            WordField::Phonetic => self.ipa.as_deref().unwrap_or(""),
        }
    }

    /// Copy of this row with `field` set to `value`. An empty phonetic
    /// value clears the transcription.
    pub fn with_field(&self, field: WordField, value: &str) -> Self {
        let mut row = self.clone();
        match field {
            WordField::Word => row.word = value.to_string(),
            WordField::Translation => row.trans = value.to_string(),
            WordField::Phonetic => {
                row.ipa = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
        }
        row
    }

    pub fn has_audio(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_empty())
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_unlearned { "unlearned" } else { "learned" }
    }
}

/// Word fields that can be edited from the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordField {
    Word,
    Translation,
    Phonetic,
}

impl WordField {
    pub fn column(self) -> &'static str {
        match self {
            WordField::Word => COLUMN_WORD,
            WordField::Translation => COLUMN_TRANS,
            WordField::Phonetic => COLUMN_IPA,
        }
    }
}

impl fmt::Display for WordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for WordField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            COLUMN_WORD => Ok(WordField::Word),
            COLUMN_TRANS => Ok(WordField::Translation),
            COLUMN_IPA => Ok(WordField::Phonetic),
            other => Err(format!("column '{}' is not editable", other)),
        }
    }
}

/// One proposed edit travelling through the commit pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChange {
    pub key: String,
    pub field: WordField,
    pub original: String,
    pub proposed: String,
}

/// A parsed line of an import file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub word: String,
    pub trans: String,
    pub ipa: Option<String>,
}

impl Entry {
    pub fn lookup_key(&self) -> (String, String) {
        (self.word.to_lowercase(), self.trans.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub file_id: i64,
    pub filename: String,
    pub entries: usize,
    pub new_words: usize,
    pub reused_words: usize,
    pub displays: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(ImportSummary),
    AlreadyImported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

/// A message for the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub kind: MessageType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum WindowType {
    #[default]
    Table,
    Files,
    ImportPrompt,
    Help,
}
