use std::path::PathBuf;
use thiserror::Error;

use crate::models::WordRow;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },
    #[error("'{word}' with translation '{trans}' already exists")]
    Conflict { word: String, trans: String },
    #[error("{0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why an edit was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("Row is no longer on this page")]
    Stale,
    #[error("Rejected: {0}")]
    Invalid(String),
    #[error("Rejected: {0}")]
    Conflict(String),
    #[error("Storage unavailable: {0}")]
    Storage(String),
    #[error("Edit aborted: {0}")]
    Aborted(String),
}

impl CommitError {
    /// Validation failures are the user's to fix; the rest are environmental.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CommitError::Invalid(_) | CommitError::Conflict(_))
    }
}

impl From<StoreError> for CommitError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => CommitError::Stale,
            StoreError::Conflict { .. } => CommitError::Conflict(err.to_string()),
            StoreError::Invalid(msg) => CommitError::Invalid(msg),
            other => CommitError::Storage(other.to_string()),
        }
    }
}

pub type CommitResult = Result<WordRow, CommitError>;
