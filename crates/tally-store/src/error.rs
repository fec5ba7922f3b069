// ABOUTME: Error taxonomy shared by the engine, the CRUD facade, settings, and import/export.
// ABOUTME: Record conversion failures map onto store errors at the storage boundary.

use tally_core::{RecordError, RecordKey};
use thiserror::Error;

/// Errors surfaced by store operations. Operations reject rather than
/// returning empty results on constraint violations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    DuplicateKey(RecordKey),

    #[error("record not found: {0}")]
    NotFound(RecordKey),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("import belongs to another application: expected {expected}, found {found}")]
    ForeignApp { expected: String, found: String },

    #[error("store has been deleted")]
    StoreClosed,

    #[error("storage error: {0}")]
    StorageIo(#[from] rusqlite::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<RecordError> for StoreError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::UnknownCategory(tag) => StoreError::UnknownCategory(tag),
            other => StoreError::InvalidRecord(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
