use std::path::PathBuf;

use genedoc_types::{DocId, TypeError};

/// Errors from backend and source store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `insert` hit an id that already exists (document store and in-memory
    /// backends; the search index overwrites instead).
    #[error("duplicate document id {id} in {collection}")]
    DuplicateId { collection: String, id: DocId },

    /// The named source collection does not exist.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// A stored or source document could not be decoded.
    #[error("corrupt document in {location}: {reason}")]
    CorruptDocument { location: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the embedded database engine.
    #[error("database error: {0}")]
    Database(String),

    /// A lock guarding in-process state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// The backend could not be opened at the configured location.
    #[error("cannot open storage at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
