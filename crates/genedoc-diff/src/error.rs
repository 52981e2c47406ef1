//! Error types for the diff crate.

use genedoc_types::DocId;

/// Errors that can occur while computing a change set.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A document listed by id could not be fetched from one side.
    #[error("document {id} listed in {collection} but not found")]
    Vanished { collection: String, id: DocId },

    #[error("worker pool: {0}")]
    WorkerPool(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] genedoc_store::StoreError),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
