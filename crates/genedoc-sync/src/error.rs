use genedoc_types::DocId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("change set was computed from {expected}, not {actual}")]
    SourceMismatch { expected: String, actual: String },

    #[error("added document {id} not found in {collection}")]
    MissingSourceDocument { collection: String, id: DocId },

    #[error("store error: {0}")]
    Store(#[from] genedoc_store::StoreError),

    #[error("diff error: {0}")]
    Diff(#[from] genedoc_diff::DiffError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
