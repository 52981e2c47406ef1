//! Error types for identity resolution.

use genedoc_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The primary root source cannot be read; nothing can be built.
    #[error("primary root source unavailable: {0}")]
    PrimaryRootUnavailable(String),

    /// No cross-reference list exists for an id space a source is keyed by.
    #[error("no cross-references for id type {0}")]
    MissingCrossReference(String),

    /// A catalog line could not be parsed.
    #[error("bad catalog entry at {location}: {reason}")]
    Catalog { location: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
