//! Error types for the merge engine.

use genedoc_registry::RegistryError;
use genedoc_resolve::ResolveError;
use genedoc_store::StoreError;
use genedoc_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("unknown build config: {0}")]
    UnknownBuild(String),

    /// A source named by the build config has no registry descriptor.
    #[error("build {build} names unregistered source {name}")]
    UnknownSource { build: String, name: String },

    /// A registered source has no collection in the source store.
    #[error("source collection missing: {0}")]
    MissingSource(String),

    #[error("source {name} is keyed by {id_type} but no cross-references exist for it")]
    MissingCrossReference { name: String, id_type: String },

    #[error("restart_at {restart_at} is past the last non-root source ({sources})")]
    InvalidRestart { restart_at: usize, sources: usize },

    /// Merging one source failed; the build can be resumed at `index`.
    #[error("source #{index} {name} failed: {reason}")]
    SourceFailed {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("worker pool: {0}")]
    WorkerPool(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Invalid(#[from] TypeError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type MergeResult<T> = std::result::Result<T, MergeError>;
