//! Error types for registry operations.

use std::path::PathBuf;

use genedoc_types::TypeError;
use thiserror::Error;

/// Errors that can occur while reading or writing the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A source or build config name failed validation, or a build config
    /// is structurally invalid.
    #[error(transparent)]
    Invalid(#[from] TypeError),

    /// The persisted registry file could not be decoded.
    #[error("corrupt registry file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Serialization failure while persisting.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
