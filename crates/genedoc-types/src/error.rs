use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("invalid generation name {0:?}")]
    InvalidGeneration(String),

    #[error("invalid build config {name}: {reason}")]
    InvalidBuildConfig { name: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
