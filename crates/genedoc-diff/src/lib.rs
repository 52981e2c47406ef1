//! Diff engine for genedoc.
//!
//! Compares the published collection of a build against a freshly built
//! generation and produces a [`ChangeSet`](genedoc_types::ChangeSet): ids to
//! add, ids to delete, and a field-level [`DocDiff`](genedoc_types::DocDiff)
//! for every common id whose document changed.
//!
//! # Key Types
//!
//! - [`DiffEngine`] -- Chunked, optionally parallel collection comparison
//! - [`CollectionDiff`] -- Classification of every id of both sides
//! - [`diff_docs`] -- Diff of one document

pub mod config;
pub mod doc_diff;
pub mod engine;
pub mod error;

pub use config::{DiffConfig, DEFAULT_CHUNK_SIZE, DEFAULT_IGNORED_FIELD};
pub use doc_diff::diff_docs;
pub use engine::{CollectionDiff, DiffEngine};
pub use error::{DiffError, DiffResult};
