//! Foundation types for genedoc.
//!
//! This crate provides the identity, document, and bookkeeping types shared by
//! every other genedoc crate: the storage backends, the identity resolver, the
//! merge engine, and the diff/sync engines.
//!
//! # Key Types
//!
//! - [`DocId`] -- Canonical or native document identifier
//! - [`Document`] -- `{_id, fields}` gene document (canonical or source-side)
//! - [`SourceDescriptor`] / [`BuildConfig`] -- What a build merges, and how
//! - [`GenerationId`] -- Name and timestamp of one build output
//! - [`ChangeSet`] / [`DocDiff`] -- Difference between two generations
//! - [`BuildRunRecord`] -- One entry of a build config's run history

pub mod changes;
pub mod document;
pub mod error;
pub mod generation;
pub mod id;
pub mod names;
pub mod run;
pub mod source;

pub use changes::{ChangeSet, ChangeSummary, DocDiff};
pub use document::{Document, Fields, SPECIES_FIELD};
pub use error::TypeError;
pub use generation::{current_collection, list_generations, GenerationId};
pub use id::DocId;
pub use names::validate_name;
pub use run::{BuildRunRecord, RunStatus};
pub use source::{BuildConfig, SourceDescriptor};
