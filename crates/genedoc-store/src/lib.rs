//! Storage backends for genedoc.
//!
//! Every algorithm that writes or reads canonical gene documents (root
//! construction, source merge, diff, sync) is written against the
//! [`DocBackend`] trait and never against a concrete store. Source documents
//! are read through the [`SourceStore`] trait.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based collection for tests and small builds
//! - [`DocStoreBackend`] -- one redb table per collection, durable on `finalize`
//! - [`SearchIndexBackend`] -- refresh-visibility index with JSON snapshots
//!
//! [`BackendConfig`] selects one of them; [`Storage`] opens the location and
//! hands out per-collection [`Backend`] handles.
//!
//! # Sources
//!
//! - [`InMemorySourceStore`] -- fixtures and tests
//! - [`JsonlSourceStore`] -- a directory of `<source>.jsonl` files
//!
//! # Design Rules
//!
//! 1. `update` never creates a document; a missing id is a counted no-op.
//! 2. Ids are listed in ascending order through `ids_after` pagination.
//! 3. Backends are `Send + Sync` and need no external locking.
//! 4. After `finalize`, reads observe every earlier write.

pub mod backend;
pub mod docstore;
pub mod error;
pub mod jsonl;
pub mod memory;
pub mod search;
pub mod source;
pub mod traits;

#[cfg(test)]
mod contract;

pub use backend::{Backend, BackendConfig, Storage};
pub use docstore::{DocStore, DocStoreBackend};
pub use error::{StoreError, StoreResult};
pub use jsonl::JsonlSourceStore;
pub use memory::{InMemoryBackend, MemoryStorage};
pub use search::{SearchCluster, SearchIndexBackend};
pub use source::{doc_feeder, InMemorySourceStore, SourceFeeder, SourceFilter, SourceStore};
pub use traits::{
    DocBackend, DocBackendExt, DocPatch, IdPages, UpdateOutcome, UpdateTally, DEFAULT_ID_PAGE,
};
