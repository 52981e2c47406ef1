//! Sync applier for genedoc.
//!
//! Publishes a new generation by applying its [`ChangeSet`](genedoc_types::ChangeSet)
//! to the build's `<build>_current` collection, then verifies the result
//! without repairing it.
//!
//! - [`SyncApplier`] -- adds, deletes, then updates, each stamped with the
//!   generation timestamp
//! - [`SyncVerifier`] -- report-only checks of the applied change set
//! - [`sync_generation`] -- diff, apply, and verify in one call
//! - [`timestamp_stats`] -- published documents per generation timestamp
//! - [`change_history`] and [`dump_timestamps`] -- which documents changed
//!   when, for operators

pub mod applier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod fixtures;

pub use applier::SyncApplier;
pub use config::{SyncConfig, DEFAULT_SYNC_BATCH, DEFAULT_TIMESTAMP_FIELD};
pub use error::{SyncError, SyncResult};
pub use pipeline::{sync_generation, SyncOutcome};
pub use types::{
    ApplyReport, StampedDoc, TimestampRange, TimestampStats, VerificationCheck, VerificationReport,
};
pub use verifier::{change_history, dump_timestamps, timestamp_stats, SyncVerifier};
