//! Diff, apply, and verify in one pass.

use genedoc_diff::DiffEngine;
use genedoc_store::DocBackend;
use genedoc_types::{ChangeSet, GenerationId};
use serde::Serialize;
use tracing::info;

use crate::applier::SyncApplier;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::types::{ApplyReport, VerificationReport};
use crate::verifier::SyncVerifier;

#[derive(Clone, Debug, Serialize)]
pub struct SyncOutcome {
    pub changes: ChangeSet,
    /// `None` when there was nothing to apply.
    pub applied: Option<ApplyReport>,
    pub verification: Option<VerificationReport>,
}

impl SyncOutcome {
    /// True when nothing was applied or the applied changes verified.
    pub fn is_valid(&self) -> bool {
        self.verification.as_ref().map_or(true, VerificationReport::is_valid)
    }
}

/// Bring `current` up to date with `new`, the collection of `generation`.
pub fn sync_generation(
    diff: &DiffEngine,
    config: &SyncConfig,
    current: &dyn DocBackend,
    new: &dyn DocBackend,
    generation: &GenerationId,
) -> SyncResult<SyncOutcome> {
    let changes = diff.diff(current, new, generation)?;
    if changes.is_empty() {
        info!(source = %changes.source, target = current.name(), "already up to date");
        return Ok(SyncOutcome {
            changes,
            applied: None,
            verification: None,
        });
    }
    let applied = SyncApplier::new(config.clone()).apply(&changes, new, current)?;
    let verification = SyncVerifier::new(config.clone()).verify(&changes, current, &applied)?;
    Ok(SyncOutcome {
        changes,
        applied: Some(applied),
        verification: Some(verification),
    })
}
