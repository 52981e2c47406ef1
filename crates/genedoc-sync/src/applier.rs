//! Applying a change set to the published collection.

use genedoc_store::{DocBackend, DocPatch};
use genedoc_types::{ChangeSet, DocDiff, Document};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::ApplyReport;

/// Writes a [`ChangeSet`] into the published collection.
///
/// Adds are applied first, then deletes, then updates, and the target is
/// finalized. Applying the same change set twice leaves the same content:
/// re-added ids are overwritten, deleting an absent id is a no-op, and
/// updates are plain field sets.
#[derive(Clone, Debug, Default)]
pub struct SyncApplier {
    config: SyncConfig,
}

impl SyncApplier {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Apply `changes` to `current`, reading full documents for added ids
    /// from `new`, the generation the change set was computed from.
    pub fn apply(
        &self,
        changes: &ChangeSet,
        new: &dyn DocBackend,
        current: &dyn DocBackend,
    ) -> SyncResult<ApplyReport> {
        if changes.source != new.name() {
            return Err(SyncError::SourceMismatch {
                expected: changes.source.clone(),
                actual: new.name().to_string(),
            });
        }
        let stamp = changes.stamp_value();
        let mut report = ApplyReport {
            source: changes.source.clone(),
            count_before: current.count()?,
            ..ApplyReport::default()
        };
        info!(
            source = %changes.source,
            target = current.name(),
            add = changes.add.len(),
            delete = changes.delete.len(),
            update = changes.update.len(),
            "applying change set"
        );

        self.apply_adds(changes, new, current, &stamp, &mut report)?;
        self.apply_deletes(changes, current, &mut report)?;
        self.apply_updates(&changes.update, current, &stamp, &mut report)?;
        current.finalize()?;

        if report.unset_skipped > 0 {
            warn!(
                target = current.name(),
                backend = current.kind(),
                skipped = report.unset_skipped,
                "backend cannot unset fields, removed fields left in place"
            );
        }
        info!(
            inserted = report.inserted,
            overwritten = report.overwritten,
            deleted = report.deleted,
            updated = report.updates.modified,
            "change set applied"
        );
        Ok(report)
    }

    fn apply_adds(
        &self,
        changes: &ChangeSet,
        new: &dyn DocBackend,
        current: &dyn DocBackend,
        stamp: &Value,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let field = &self.config.timestamp_field;
        for ids in changes.add.chunks(self.config.batch_size.max(1)) {
            let fetched = new.get_many(ids)?;
            let existing = current.get_many(ids)?;
            let mut fresh = Vec::with_capacity(ids.len());

            for ((id, doc), old) in ids.iter().zip(fetched).zip(existing) {
                let Some(doc) = doc else {
                    return Err(SyncError::MissingSourceDocument {
                        collection: new.name().to_string(),
                        id: id.clone(),
                    });
                };
                let mut fields = doc.into_fields();
                fields.insert(field.clone(), stamp.clone());
                match old {
                    Some(old) => {
                        let stale: Vec<String> = old
                            .fields
                            .keys()
                            .filter(|k| !fields.contains_key(*k))
                            .cloned()
                            .collect();
                        let patch = DocPatch::set(fields).with_unset(stale);
                        if !current.update(id, &patch)?.is_missing() {
                            report.overwritten += 1;
                        }
                    }
                    None => fresh.push(Document::new(id.clone(), fields)),
                }
            }

            if !fresh.is_empty() {
                current.insert(&fresh)?;
                report.inserted += fresh.len() as u64;
            }
            debug!(batch = ids.len(), "adds applied");
        }
        Ok(())
    }

    fn apply_deletes(
        &self,
        changes: &ChangeSet,
        current: &dyn DocBackend,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        for ids in changes.delete.chunks(self.config.batch_size.max(1)) {
            report.deleted += current.remove_many(ids)? as u64;
        }
        Ok(())
    }

    fn apply_updates(
        &self,
        diffs: &[DocDiff],
        current: &dyn DocBackend,
        stamp: &Value,
        report: &mut ApplyReport,
    ) -> SyncResult<()> {
        let can_unset = current.supports_unset();
        for diff in diffs {
            let mut patch = DocPatch::set(diff.set_fields())
                .with_field(self.config.timestamp_field.clone(), stamp.clone());
            if !diff.removed_field_names.is_empty() {
                if can_unset {
                    patch = patch.with_unset(diff.removed_field_names.iter().cloned());
                } else {
                    report.unset_skipped += diff.removed_field_names.len() as u64;
                }
            }
            let outcome = current.update(&diff.id, &patch)?;
            if outcome.is_missing() {
                debug!(id = %diff.id, "updated document not in target");
            }
            report.updates.record(outcome);
        }
        Ok(())
    }
}
