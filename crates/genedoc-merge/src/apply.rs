//! Translating source documents into canonical updates and applying them.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use genedoc_resolve::IdentityMap;
use genedoc_store::{DocBackend, DocPatch, UpdateTally};
use genedoc_types::{DocId, Document, Fields};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::error::MergeResult;

/// One pending write: set `fields` on canonical document `id`.
pub type CanonicalUpdate = (DocId, Fields);

/// Counters of merging one source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceReport {
    /// Source documents read.
    pub read: u64,
    pub tally: UpdateTally,
    /// Updates not made because the target is outside the canonical id set.
    pub dropped: u64,
}

impl SourceReport {
    pub fn absorb(&mut self, other: SourceReport) {
        self.read += other.read;
        self.tally.absorb(other.tally);
        self.dropped += other.dropped;
    }

    /// Record as `<source>.updated|unchanged|missing|dropped`.
    pub fn record_into(&self, source: &str, stats: &mut BTreeMap<String, u64>) {
        let entries = [
            ("updated", self.tally.modified),
            ("unchanged", self.tally.unchanged),
            ("missing", self.tally.missing),
            ("dropped", self.dropped),
        ];
        for (key, value) in entries {
            stats.insert(format!("{source}.{key}"), value);
        }
    }
}

/// Translate a batch of source documents into updates of canonical
/// documents in `geneid_set`. Returns the updates and the drop count.
///
/// A source id with several canonical ids fans out to each of them. A source
/// id the map does not know targets itself, which reaches secondary roots
/// that were inserted under their own id.
pub fn translate_batch(
    batch: Vec<Document>,
    map: Option<&IdentityMap>,
    geneid_set: &HashSet<DocId>,
) -> (Vec<CanonicalUpdate>, u64) {
    let mut updates = Vec::with_capacity(batch.len());
    let mut dropped = 0;
    for doc in batch {
        let targets: &[DocId] = match map.map(|m| m.translate(&doc.id)) {
            Some(mapped) if !mapped.is_empty() => mapped,
            _ => std::slice::from_ref(&doc.id),
        };
        let mut hits: Vec<DocId> = targets
            .iter()
            .filter(|t| geneid_set.contains(*t))
            .cloned()
            .collect();
        dropped += (targets.len() - hits.len()) as u64;
        let fields = doc.into_fields();
        if let Some(last) = hits.pop() {
            updates.extend(hits.into_iter().map(|t| (t, fields.clone())));
            updates.push((last, fields));
        }
    }
    (updates, dropped)
}

/// Apply updates in order on the calling thread.
pub fn apply_sequential(
    updates: Vec<CanonicalUpdate>,
    target: &dyn DocBackend,
) -> MergeResult<UpdateTally> {
    let mut tally = UpdateTally::default();
    for (id, fields) in updates {
        tally.record(target.update(&id, &DocPatch::set(fields))?);
    }
    Ok(tally)
}

/// Worker owning `id` among `workers`.
pub(crate) fn partition_of(id: &DocId, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

/// Split updates by canonical id and apply the partitions on `pool`.
/// Updates of one id stay in one partition, in their original order.
pub fn apply_partitioned(
    pool: &ThreadPool,
    updates: Vec<CanonicalUpdate>,
    target: &dyn DocBackend,
) -> MergeResult<UpdateTally> {
    let workers = pool.current_num_threads().max(1);
    let mut partitions: Vec<Vec<CanonicalUpdate>> = (0..workers).map(|_| Vec::new()).collect();
    for update in updates {
        let slot = partition_of(&update.0, workers);
        partitions[slot].push(update);
    }
    let tallies: Vec<UpdateTally> = pool.install(|| {
        partitions
            .into_par_iter()
            .map(|part| apply_sequential(part, target))
            .collect::<MergeResult<Vec<_>>>()
    })?;
    let mut total = UpdateTally::default();
    for t in tallies {
        total.absorb(t);
    }
    Ok(total)
}
