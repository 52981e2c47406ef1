//! Explicit merge tasks for distributed-style execution.
//!
//! A [`MergeTask`] names everything a worker needs to know about its share of
//! a source: no closures, no ambient state. Workers resolve the names
//! against a [`WorkerEnv`] and run [`run_merge_task`], which reads and
//! translates one window. Tasks are plain serde values so they can be
//! shipped to another process as JSON.
//!
//! [`dispatch`] runs tasks in waves of one task per worker. The translated
//! updates of a wave are applied in window order, partitioned by canonical
//! id, so every id sees its updates in source order.

use std::collections::HashSet;

use genedoc_store::{DocBackend, SourceFilter, SourceStore};
use genedoc_types::DocId;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::apply::{apply_partitioned, translate_batch, CanonicalUpdate, SourceReport};
use crate::cache::IdMapCache;
use crate::error::MergeResult;

/// What a task's names resolve to inside one worker process.
pub struct WorkerEnv<'a> {
    pub sources: &'a dyn SourceStore,
    pub target: &'a dyn DocBackend,
    pub cache: &'a IdMapCache<'a>,
    pub geneid_set: &'a HashSet<DocId>,
    pub batch_size: usize,
}

/// Translated window of one task.
#[derive(Debug, Default)]
pub struct TaskOutput {
    /// Updates in source order.
    pub updates: Vec<CanonicalUpdate>,
    /// Read and dropped counts; the tally is filled in when applied.
    pub report: SourceReport,
}

/// Execute one task: read its window and translate it to canonical updates.
pub fn run_merge_task(task: &MergeTask, env: &WorkerEnv<'_>) -> MergeResult<TaskOutput> {
    let map = task.id_type.as_deref().map(|t| env.cache.get(t)).transpose()?;
    let filter = SourceFilter::all();
    let end = task.skip.saturating_add(task.limit);
    let step = env.batch_size.max(1);
    let mut output = TaskOutput::default();
    let mut offset = task.skip;

    while offset < end {
        let batch = env
            .sources
            .read_window(&task.source, &filter, offset, step.min(end - offset))?;
        if batch.is_empty() {
            break;
        }
        offset += batch.len();
        output.report.read += batch.len() as u64;
        let (updates, dropped) = translate_batch(batch, map.as_deref(), env.geneid_set);
        output.report.dropped += dropped;
        output.updates.extend(updates);
    }
    debug!(
        source = %task.source,
        skip = task.skip,
        read = output.report.read,
        updates = output.updates.len(),
        "merge task translated"
    );
    Ok(output)
}

/// Run `tasks` on `pool` and sum their reports.
///
/// The end state is the one sequential execution produces: tasks of a wave
/// translate concurrently, then their updates are applied in task order
/// with each canonical id owned by one worker.
pub fn dispatch(
    pool: &ThreadPool,
    tasks: &[MergeTask],
    env: &WorkerEnv<'_>,
) -> MergeResult<SourceReport> {
    let wave = pool.current_num_threads().max(1);
    let mut total = SourceReport::default();
    for tasks in tasks.chunks(wave) {
        let outputs: Vec<TaskOutput> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| run_merge_task(task, env))
                .collect::<MergeResult<Vec<_>>>()
        })?;
        let mut updates = Vec::new();
        for output in outputs {
            total.absorb(output.report);
            updates.extend(output.updates);
        }
        total.tally.absorb(apply_partitioned(pool, updates, env.target)?);
    }
    Ok(total)
}
