//! Merge engine for genedoc builds.
//!
//! A [`GeneDocBuilder`] turns a registered build config into one generation
//! of merged gene documents:
//!
//! - roots are resolved into the canonical id set (see `genedoc-resolve`);
//! - every other source is read in batches, translated to canonical ids
//!   through an [`IdMapCache`], and applied as shallow updates;
//! - execution is sequential, partitioned on a worker pool, or cut into
//!   explicit [`MergeTask`]s;
//! - the run is tracked in the registry, and a failed run can resume at a
//!   given source with `restart_at`.

pub mod apply;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod schema;
pub mod task;

pub use apply::{apply_partitioned, apply_sequential, translate_batch, CanonicalUpdate, SourceReport};
pub use builder::GeneDocBuilder;
pub use cache::IdMapCache;
pub use config::{ExecutionMode, MergeConfig, DEFAULT_BATCH_SIZE};
pub use error::{MergeError, MergeResult};
pub use schema::merged_schema;
pub use task::{dispatch, plan_tasks, run_merge_task, MergeTask, TaskOutput, WorkerEnv};
