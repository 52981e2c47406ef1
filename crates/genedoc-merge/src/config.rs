use genedoc_resolve::MappingPolicy;
use serde::{Deserialize, Serialize};

/// Default number of source documents read per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// How the updates of one source are executed.
///
/// Sources are always merged one after another in declared order; the mode
/// only decides what happens inside a source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One thread, batch after batch.
    #[default]
    Sequential,
    /// Each batch is split by canonical id across a local thread pool, so
    /// one worker owns every update of a given id.
    Pool { workers: usize },
    /// The source is cut into `window`-sized [`MergeTask`]s. Workers read
    /// and translate windows concurrently; updates are applied in window
    /// order with one worker per canonical id.
    ///
    /// [`MergeTask`]: crate::task::MergeTask
    Tasks { workers: usize, window: usize },
}

impl ExecutionMode {
    pub fn workers(&self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Pool { workers } | Self::Tasks { workers, .. } => (*workers).max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub batch_size: usize,
    pub mode: ExecutionMode,
    /// Resume at this 1-based non-root source; 0 runs a full build.
    pub restart_at: usize,
    pub mapping_policy: MappingPolicy,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mode: ExecutionMode::default(),
            restart_at: 0,
            mapping_policy: MappingPolicy::default(),
        }
    }
}

impl MergeConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn restart_at(mut self, index: usize) -> Self {
        self.restart_at = index;
        self
    }

    pub fn with_policy(mut self, policy: MappingPolicy) -> Self {
        self.mapping_policy = policy;
        self
    }
}
