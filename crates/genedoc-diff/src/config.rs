use serde::{Deserialize, Serialize};

/// Default number of common ids compared per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// Field stamped by the sync applier; ignored when diffing by default.
pub const DEFAULT_IGNORED_FIELD: &str = "_timestamp";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub chunk_size: usize,
    /// Threads used to compare chunks; 1 compares on the calling thread.
    pub workers: usize,
    /// Fields left out of the comparison on both sides.
    pub ignore_fields: Vec<String>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
            ignore_fields: vec![DEFAULT_IGNORED_FIELD.to_string()],
        }
    }
}

impl DiffConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn ignoring(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignore_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}
