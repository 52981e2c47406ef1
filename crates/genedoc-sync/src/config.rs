use serde::{Deserialize, Serialize};

/// Default number of ids fetched or removed per backend call.
pub const DEFAULT_SYNC_BATCH: usize = 10_000;

/// Field carrying the generation timestamp on published documents.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "_timestamp";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub timestamp_field: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SYNC_BATCH,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }
}
