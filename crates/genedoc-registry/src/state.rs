use std::collections::BTreeMap;

use genedoc_types::{BuildConfig, BuildRunRecord, SourceDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;

/// Registry content shared by the in-memory and file implementations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegistryState {
    #[serde(default)]
    pub sources: BTreeMap<String, SourceDescriptor>,
    #[serde(default)]
    pub builds: BTreeMap<String, BuildConfig>,
    #[serde(default)]
    pub runs: BTreeMap<String, Vec<BuildRunRecord>>,
}

impl RegistryState {
    pub fn put_source(&mut self, source: &SourceDescriptor) -> RegistryResult<()> {
        source.validate()?;
        self.sources.insert(source.name.clone(), source.clone());
        Ok(())
    }

    pub fn put_build_config(&mut self, config: &BuildConfig) -> RegistryResult<()> {
        config.validate()?;
        self.builds.insert(config.name.clone(), config.clone());
        Ok(())
    }

    pub fn upsert_run(&mut self, build: &str, record: &BuildRunRecord, limit: usize) {
        let history = self.runs.entry(build.to_string()).or_default();
        match history.iter_mut().find(|r| r.run_id == record.run_id) {
            Some(existing) => *existing = record.clone(),
            None => history.push(record.clone()),
        }
        history.sort_by_key(|r| r.started_at);
        let excess = history.len().saturating_sub(limit.max(1));
        history.drain(..excess);
    }
}
