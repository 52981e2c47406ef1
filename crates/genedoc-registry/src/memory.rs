//! In-memory registry for tests and one-shot pipelines.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use genedoc_types::{BuildConfig, BuildRunRecord, SourceDescriptor};

use crate::error::{RegistryError, RegistryResult};
use crate::state::RegistryState;
use crate::traits::{Registry, DEFAULT_HISTORY_LIMIT};

/// An in-memory implementation of [`Registry`].
///
/// Data is lost when the registry is dropped.
#[derive(Debug)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
    history_limit: usize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            history_limit,
        }
    }

    fn read(&self) -> RegistryResult<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> RegistryResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry for InMemoryRegistry {
    fn source(&self, name: &str) -> RegistryResult<Option<SourceDescriptor>> {
        Ok(self.read()?.sources.get(name).cloned())
    }

    fn put_source(&self, source: &SourceDescriptor) -> RegistryResult<()> {
        self.write()?.put_source(source)
    }

    fn sources(&self) -> RegistryResult<Vec<SourceDescriptor>> {
        Ok(self.read()?.sources.values().cloned().collect())
    }

    fn build_config(&self, name: &str) -> RegistryResult<Option<BuildConfig>> {
        Ok(self.read()?.builds.get(name).cloned())
    }

    fn put_build_config(&self, config: &BuildConfig) -> RegistryResult<()> {
        self.write()?.put_build_config(config)
    }

    fn build_configs(&self) -> RegistryResult<Vec<BuildConfig>> {
        Ok(self.read()?.builds.values().cloned().collect())
    }

    fn upsert_run(&self, build: &str, record: &BuildRunRecord) -> RegistryResult<()> {
        self.write()?.upsert_run(build, record, self.history_limit);
        Ok(())
    }

    fn runs(&self, build: &str) -> RegistryResult<Vec<BuildRunRecord>> {
        Ok(self.read()?.runs.get(build).cloned().unwrap_or_default())
    }
}
