//! Registry persisted as one JSON file.
//!
//! Every mutation rewrites the file through a temporary sibling and an
//! atomic rename, so a crash mid-write leaves the previous version intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use genedoc_types::{BuildConfig, BuildRunRecord, SourceDescriptor};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::state::RegistryState;
use crate::traits::{Registry, DEFAULT_HISTORY_LIMIT};

#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    state: RwLock<RegistryState>,
    history_limit: usize,
}

impl FileRegistry {
    /// Open the registry at `path`, starting empty if the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        Self::open_with_history_limit(path, DEFAULT_HISTORY_LIMIT)
    }

    pub fn open_with_history_limit(
        path: impl Into<PathBuf>,
        history_limit: usize,
    ) -> RegistryResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?
        } else {
            RegistryState::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
            history_limit,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to the state and persist it. The in-memory state only
    /// moves forward once the file is written.
    fn mutate(
        &self,
        change: impl FnOnce(&mut RegistryState) -> RegistryResult<()>,
    ) -> RegistryResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        let mut next = state.clone();
        change(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    fn persist(&self, state: &RegistryState) -> RegistryResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| RegistryError::Io(e.error))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "registry saved");
        Ok(())
    }

    fn snapshot<T>(&self, read: impl FnOnce(&RegistryState) -> T) -> RegistryResult<T> {
        let state = self
            .state
            .read()
            .map_err(|e| RegistryError::LockPoisoned(e.to_string()))?;
        Ok(read(&state))
    }
}

impl Registry for FileRegistry {
    fn source(&self, name: &str) -> RegistryResult<Option<SourceDescriptor>> {
        self.snapshot(|s| s.sources.get(name).cloned())
    }

    fn put_source(&self, source: &SourceDescriptor) -> RegistryResult<()> {
        self.mutate(|s| s.put_source(source))
    }

    fn sources(&self) -> RegistryResult<Vec<SourceDescriptor>> {
        self.snapshot(|s| s.sources.values().cloned().collect())
    }

    fn build_config(&self, name: &str) -> RegistryResult<Option<BuildConfig>> {
        self.snapshot(|s| s.builds.get(name).cloned())
    }

    fn put_build_config(&self, config: &BuildConfig) -> RegistryResult<()> {
        self.mutate(|s| s.put_build_config(config))
    }

    fn build_configs(&self) -> RegistryResult<Vec<BuildConfig>> {
        self.snapshot(|s| s.builds.values().cloned().collect())
    }

    fn upsert_run(&self, build: &str, record: &BuildRunRecord) -> RegistryResult<()> {
        let limit = self.history_limit;
        self.mutate(|s| {
            s.upsert_run(build, record, limit);
            Ok(())
        })
    }

    fn runs(&self, build: &str) -> RegistryResult<Vec<BuildRunRecord>> {
        self.snapshot(|s| s.runs.get(build).cloned().unwrap_or_default())
    }
}
