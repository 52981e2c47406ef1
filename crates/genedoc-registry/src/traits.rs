//! The [`Registry`] trait: what a build needs to know before it runs, and
//! what it leaves behind.

use genedoc_types::{BuildConfig, BuildRunRecord, SourceDescriptor};

use crate::error::RegistryResult;

/// Default number of run records kept per build config.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Storage for source descriptors, build configs and run history.
///
/// Implementations must be thread-safe (`Send + Sync`). Writes validate
/// names before storing anything.
pub trait Registry: Send + Sync {
    fn source(&self, name: &str) -> RegistryResult<Option<SourceDescriptor>>;

    /// Create or replace a source descriptor.
    fn put_source(&self, source: &SourceDescriptor) -> RegistryResult<()>;

    /// All source descriptors, sorted by name.
    fn sources(&self) -> RegistryResult<Vec<SourceDescriptor>>;

    fn build_config(&self, name: &str) -> RegistryResult<Option<BuildConfig>>;

    /// Create or replace a build config after structural validation.
    fn put_build_config(&self, config: &BuildConfig) -> RegistryResult<()>;

    /// All build configs, sorted by name.
    fn build_configs(&self) -> RegistryResult<Vec<BuildConfig>>;

    /// Insert or replace (by `run_id`) a run record of `build`, dropping the
    /// oldest records beyond the history limit.
    fn upsert_run(&self, build: &str, record: &BuildRunRecord) -> RegistryResult<()>;

    /// Run history of `build`, oldest first.
    fn runs(&self, build: &str) -> RegistryResult<Vec<BuildRunRecord>>;

    /// The most recently started run.
    fn latest_run(&self, build: &str) -> RegistryResult<Option<BuildRunRecord>> {
        Ok(self.runs(build)?.pop())
    }

    /// The most recent run that finished successfully.
    fn latest_successful(&self, build: &str) -> RegistryResult<Option<BuildRunRecord>> {
        Ok(self
            .runs(build)?
            .into_iter()
            .rev()
            .find(BuildRunRecord::is_success))
    }
}
