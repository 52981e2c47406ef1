use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a build run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Building,
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Building => "building",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One entry of a build config's run history.
///
/// Written with [`RunStatus::Building`] when a run starts and replaced with
/// its final state when the run ends, so operators can tell an interrupted
/// run from a finished one and pick a `restart_at` point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRunRecord {
    pub run_id: Uuid,
    /// Collection name of the generation this run writes.
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub stats: BTreeMap<String, u64>,
    /// Non-root source index the run started at (0 = full build).
    #[serde(default)]
    pub restart_at: usize,
    #[serde(default)]
    pub logfile: Option<PathBuf>,
    /// Where and why the run failed.
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildRunRecord {
    pub fn begin(target: impl Into<String>, restart_at: usize) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            target: target.into(),
            started_at: Utc::now(),
            status: RunStatus::Building,
            stats: BTreeMap::new(),
            restart_at,
            logfile: None,
            failure: None,
            finished_at: None,
        }
    }

    pub fn with_logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    pub fn succeed(&mut self, stats: BTreeMap<String, u64>) {
        self.status = RunStatus::Success;
        self.stats = stats;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>, stats: BTreeMap<String, u64>) {
        self.status = RunStatus::Failed;
        self.failure = Some(reason.into());
        self.stats = stats;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Wall time of a finished run.
    pub fn elapsed(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_building() {
        let rec = BuildRunRecord::begin("b_20130415_aaaaaaaa", 0);
        assert_eq!(rec.status, RunStatus::Building);
        assert!(rec.finished_at.is_none());
        assert!(rec.elapsed().is_none());
    }

    #[test]
    fn succeed_and_fail() {
        let mut ok = BuildRunRecord::begin("t", 0);
        ok.succeed(BTreeMap::from([("total_canonical".to_string(), 4)]));
        assert!(ok.is_success());
        assert_eq!(ok.stats["total_canonical"], 4);
        assert!(ok.elapsed().is_some());

        let mut bad = BuildRunRecord::begin("t", 3);
        bad.fail("source #3 entrez_go: io error", BTreeMap::new());
        assert_eq!(bad.status, RunStatus::Failed);
        assert!(bad.failure.as_deref().unwrap().contains("entrez_go"));
    }

    #[test]
    fn run_ids_are_unique() {
        let a = BuildRunRecord::begin("t", 0);
        let b = BuildRunRecord::begin("t", 0);
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Success).unwrap(), "\"success\"");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }
}
