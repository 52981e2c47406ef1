use std::fmt;

use genedoc_store::UpdateTally;
use genedoc_types::DocId;
use serde::Serialize;

/// What applying one change set did to the published collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Generation the change set came from.
    pub source: String,
    /// Document count of the published collection before applying.
    pub count_before: u64,
    /// Added ids inserted as new documents.
    pub inserted: u64,
    /// Added ids already present, overwritten in place.
    pub overwritten: u64,
    /// Deleted ids actually removed.
    pub deleted: u64,
    pub updates: UpdateTally,
    /// Removed field names left in place because the backend cannot unset.
    pub unset_skipped: u64,
}

impl ApplyReport {
    /// Count the published collection should have after applying.
    ///
    /// `count_before + |add| - |delete|`, not counting adds that were
    /// already present or deletes that were already gone.
    pub fn expected_count(&self) -> u64 {
        (self.count_before + self.inserted).saturating_sub(self.deleted)
    }
}

/// One verification check, expected against observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationCheck {
    pub name: &'static str,
    pub expected: u64,
    pub observed: u64,
}

impl VerificationCheck {
    pub fn passed(&self) -> bool {
        self.expected == self.observed
    }
}

impl fmt::Display for VerificationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed() { "OK" } else { "ERROR" };
        let op = if self.passed() { "==" } else { "!=" };
        write!(f, "{}: {}{}{} {}", self.name, self.observed, op, self.expected, verdict)
    }
}

/// Outcome of verifying an applied change set. Never repaired.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub source: String,
    pub checks: Vec<VerificationCheck>,
    /// Ids behind failed checks, one line each.
    pub violations: Vec<String>,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty() && self.checks.iter().all(VerificationCheck::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|c| !c.passed())
    }
}

/// Documents of the published collection grouped by timestamp.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimestampStats {
    /// `(timestamp, count)`, newest first.
    pub by_timestamp: Vec<(String, u64)>,
    pub unstamped: u64,
}

impl TimestampStats {
    pub fn latest(&self) -> Option<&str> {
        self.by_timestamp.first().map(|(ts, _)| ts.as_str())
    }

    pub fn total(&self) -> u64 {
        self.by_timestamp.iter().map(|(_, n)| n).sum::<u64>() + self.unstamped
    }
}

/// A published document and the timestamp it carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StampedDoc {
    pub id: DocId,
    pub timestamp: String,
}

/// Open interval of timestamps; a missing bound is unbounded.
///
/// Timestamps are RFC 3339 UTC strings, so they compare as text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimestampRange {
    pub after: Option<String>,
    pub before: Option<String>,
}

impl TimestampRange {
    pub fn after(mut self, ts: impl Into<String>) -> Self {
        self.after = Some(ts.into());
        self
    }

    pub fn before(mut self, ts: impl Into<String>) -> Self {
        self.before = Some(ts.into());
        self
    }

    pub fn contains(&self, ts: &str) -> bool {
        self.after.as_deref().map_or(true, |a| ts > a)
            && self.before.as_deref().map_or(true, |b| ts < b)
    }
}
