use std::collections::BTreeMap;
use std::io::Write;

use genedoc_store::{DocBackend, DocBackendExt, DEFAULT_ID_PAGE};
use genedoc_types::{ChangeSet, DocId};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::types::{
    ApplyReport, StampedDoc, TimestampRange, TimestampStats, VerificationCheck, VerificationReport,
};

/// Checks the published collection after a change set was applied.
#[derive(Clone, Debug, Default)]
pub struct SyncVerifier {
    config: SyncConfig,
}

impl SyncVerifier {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    /// Verify `changes` against `current`. `applied` is the report of the
    /// apply being verified.
    ///
    /// Checks: every added id is present and stamped, every deleted id is
    /// absent, exactly the added and updated ids carry the new stamp, and
    /// the total count moved only by adds and deletes.
    pub fn verify(
        &self,
        changes: &ChangeSet,
        current: &dyn DocBackend,
        applied: &ApplyReport,
    ) -> SyncResult<VerificationReport> {
        let field = self.config.timestamp_field.as_str();
        let stamp = changes.stamp_value();
        let batch = self.config.batch_size.max(1);
        let mut violations = Vec::new();

        let mut stamped_adds = 0;
        for ids in changes.add.chunks(batch) {
            for (id, doc) in ids.iter().zip(current.get_many(ids)?) {
                match doc {
                    None => violations.push(format!("add {id}: missing")),
                    Some(doc) if doc.get(field) != Some(&stamp) => {
                        violations.push(format!("add {id}: not stamped"))
                    }
                    Some(_) => stamped_adds += 1,
                }
            }
        }

        let mut lingering = 0;
        for ids in changes.delete.chunks(batch) {
            for (id, doc) in ids.iter().zip(current.get_many(ids)?) {
                if doc.is_some() {
                    lingering += 1;
                    violations.push(format!("delete {id}: still present"));
                }
            }
        }

        let checks = vec![
            VerificationCheck {
                name: "add",
                expected: changes.add.len() as u64,
                observed: stamped_adds,
            },
            VerificationCheck {
                name: "delete",
                expected: 0,
                observed: lingering,
            },
            VerificationCheck {
                name: "stamped",
                expected: changes.stamped_ids().len() as u64,
                observed: current.count_where(field, &stamp)?,
            },
            VerificationCheck {
                name: "total",
                expected: applied.expected_count(),
                observed: current.count()?,
            },
        ];

        let report = VerificationReport {
            source: changes.source.clone(),
            checks,
            violations,
        };
        if report.is_valid() {
            info!(source = %report.source, target = current.name(), "verification passed");
        } else {
            for check in report.failed() {
                warn!(
                    check = check.name,
                    expected = check.expected,
                    observed = check.observed,
                    "verification failed"
                );
            }
        }
        Ok(report)
    }

    /// Count documents of `current` per value of the timestamp field.
    pub fn timestamp_stats(&self, current: &dyn DocBackend) -> SyncResult<TimestampStats> {
        timestamp_stats(current, &self.config.timestamp_field)
    }

    /// Documents of `current` stamped inside `range`.
    pub fn change_history(
        &self,
        current: &dyn DocBackend,
        range: &TimestampRange,
    ) -> SyncResult<Vec<StampedDoc>> {
        change_history(current, &self.config.timestamp_field, range)
    }
}

/// Visit every document of `current` in id order with its `field` value
/// rendered as text; `None` when absent or null.
fn scan_stamps(
    current: &dyn DocBackend,
    field: &str,
    mut visit: impl FnMut(DocId, Option<String>) -> SyncResult<()>,
) -> SyncResult<()> {
    for page in current.id_pages(DEFAULT_ID_PAGE) {
        let ids = page?;
        for doc in current.get_many(&ids)?.into_iter().flatten() {
            let stamp = match doc.get(field) {
                Some(Value::String(ts)) => Some(ts.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            visit(doc.id, stamp)?;
        }
    }
    Ok(())
}

/// Count documents of `current` per distinct value of `field`, newest first.
pub fn timestamp_stats(current: &dyn DocBackend, field: &str) -> SyncResult<TimestampStats> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut unstamped = 0;
    scan_stamps(current, field, |_, stamp| {
        match stamp {
            Some(ts) => *counts.entry(ts).or_default() += 1,
            None => unstamped += 1,
        }
        Ok(())
    })?;
    Ok(TimestampStats {
        by_timestamp: counts.into_iter().rev().collect(),
        unstamped,
    })
}

/// Documents of `current` whose `field` falls inside `range`, in id order.
/// Unstamped documents are never part of a history.
pub fn change_history(
    current: &dyn DocBackend,
    field: &str,
    range: &TimestampRange,
) -> SyncResult<Vec<StampedDoc>> {
    let mut found = Vec::new();
    scan_stamps(current, field, |id, stamp| {
        if let Some(timestamp) = stamp.filter(|ts| range.contains(ts)) {
            found.push(StampedDoc { id, timestamp });
        }
        Ok(())
    })?;
    debug!(target = current.name(), matched = found.len(), "change history");
    Ok(found)
}

/// Write `<id>\t<timestamp>` for every document of `current`, in id order,
/// and return the number of lines. Unstamped documents get an empty
/// timestamp column.
pub fn dump_timestamps(
    current: &dyn DocBackend,
    field: &str,
    out: &mut dyn Write,
) -> SyncResult<u64> {
    let mut lines = 0;
    scan_stamps(current, field, |id, stamp| {
        writeln!(out, "{id}\t{}", stamp.unwrap_or_default())?;
        lines += 1;
        Ok(())
    })?;
    out.flush()?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::SyncApplier;
    use crate::fixtures::{generation, new_docs, old_docs};
    use genedoc_diff::DiffEngine;
    use genedoc_store::InMemoryBackend;
    use genedoc_types::Document;

    #[test]
    fn applied_change_set_verifies() {
        let current = InMemoryBackend::with_documents("mygene_current", old_docs());
        let new = InMemoryBackend::with_documents(generation().name(), new_docs());
        let changes = DiffEngine::default().diff(&current, &new, &generation()).unwrap();
        let applied = SyncApplier::default().apply(&changes, &new, &current).unwrap();

        let report = SyncVerifier::default().verify(&changes, &current, &applied).unwrap();
        assert!(report.is_valid(), "{:?}", report);
        assert_eq!(report.checks.len(), 4);
    }

    #[test]
    fn tampering_is_reported_not_repaired() {
        let current = InMemoryBackend::with_documents("mygene_current", old_docs());
        let new = InMemoryBackend::with_documents(generation().name(), new_docs());
        let changes = DiffEngine::default().diff(&current, &new, &generation()).unwrap();
        let applied = SyncApplier::default().apply(&changes, &new, &current).unwrap();

        current.remove_many(&["3".into()]).unwrap();
        current.insert(&[Document::empty("1")]).unwrap();

        let report = SyncVerifier::default().verify(&changes, &current, &applied).unwrap();
        assert!(!report.is_valid());
        let failed: Vec<&str> = report.failed().map(|c| c.name).collect();
        assert_eq!(failed, vec!["add", "delete", "stamped"]);
        assert!(report.violations.iter().any(|v| v == "add 3: missing"));
        assert!(report.violations.iter().any(|v| v == "delete 1: still present"));
        assert!(current.get(&"3".into()).unwrap().is_none());
    }

    fn stamped_current() -> InMemoryBackend {
        InMemoryBackend::with_documents(
            "mygene_current",
            [
                Document::empty("1").with_field("_timestamp", "2013-04-01T00:00:00Z"),
                Document::empty("2").with_field("_timestamp", "2013-04-15T00:00:00Z"),
                Document::empty("3").with_field("_timestamp", "2013-04-08T00:00:00Z"),
                Document::empty("4"),
            ],
        )
    }

    #[test]
    fn history_selects_by_range() {
        let current = stamped_current();
        let verifier = SyncVerifier::default();
        let since = TimestampRange::default().after("2013-04-01T00:00:00Z");
        let ids: Vec<String> = verifier
            .change_history(&current, &since)
            .unwrap()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);

        let window = since.before("2013-04-15T00:00:00Z");
        let hits = verifier.change_history(&current, &window).unwrap();
        assert_eq!(
            hits,
            vec![StampedDoc {
                id: "3".into(),
                timestamp: "2013-04-08T00:00:00Z".into()
            }]
        );
        assert_eq!(verifier.change_history(&current, &TimestampRange::default()).unwrap().len(), 3);
    }

    #[test]
    fn dump_lists_every_document() {
        let current = stamped_current();
        let mut out = Vec::new();
        let lines = dump_timestamps(&current, "_timestamp", &mut out).unwrap();
        assert_eq!(lines, 4);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1\t2013-04-01T00:00:00Z\n2\t2013-04-15T00:00:00Z\n3\t2013-04-08T00:00:00Z\n4\t\n"
        );
    }

    #[test]
    fn stats_newest_first() {
        let current = InMemoryBackend::with_documents(
            "mygene_current",
            [
                Document::empty("1").with_field("_timestamp", "2013-04-01T00:00:00Z"),
                Document::empty("2").with_field("_timestamp", "2013-04-15T00:00:00Z"),
                Document::empty("3").with_field("_timestamp", "2013-04-15T00:00:00Z"),
                Document::empty("4"),
            ],
        );
        let stats = SyncVerifier::default().timestamp_stats(&current).unwrap();
        assert_eq!(
            stats.by_timestamp,
            vec![
                ("2013-04-15T00:00:00Z".to_string(), 2),
                ("2013-04-01T00:00:00Z".to_string(), 1),
            ]
        );
        assert_eq!(stats.unstamped, 1);
        assert_eq!(stats.latest(), Some("2013-04-15T00:00:00Z"));
        assert_eq!(stats.total(), 4);
    }
}
