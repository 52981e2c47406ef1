//! Change sets between two generations of the merged collection.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::id::DocId;

/// Field-level difference of one document present in both generations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocDiff {
    #[serde(rename = "_id")]
    pub id: DocId,
    /// Fields present only in the new document, with their new values.
    #[serde(default)]
    pub added_fields: Fields,
    /// Names of fields present only in the old document.
    #[serde(default)]
    pub removed_field_names: Vec<String>,
    /// Fields present in both with unequal values, with their new values.
    #[serde(default)]
    pub changed_fields: Fields,
}

impl DocDiff {
    pub fn is_empty(&self) -> bool {
        self.added_fields.is_empty()
            && self.removed_field_names.is_empty()
            && self.changed_fields.is_empty()
    }

    /// Fields to write when applying this diff: added and changed.
    pub fn set_fields(&self) -> Fields {
        let mut set = self.added_fields.clone();
        set.extend(self.changed_fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        set
    }
}

/// Add/delete/update description of the difference between the published
/// collection and a newer generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Collection name of the generation the change set was computed from.
    pub source: String,
    /// Generation timestamp stamped onto every added or updated document.
    pub timestamp: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
    pub add: Vec<DocId>,
    pub delete: Vec<DocId>,
    pub update: Vec<DocDiff>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty() && self.update.is_empty()
    }

    /// Total number of document-level changes.
    pub fn len(&self) -> usize {
        self.add.len() + self.delete.len() + self.update.len()
    }

    /// The value written into the timestamp field of touched documents.
    pub fn stamp_value(&self) -> Value {
        Value::String(self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn updated_ids(&self) -> impl Iterator<Item = &DocId> {
        self.update.iter().map(|d| &d.id)
    }

    /// Ids expected to carry this change set's timestamp after applying it.
    pub fn stamped_ids(&self) -> BTreeSet<&DocId> {
        self.add.iter().chain(self.updated_ids()).collect()
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary {
            source: self.source.clone(),
            timestamp: self.timestamp,
            adds: self.add.len(),
            deletes: self.delete.len(),
            updates: self.update.len(),
            ..ChangeSummary::default()
        };
        for diff in &self.update {
            summary.fields_added.extend(diff.added_fields.keys().cloned());
            summary
                .fields_removed
                .extend(diff.removed_field_names.iter().cloned());
            summary.fields_changed.extend(diff.changed_fields.keys().cloned());
        }
        summary
    }
}

/// Counts and touched field names of a change set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub adds: usize,
    pub deletes: usize,
    pub updates: usize,
    pub fields_added: BTreeSet<String>,
    pub fields_removed: BTreeSet<String>,
    pub fields_changed: BTreeSet<String>,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "source: {}", self.source)?;
        writeln!(f, "timestamp: {}", self.timestamp.format("%Y-%m-%d"))?;
        writeln!(f, "add: {}", self.adds)?;
        writeln!(f, "delete: {}", self.deletes)?;
        writeln!(f, "update: {}", self.updates)?;
        let groups = [
            ("add", &self.fields_added),
            ("delete", &self.fields_removed),
            ("update", &self.fields_changed),
        ];
        for (label, names) in groups {
            let joined: Vec<&str> = names.iter().map(String::as_str).collect();
            writeln!(f, "\t{label}: {} {}", names.len(), joined.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn sample() -> ChangeSet {
        ChangeSet {
            source: "b_20130415_aaaaaaaa".into(),
            timestamp: Utc.with_ymd_and_hms(2013, 4, 15, 0, 0, 0).unwrap(),
            computed_at: Utc.with_ymd_and_hms(2013, 4, 16, 8, 30, 0).unwrap(),
            add: vec!["3".into()],
            delete: vec!["1".into()],
            update: vec![DocDiff {
                id: "2".into(),
                added_fields: fields(json!({"go": ["GO:1"]})),
                removed_field_names: vec!["pir".into()],
                changed_fields: fields(json!({"a": 99})),
            }],
        }
    }

    #[test]
    fn empty_diff() {
        assert!(DocDiff {
            id: "x".into(),
            ..DocDiff::default()
        }
        .is_empty());
    }

    #[test]
    fn set_fields_merges_added_and_changed() {
        let cs = sample();
        let set = cs.update[0].set_fields();
        assert_eq!(set.len(), 2);
        assert_eq!(set["a"], json!(99));
    }

    #[test]
    fn summary_collects_field_names() {
        let s = sample().summary();
        assert_eq!((s.adds, s.deletes, s.updates), (1, 1, 1));
        assert!(s.fields_added.contains("go"));
        assert!(s.fields_removed.contains("pir"));
        assert!(s.fields_changed.contains("a"));
        assert!(s.to_string().contains("add: 1"));
    }

    #[test]
    fn stamp_is_stable_rfc3339() {
        assert_eq!(sample().stamp_value(), json!("2013-04-15T00:00:00Z"));
    }

    #[test]
    fn stamped_ids_cover_add_and_update() {
        let cs = sample();
        let ids: Vec<&str> = cs.stamped_ids().into_iter().map(DocId::as_str).collect();
        assert_eq!(ids, vec!["2", "3"]);
    }

    #[test]
    fn json_roundtrip() {
        let cs = sample();
        let json = serde_json::to_string(&cs).unwrap();
        let back: ChangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
        assert_eq!(cs.len(), 3);
    }
}
