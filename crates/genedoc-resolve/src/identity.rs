use std::collections::HashMap;

use genedoc_types::DocId;
use serde::{Deserialize, Serialize};

use crate::retire::RetireMap;

/// What to do when one secondary id has several canonical targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
    /// Keep every distinct target; a source document fans out to all of them.
    #[default]
    KeepAll,
    /// Keep only the target listed last.
    LastWins,
}

/// Secondary id -> canonical id(s) for one id space.
#[derive(Clone, Debug, Default)]
pub struct IdentityMap {
    targets: HashMap<DocId, Vec<DocId>>,
    policy: MappingPolicy,
}

impl IdentityMap {
    /// Build from `(secondary, canonical)` pairs. Canonical ids that were
    /// retired are replaced by their current id. Pairs whose canonical id is
    /// neither live nor retired into a live id are stale and skipped before
    /// the policy sees them.
    pub fn build(
        pairs: impl IntoIterator<Item = (DocId, DocId)>,
        retire: &RetireMap,
        policy: MappingPolicy,
    ) -> Self {
        let mut targets: HashMap<DocId, Vec<DocId>> = HashMap::new();
        for (secondary, canonical) in pairs {
            let Some(canonical) = retire.resolve(&canonical).cloned() else {
                continue;
            };
            let slot = targets.entry(secondary).or_default();
            match policy {
                MappingPolicy::KeepAll => {
                    if !slot.contains(&canonical) {
                        slot.push(canonical);
                    }
                }
                MappingPolicy::LastWins => {
                    slot.clear();
                    slot.push(canonical);
                }
            }
        }
        Self { targets, policy }
    }

    /// Canonical ids for `id`; empty if unmapped.
    pub fn translate(&self, id: &DocId) -> &[DocId] {
        self.targets.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &DocId) -> bool {
        self.targets.contains_key(id)
    }

    pub fn policy(&self) -> MappingPolicy {
        self.policy
    }

    /// Number of mapped secondary ids.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Secondary ids mapped to more than one canonical id.
    pub fn one_to_many(&self) -> usize {
        self.targets.values().filter(|t| t.len() > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(v: &[(&str, &str)]) -> Vec<(DocId, DocId)> {
        v.iter().map(|(a, b)| (DocId::from(*a), DocId::from(*b))).collect()
    }

    fn translated(map: &IdentityMap, id: &str) -> Vec<String> {
        map.translate(&id.into()).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn keep_all_fans_out() {
        let retire = RetireMap::new(["1", "2"].map(DocId::from), Vec::new());
        let map = IdentityMap::build(
            pairs(&[("X", "1"), ("X", "2"), ("X", "1")]),
            &retire,
            MappingPolicy::KeepAll,
        );
        assert_eq!(translated(&map, "X"), vec!["1", "2"]);
        assert_eq!(map.one_to_many(), 1);
    }

    #[test]
    fn last_wins_collapses() {
        let retire = RetireMap::new(["1", "2"].map(DocId::from), Vec::new());
        let map = IdentityMap::build(
            pairs(&[("X", "1"), ("X", "2")]),
            &retire,
            MappingPolicy::LastWins,
        );
        assert_eq!(translated(&map, "X"), vec!["2"]);
    }

    #[test]
    fn retired_targets_are_normalized() {
        let retire = RetireMap::new(["7"].map(DocId::from), pairs(&[("3", "7")]));
        let map = IdentityMap::build(pairs(&[("X", "3"), ("Y", "99")]), &retire, MappingPolicy::KeepAll);
        assert_eq!(translated(&map, "X"), vec!["7"]);
        assert!(map.translate(&"Y".into()).is_empty());
        assert!(!map.contains(&"Y".into()));
        assert!(map.translate(&"Z".into()).is_empty());
    }

    #[test]
    fn stale_pair_never_wins() {
        let retire = RetireMap::new(["1"].map(DocId::from), Vec::new());
        let map = IdentityMap::build(
            pairs(&[("X", "1"), ("X", "404")]),
            &retire,
            MappingPolicy::LastWins,
        );
        assert_eq!(translated(&map, "X"), vec!["1"]);
    }
}
