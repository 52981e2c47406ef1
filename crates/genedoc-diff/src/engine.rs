//! Collection-level diff between the published collection and a new
//! generation.

use std::collections::BTreeSet;

use chrono::Utc;
use genedoc_store::{DocBackend, DocBackendExt};
use genedoc_types::{ChangeSet, DocDiff, DocId, GenerationId};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::DiffConfig;
use crate::doc_diff::diff_docs;
use crate::error::{DiffError, DiffResult};

/// Classification of every id of two collections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollectionDiff {
    /// Ids only in the new collection, sorted.
    pub add: Vec<DocId>,
    /// Ids only in the old collection, sorted.
    pub delete: Vec<DocId>,
    /// Non-empty diffs of ids in both, sorted by id.
    pub update: Vec<DocDiff>,
    /// Ids in both whose documents compare equal.
    pub unchanged: usize,
}

impl CollectionDiff {
    pub fn into_change_set(self, generation: &GenerationId) -> ChangeSet {
        ChangeSet {
            source: generation.name(),
            timestamp: generation.timestamp(),
            computed_at: Utc::now(),
            add: self.add,
            delete: self.delete,
            update: self.update,
        }
    }
}

/// Computes change sets through the [`DocBackend`] contract only.
#[derive(Clone, Debug, Default)]
pub struct DiffEngine {
    config: DiffConfig,
}

impl DiffEngine {
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Change set taking `old` (the published collection) to `new`, which
    /// holds `generation`.
    pub fn diff(
        &self,
        old: &dyn DocBackend,
        new: &dyn DocBackend,
        generation: &GenerationId,
    ) -> DiffResult<ChangeSet> {
        let diff = self.compare(old, new)?;
        Ok(diff.into_change_set(generation))
    }

    /// Classify every id of `old` and `new`.
    pub fn compare(&self, old: &dyn DocBackend, new: &dyn DocBackend) -> DiffResult<CollectionDiff> {
        let old_ids: BTreeSet<DocId> = old.id_list()?.into_iter().collect();
        let new_ids: BTreeSet<DocId> = new.id_list()?.into_iter().collect();
        info!(
            old = old.name(),
            new = new.name(),
            old_count = old_ids.len(),
            new_count = new_ids.len(),
            "comparing collections"
        );

        let add: Vec<DocId> = new_ids.difference(&old_ids).cloned().collect();
        let delete: Vec<DocId> = old_ids.difference(&new_ids).cloned().collect();
        let common: Vec<DocId> = old_ids.intersection(&new_ids).cloned().collect();

        let chunk_size = self.config.chunk_size.max(1);
        let chunks: Vec<&[DocId]> = common.chunks(chunk_size).collect();
        let per_chunk: Vec<Vec<DocDiff>> = if self.config.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .thread_name(|i| format!("genedoc-diff-{i}"))
                .build()
                .map_err(|e| DiffError::WorkerPool(e.to_string()))?;
            pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| self.diff_chunk(chunk, old, new))
                    .collect::<DiffResult<Vec<_>>>()
            })?
        } else {
            chunks
                .iter()
                .map(|chunk| self.diff_chunk(chunk, old, new))
                .collect::<DiffResult<Vec<_>>>()?
        };

        let mut update: Vec<DocDiff> = per_chunk.into_iter().flatten().collect();
        update.sort_by(|a, b| a.id.cmp(&b.id));
        let unchanged = common.len() - update.len();
        info!(
            add = add.len(),
            delete = delete.len(),
            update = update.len(),
            unchanged,
            "diff computed"
        );
        Ok(CollectionDiff {
            add,
            delete,
            update,
            unchanged,
        })
    }

    /// Diff one chunk of ids present in both collections.
    fn diff_chunk(
        &self,
        ids: &[DocId],
        old: &dyn DocBackend,
        new: &dyn DocBackend,
    ) -> DiffResult<Vec<DocDiff>> {
        let old_docs = old.get_many(ids)?;
        let new_docs = new.get_many(ids)?;
        let vanished = |backend: &dyn DocBackend, id: &DocId| DiffError::Vanished {
            collection: backend.name().to_string(),
            id: id.clone(),
        };

        let mut diffs = Vec::new();
        for ((id, o), n) in ids.iter().zip(old_docs).zip(new_docs) {
            let o = o.ok_or_else(|| vanished(old, id))?;
            let n = n.ok_or_else(|| vanished(new, id))?;
            if let Some(diff) = diff_docs(id, &o.fields, &n.fields, &self.config.ignore_fields) {
                diffs.push(diff);
            }
        }
        debug!(ids = ids.len(), changed = diffs.len(), "chunk compared");
        Ok(diffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use genedoc_store::InMemoryBackend;
    use genedoc_types::Document;
    use proptest::prelude::*;
    use serde_json::json;

    fn generation() -> GenerationId {
        let date = NaiveDate::from_ymd_opt(2013, 4, 15).unwrap();
        GenerationId::with_suffix("mygene", date, "aaaaaaaa").unwrap()
    }

    #[test]
    fn old_and_new_generation() {
        let old = InMemoryBackend::with_documents(
            "mygene_current",
            [
                Document::empty("1").with_field("a", 1),
                Document::empty("2").with_field("a", 2),
            ],
        );
        let new = InMemoryBackend::with_documents(
            "mygene_20130415_aaaaaaaa",
            [
                Document::empty("2").with_field("a", 99),
                Document::empty("3").with_field("a", 3),
            ],
        );

        let changes = DiffEngine::default().diff(&old, &new, &generation()).unwrap();
        assert_eq!(changes.add, vec![DocId::from("3")]);
        assert_eq!(changes.delete, vec![DocId::from("1")]);
        assert_eq!(changes.update.len(), 1);
        assert_eq!(changes.update[0].id, DocId::from("2"));
        assert_eq!(changes.update[0].changed_fields["a"], json!(99));
        assert!(changes.update[0].added_fields.is_empty());
        assert_eq!(changes.source, "mygene_20130415_aaaaaaaa");
        assert_eq!(changes.stamp_value(), json!("2013-04-15T00:00:00Z"));
    }

    #[test]
    fn identical_collections_are_empty() {
        let docs = || (0..20).map(|i| Document::empty(i as u64).with_field("n", i));
        let old = InMemoryBackend::with_documents("old", docs());
        let new = InMemoryBackend::with_documents("new", docs());
        let diff = DiffEngine::default().compare(&old, &new).unwrap();
        assert!(diff.add.is_empty() && diff.delete.is_empty() && diff.update.is_empty());
        assert_eq!(diff.unchanged, 20);
    }

    #[test]
    fn stamped_current_compares_clean() {
        let old = InMemoryBackend::with_documents(
            "current",
            [Document::empty("1")
                .with_field("a", 1)
                .with_field("_timestamp", "2013-04-01T00:00:00Z")],
        );
        let new = InMemoryBackend::with_documents("new", [Document::empty("1").with_field("a", 1)]);
        let diff = DiffEngine::default().compare(&old, &new).unwrap();
        assert!(diff.update.is_empty());

        let strict = DiffEngine::new(DiffConfig::default().ignoring(Vec::<String>::new()));
        let diff = strict.compare(&old, &new).unwrap();
        assert_eq!(diff.update[0].removed_field_names, vec!["_timestamp".to_string()]);
    }

    #[test]
    fn diffs_across_backend_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = genedoc_store::DocStore::open(dir.path().join("genedoc.redb")).unwrap();
        let current = store.collection("mygene_current");
        current
            .insert(&[Document::empty("1").with_field("a", 1)])
            .unwrap();
        let new = InMemoryBackend::with_documents("new", [Document::empty("1").with_field("a", 2)]);
        let diff = DiffEngine::default().compare(&current, &new).unwrap();
        assert_eq!(diff.update.len(), 1);
    }

    fn collection() -> impl Strategy<Value = Vec<(u8, u8, Option<u8>)>> {
        prop::collection::vec((0u8..40, 0u8..4, prop::option::of(0u8..3)), 0..40)
    }

    fn backend(name: &str, rows: &[(u8, u8, Option<u8>)]) -> InMemoryBackend {
        let mut docs = std::collections::BTreeMap::new();
        for (id, a, b) in rows {
            let mut doc = Document::empty(*id as u64).with_field("a", *a);
            if let Some(b) = b {
                doc = doc.with_field("b", *b);
            }
            docs.insert(*id, doc);
        }
        InMemoryBackend::with_documents(name, docs.into_values())
    }

    proptest! {
        #[test]
        fn parallel_matches_sequential(old in collection(), new in collection()) {
            let old = backend("old", &old);
            let new = backend("new", &new);
            let sequential = DiffEngine::new(DiffConfig::default().with_chunk_size(3))
                .compare(&old, &new)
                .unwrap();
            let parallel = DiffEngine::new(DiffConfig::default().with_chunk_size(2).with_workers(4))
                .compare(&old, &new)
                .unwrap();
            prop_assert_eq!(&sequential, &parallel);
        }

        #[test]
        fn every_id_classified_once(old in collection(), new in collection()) {
            let old = backend("old", &old);
            let new = backend("new", &new);
            let diff = DiffEngine::new(DiffConfig::default().with_chunk_size(5))
                .compare(&old, &new)
                .unwrap();

            let old_ids: BTreeSet<DocId> = old.id_list().unwrap().into_iter().collect();
            let new_ids: BTreeSet<DocId> = new.id_list().unwrap().into_iter().collect();
            let union: BTreeSet<&DocId> = old_ids.union(&new_ids).collect();

            let mut seen = BTreeSet::new();
            for id in diff.add.iter().chain(&diff.delete).chain(diff.update.iter().map(|d| &d.id)) {
                prop_assert!(seen.insert(id));
            }
            prop_assert_eq!(seen.len() + diff.unchanged, union.len());
            for id in &diff.add {
                prop_assert!(new_ids.contains(id) && !old_ids.contains(id));
            }
            for id in &diff.delete {
                prop_assert!(old_ids.contains(id) && !new_ids.contains(id));
            }
        }
    }
}
