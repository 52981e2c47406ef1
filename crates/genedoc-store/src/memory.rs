use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use genedoc_types::{DocId, Document, Fields};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{DocBackend, DocPatch, UpdateOutcome};

type DocMap = BTreeMap<DocId, Fields>;

/// In-memory, BTreeMap-based collection.
///
/// Intended for tests and small builds. Documents live behind a `RwLock`
/// and are cloned on read and write. The ordered map gives `ids_after`
/// pagination for free.
pub struct InMemoryBackend {
    name: String,
    docs: RwLock<DocMap>,
    schema: RwLock<Option<Fields>>,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
            schema: RwLock::new(None),
        }
    }

    /// Pre-populated collection, for tests and fixtures.
    pub fn with_documents(
        name: impl Into<String>,
        docs: impl IntoIterator<Item = Document>,
    ) -> Self {
        let map = docs.into_iter().map(|d| (d.id, d.fields)).collect();
        Self {
            name: name.into(),
            docs: RwLock::new(map),
            schema: RwLock::new(None),
        }
    }

    /// Schema passed to the last `prepare`, if any.
    pub fn schema(&self) -> StoreResult<Option<Fields>> {
        let schema = self
            .schema
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(schema.clone())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, DocMap>> {
        self.docs
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("{}: {e}", self.name)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, DocMap>> {
        self.docs
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("{}: {e}", self.name)))
    }
}

impl DocBackend for InMemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, schema: &Fields) -> StoreResult<()> {
        let mut slot = self
            .schema
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        *slot = Some(schema.clone());
        Ok(())
    }

    fn insert(&self, docs: &[Document]) -> StoreResult<()> {
        let mut map = self.write()?;
        let mut batch = BTreeSet::new();
        for doc in docs {
            if map.contains_key(&doc.id) || !batch.insert(&doc.id) {
                return Err(StoreError::DuplicateId {
                    collection: self.name.clone(),
                    id: doc.id.clone(),
                });
            }
        }
        for doc in docs {
            map.insert(doc.id.clone(), doc.fields.clone());
        }
        debug!(collection = %self.name, inserted = docs.len(), "memory insert");
        Ok(())
    }

    fn update(&self, id: &DocId, patch: &DocPatch) -> StoreResult<UpdateOutcome> {
        let mut map = self.write()?;
        let Some(fields) = map.get_mut(id) else {
            return Ok(UpdateOutcome::Missing);
        };
        Ok(if patch.apply_to(fields, true) {
            UpdateOutcome::Modified
        } else {
            UpdateOutcome::Unchanged
        })
    }

    fn drop_collection(&self) -> StoreResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn ids_after(&self, after: Option<&DocId>, limit: usize) -> StoreResult<Vec<DocId>> {
        let map = self.read()?;
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(map
            .range::<DocId, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn get(&self, id: &DocId) -> StoreResult<Option<Document>> {
        let map = self.read()?;
        Ok(map
            .get(id)
            .map(|fields| Document::new(id.clone(), fields.clone())))
    }

    fn get_many(&self, ids: &[DocId]) -> StoreResult<Vec<Option<Document>>> {
        let map = self.read()?;
        Ok(ids
            .iter()
            .map(|id| map.get(id).map(|f| Document::new(id.clone(), f.clone())))
            .collect())
    }

    fn remove_many(&self, ids: &[DocId]) -> StoreResult<usize> {
        let mut map = self.write()?;
        Ok(ids.iter().filter(|id| map.remove(*id).is_some()).count())
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.read()?.len() as u64)
    }

    fn finalize(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.docs.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("InMemoryBackend")
            .field("name", &self.name)
            .field("document_count", &count)
            .finish()
    }
}

/// A set of named in-memory collections sharing one process.
///
/// Handing out the same collection twice returns the same `Arc`, so writes
/// through one handle are visible through the other.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<BTreeMap<String, Arc<InMemoryBackend>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> StoreResult<Arc<InMemoryBackend>> {
        let mut map = self
            .collections
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(map
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryBackend::new(name)))
            .clone())
    }

    /// Names of collections holding at least one document.
    pub fn collections(&self) -> StoreResult<Vec<String>> {
        let map = self
            .collections
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let mut names = Vec::new();
        for (name, backend) in map.iter() {
            if backend.count()? > 0 {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, symbol: &str) -> Document {
        Document::empty(id).with_field("symbol", symbol)
    }

    #[test]
    fn duplicate_insert_writes_nothing() {
        let backend = InMemoryBackend::new("c");
        backend.insert(&[doc("1", "a")]).unwrap();
        let err = backend.insert(&[doc("2", "b"), doc("1", "a")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
        assert_eq!(backend.count().unwrap(), 1);
    }

    #[test]
    fn duplicate_within_batch_is_rejected() {
        let backend = InMemoryBackend::new("c");
        assert!(backend.insert(&[doc("1", "a"), doc("1", "b")]).is_err());
        assert_eq!(backend.count().unwrap(), 0);
    }

    #[test]
    fn prepare_keeps_schema() {
        let backend = InMemoryBackend::new("c");
        let schema = json!({"dynamic": false}).as_object().cloned().unwrap();
        backend.prepare(&schema).unwrap();
        assert_eq!(backend.schema().unwrap(), Some(schema));
    }

    #[test]
    fn storage_shares_collections() {
        let storage = MemoryStorage::new();
        storage.collection("a").unwrap().insert(&[doc("1", "x")]).unwrap();
        assert_eq!(storage.collection("a").unwrap().count().unwrap(), 1);
        storage.collection("empty").unwrap();
        assert_eq!(storage.collections().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn debug_shows_count() {
        let backend = InMemoryBackend::with_documents("c", [doc("1", "a")]);
        assert!(format!("{backend:?}").contains("document_count: 1"));
    }
}
