//! Search-index backend.
//!
//! Mirrors the visibility model of a near-real-time search engine: writes
//! land in a pending buffer and become searchable only after a refresh
//! (`finalize`). Reads by id, id listing and counts see the refreshed state.
//! Updates resolve against the real-time view so a merge pass can patch
//! documents inserted moments earlier. A refresh can persist the index as a
//! JSON snapshot next to its siblings.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use genedoc_types::{DocId, Document, Fields};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DocBackend, DocPatch, UpdateOutcome};

const SNAPSHOT_EXT: &str = "json";

#[derive(Default)]
struct IndexState {
    visible: BTreeMap<DocId, Fields>,
    /// `None` marks a pending deletion.
    pending: BTreeMap<DocId, Option<Fields>>,
    mapping: Option<Fields>,
}

impl IndexState {
    /// Real-time lookup: pending writes shadow refreshed state.
    fn live(&self, id: &DocId) -> Option<&Fields> {
        match self.pending.get(id) {
            Some(slot) => slot.as_ref(),
            None => self.visible.get(id),
        }
    }

    fn refresh(&mut self) -> usize {
        let applied = self.pending.len();
        for (id, slot) in std::mem::take(&mut self.pending) {
            match slot {
                Some(fields) => {
                    self.visible.insert(id, fields);
                }
                None => {
                    self.visible.remove(&id);
                }
            }
        }
        applied
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    mapping: Option<Fields>,
    docs: Vec<Document>,
}

/// One index of a [`SearchCluster`].
pub struct SearchIndexBackend {
    name: String,
    path: Option<PathBuf>,
    state: RwLock<IndexState>,
}

impl SearchIndexBackend {
    /// A volatile index with no snapshot file.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// An index persisted at `path`, loading the snapshot if one exists.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> StoreResult<Self> {
        let name = name.into();
        let path = path.into();
        let mut state = IndexState::default();
        if path.exists() {
            let bytes = fs::read(&path)?;
            let snapshot: Snapshot =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptDocument {
                    location: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            state.mapping = snapshot.mapping;
            state.visible = snapshot
                .docs
                .into_iter()
                .map(|d| (d.id, d.fields))
                .collect();
            debug!(index = %name, docs = state.visible.len(), "loaded index snapshot");
        }
        Ok(Self {
            name,
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Mapping declared by the last `prepare`.
    pub fn mapping(&self) -> StoreResult<Option<Fields>> {
        Ok(self.read()?.mapping.clone())
    }

    /// Number of writes waiting for a refresh.
    pub fn pending_len(&self) -> StoreResult<usize> {
        Ok(self.read()?.pending.len())
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("{}: {e}", self.name)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("{}: {e}", self.name)))
    }

    fn persist(&self, path: &Path, state: &IndexState) -> StoreResult<()> {
        let snapshot = Snapshot {
            mapping: state.mapping.clone(),
            docs: state
                .visible
                .iter()
                .map(|(id, f)| Document::new(id.clone(), f.clone()))
                .collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

impl DocBackend for SearchIndexBackend {
    fn kind(&self) -> &'static str {
        "search"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, schema: &Fields) -> StoreResult<()> {
        self.write()?.mapping = Some(schema.clone());
        Ok(())
    }

    fn insert(&self, docs: &[Document]) -> StoreResult<()> {
        let mut state = self.write()?;
        for doc in docs {
            state.pending.insert(doc.id.clone(), Some(doc.fields.clone()));
        }
        debug!(index = %self.name, queued = docs.len(), "search insert");
        Ok(())
    }

    fn update(&self, id: &DocId, patch: &DocPatch) -> StoreResult<UpdateOutcome> {
        let mut state = self.write()?;
        let Some(current) = state.live(id) else {
            return Ok(UpdateOutcome::Missing);
        };
        let mut fields = current.clone();
        if !patch.apply_to(&mut fields, false) {
            return Ok(UpdateOutcome::Unchanged);
        }
        state.pending.insert(id.clone(), Some(fields));
        Ok(UpdateOutcome::Modified)
    }

    fn drop_collection(&self) -> StoreResult<()> {
        let mut state = self.write()?;
        state.visible.clear();
        state.pending.clear();
        state.mapping = None;
        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn ids_after(&self, after: Option<&DocId>, limit: usize) -> StoreResult<Vec<DocId>> {
        let state = self.read()?;
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        Ok(state
            .visible
            .range::<DocId, _>((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn get(&self, id: &DocId) -> StoreResult<Option<Document>> {
        let state = self.read()?;
        Ok(state
            .visible
            .get(id)
            .map(|f| Document::new(id.clone(), f.clone())))
    }

    fn get_many(&self, ids: &[DocId]) -> StoreResult<Vec<Option<Document>>> {
        let state = self.read()?;
        Ok(ids
            .iter()
            .map(|id| {
                state
                    .visible
                    .get(id)
                    .map(|f| Document::new(id.clone(), f.clone()))
            })
            .collect())
    }

    fn remove_many(&self, ids: &[DocId]) -> StoreResult<usize> {
        let mut state = self.write()?;
        let mut removed = 0;
        for id in ids {
            if state.live(id).is_some() {
                removed += 1;
            }
            state.pending.insert(id.clone(), None);
        }
        Ok(removed)
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.read()?.visible.len() as u64)
    }

    fn finalize(&self) -> StoreResult<()> {
        let mut state = self.write()?;
        let applied = state.refresh();
        if let Some(path) = &self.path {
            self.persist(path, &state)?;
        }
        info!(index = %self.name, applied, docs = state.visible.len(), "search refresh");
        Ok(())
    }

    fn supports_unset(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for SearchIndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexBackend")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// A set of named indices, optionally persisted under one directory as
/// `<index>.json` snapshots.
#[derive(Debug, Default)]
pub struct SearchCluster {
    root: Option<PathBuf>,
    indices: RwLock<BTreeMap<String, Arc<SearchIndexBackend>>>,
}

impl SearchCluster {
    /// A cluster that lives only in memory.
    pub fn volatile() -> Self {
        Self::default()
    }

    /// A cluster persisted under `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root: Some(root),
            indices: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn index(&self, name: &str) -> StoreResult<Arc<SearchIndexBackend>> {
        let mut indices = self
            .indices
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if let Some(index) = indices.get(name) {
            return Ok(Arc::clone(index));
        }
        let index = match &self.root {
            Some(root) => {
                SearchIndexBackend::open(name, root.join(format!("{name}.{SNAPSHOT_EXT}")))?
            }
            None => SearchIndexBackend::new(name),
        };
        let index = Arc::new(index);
        indices.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    /// Names of indices that hold documents or have a snapshot on disk.
    pub fn indices(&self) -> StoreResult<Vec<String>> {
        let mut names = std::collections::BTreeSet::new();
        if let Some(root) = &self.root {
            for entry in fs::read_dir(root)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXT) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.insert(stem.to_string());
                    }
                }
            }
        }
        let indices = self
            .indices
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        for (name, index) in indices.iter() {
            if index.count()? > 0 {
                names.insert(name.clone());
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_are_invisible_until_refresh() {
        let index = SearchIndexBackend::new("genes");
        index.insert(&[Document::empty("1")]).unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert!(index.get(&"1".into()).unwrap().is_none());
        assert_eq!(index.pending_len().unwrap(), 1);
        index.finalize().unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn update_sees_pending_insert() {
        let index = SearchIndexBackend::new("genes");
        index.insert(&[Document::empty("1")]).unwrap();
        let patch = DocPatch::default().with_field("symbol", "CDK2");
        assert_eq!(index.update(&"1".into(), &patch).unwrap(), UpdateOutcome::Modified);
        index.finalize().unwrap();
        let doc = index.get(&"1".into()).unwrap().unwrap();
        assert_eq!(doc.fields["symbol"], "CDK2");
    }

    #[test]
    fn unset_is_ignored() {
        let index = SearchIndexBackend::new("genes");
        index
            .insert(&[Document::empty("1").with_field("pir", "x")])
            .unwrap();
        index.finalize().unwrap();
        let patch = DocPatch::default().with_unset(["pir"]);
        assert_eq!(index.update(&"1".into(), &patch).unwrap(), UpdateOutcome::Unchanged);
        assert!(!index.supports_unset());
    }

    #[test]
    fn insert_overwrites() {
        let index = SearchIndexBackend::new("genes");
        index.insert(&[Document::empty("1").with_field("a", 1)]).unwrap();
        index.insert(&[Document::empty("1").with_field("a", 2)]).unwrap();
        index.finalize().unwrap();
        assert_eq!(index.get(&"1".into()).unwrap().unwrap().fields["a"], 2);
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cluster = SearchCluster::open(dir.path()).unwrap();
            let index = cluster.index("mygene_current").unwrap();
            index.insert(&[Document::empty("1017")]).unwrap();
            index.finalize().unwrap();
        }
        let cluster = SearchCluster::open(dir.path()).unwrap();
        assert_eq!(cluster.indices().unwrap(), vec!["mygene_current".to_string()]);
        assert_eq!(cluster.index("mygene_current").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn drop_removes_snapshot() {
        let dir = TempDir::new().unwrap();
        let cluster = SearchCluster::open(dir.path()).unwrap();
        let index = cluster.index("g").unwrap();
        index.insert(&[Document::empty("1")]).unwrap();
        index.finalize().unwrap();
        index.drop_collection().unwrap();
        assert!(cluster.indices().unwrap().is_empty());
    }
}
