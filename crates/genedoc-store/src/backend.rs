use std::path::PathBuf;
use std::sync::Arc;

use genedoc_types::{DocId, Document, Fields};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::docstore::{DocStore, DocStoreBackend};
use crate::error::StoreResult;
use crate::memory::{InMemoryBackend, MemoryStorage};
use crate::search::{SearchCluster, SearchIndexBackend};
use crate::traits::{DocBackend, DocPatch, UpdateOutcome};

/// Which backend holds the canonical collections.
///
/// ```toml
/// [backend]
/// kind = "doc_store"
/// path = "data/genedoc.redb"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    #[default]
    Memory,
    DocStore {
        path: PathBuf,
    },
    SearchIndex {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// An opened storage location that hands out per-collection backends.
#[derive(Debug)]
pub enum Storage {
    Memory(MemoryStorage),
    DocStore(DocStore),
    SearchIndex(SearchCluster),
}

impl Storage {
    pub fn open(config: &BackendConfig) -> StoreResult<Self> {
        Ok(match config {
            BackendConfig::Memory => Self::Memory(MemoryStorage::new()),
            BackendConfig::DocStore { path } => Self::DocStore(DocStore::open(path)?),
            BackendConfig::SearchIndex { path: Some(root) } => {
                Self::SearchIndex(SearchCluster::open(root)?)
            }
            BackendConfig::SearchIndex { path: None } => {
                Self::SearchIndex(SearchCluster::volatile())
            }
        })
    }

    pub fn collection(&self, name: &str) -> StoreResult<Backend> {
        Ok(match self {
            Self::Memory(s) => Backend::Memory(s.collection(name)?),
            Self::DocStore(s) => Backend::DocStore(s.collection(name)),
            Self::SearchIndex(s) => Backend::SearchIndex(s.index(name)?),
        })
    }

    /// Names of existing, non-empty collections.
    pub fn collections(&self) -> StoreResult<Vec<String>> {
        match self {
            Self::Memory(s) => s.collections(),
            Self::DocStore(s) => s.collections(),
            Self::SearchIndex(s) => s.indices(),
        }
    }
}

/// Closed set of backend variants behind one [`DocBackend`] impl.
#[derive(Clone, Debug)]
pub enum Backend {
    Memory(Arc<InMemoryBackend>),
    DocStore(DocStoreBackend),
    SearchIndex(Arc<SearchIndexBackend>),
}

impl Backend {
    fn inner(&self) -> &dyn DocBackend {
        match self {
            Self::Memory(b) => b.as_ref(),
            Self::DocStore(b) => b,
            Self::SearchIndex(b) => b.as_ref(),
        }
    }
}

impl DocBackend for Backend {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn prepare(&self, schema: &Fields) -> StoreResult<()> {
        self.inner().prepare(schema)
    }

    fn insert(&self, docs: &[Document]) -> StoreResult<()> {
        self.inner().insert(docs)
    }

    fn update(&self, id: &DocId, patch: &DocPatch) -> StoreResult<UpdateOutcome> {
        self.inner().update(id, patch)
    }

    fn drop_collection(&self) -> StoreResult<()> {
        self.inner().drop_collection()
    }

    fn ids_after(&self, after: Option<&DocId>, limit: usize) -> StoreResult<Vec<DocId>> {
        self.inner().ids_after(after, limit)
    }

    fn get(&self, id: &DocId) -> StoreResult<Option<Document>> {
        self.inner().get(id)
    }

    fn get_many(&self, ids: &[DocId]) -> StoreResult<Vec<Option<Document>>> {
        self.inner().get_many(ids)
    }

    fn remove_many(&self, ids: &[DocId]) -> StoreResult<usize> {
        self.inner().remove_many(ids)
    }

    fn count(&self) -> StoreResult<u64> {
        self.inner().count()
    }

    fn finalize(&self) -> StoreResult<()> {
        self.inner().finalize()
    }

    fn supports_unset(&self) -> bool {
        self.inner().supports_unset()
    }

    fn count_where(&self, field: &str, value: &Value) -> StoreResult<u64> {
        self.inner().count_where(field, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_deserializes_tagged() {
        let cfg: BackendConfig = parse(r#"{"kind": "doc_store", "path": "/tmp/x.redb"}"#);
        assert_eq!(
            cfg,
            BackendConfig::DocStore {
                path: PathBuf::from("/tmp/x.redb")
            }
        );
        let cfg: BackendConfig = parse(r#"{"kind": "search_index"}"#);
        assert_eq!(cfg, BackendConfig::SearchIndex { path: None });
        assert_eq!(BackendConfig::default(), BackendConfig::Memory);
    }

    fn parse(json: &str) -> BackendConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn storage_hands_out_matching_kinds() {
        let dir = tempfile::TempDir::new().unwrap();
        let configs = [
            (BackendConfig::Memory, "memory"),
            (
                BackendConfig::DocStore {
                    path: dir.path().join("db.redb"),
                },
                "docstore",
            ),
            (BackendConfig::SearchIndex { path: None }, "search"),
        ];
        for (config, kind) in configs {
            let storage = Storage::open(&config).unwrap();
            let backend = storage.collection("genes").unwrap();
            assert_eq!(backend.kind(), kind);
            assert_eq!(backend.name(), "genes");
        }
    }

    #[test]
    fn collections_reflect_writes() {
        let storage = Storage::open(&BackendConfig::Memory).unwrap();
        let c = storage.collection("g_20130415_abcdefgh").unwrap();
        c.insert(&[Document::empty("1")]).unwrap();
        c.finalize().unwrap();
        assert_eq!(storage.collections().unwrap(), vec!["g_20130415_abcdefgh"]);
    }
}
