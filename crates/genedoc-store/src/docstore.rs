//! Document-store backend on redb.
//!
//! One redb database file holds every collection; each collection is a table
//! of `id -> JSON-encoded fields`. Write transactions commit with eventual
//! durability during a bulk session, and `finalize` forces an immediate
//! commit so everything written before it survives a crash.

use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use genedoc_types::{DocId, Document, Fields};
use redb::{
    Database, Durability, ReadTransaction, ReadableTable, ReadableTableMetadata,
    TableDefinition, TableError, TableHandle,
};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DocBackend, DocPatch, UpdateOutcome};

type DocTable<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

fn redb_err<E: Into<redb::Error>>(context: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Database(format!("{context}: {}", e.into()))
}

fn decode(collection: &str, id: &str, bytes: &[u8]) -> StoreResult<Fields> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptDocument {
        location: format!("{collection}/{id}"),
        reason: e.to_string(),
    })
}

fn encode(fields: &Fields) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(fields).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Handle on a redb database file holding many collections.
#[derive(Clone)]
pub struct DocStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl DocStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path).map_err(|e| StoreError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "opened document store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backend for one collection. The table is created on first write.
    pub fn collection(&self, name: &str) -> DocStoreBackend {
        DocStoreBackend {
            db: Arc::clone(&self.db),
            name: name.to_string(),
        }
    }

    /// Names of existing collections, sorted.
    pub fn collections(&self) -> StoreResult<Vec<String>> {
        let rtxn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let mut names: Vec<String> = rtxn
            .list_tables()
            .map_err(redb_err("list_tables"))?
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for DocStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStore").field("path", &self.path).finish()
    }
}

/// One collection of a [`DocStore`].
#[derive(Clone)]
pub struct DocStoreBackend {
    db: Arc<Database>,
    name: String,
}

impl DocStoreBackend {
    fn table(&self) -> DocTable<'_> {
        TableDefinition::new(&self.name)
    }

    /// Run `f` against the collection's table in a read transaction.
    /// A collection that was never written reads as empty (`None`).
    fn with_read<T>(
        &self,
        f: impl FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> StoreResult<T>,
    ) -> StoreResult<Option<T>> {
        let rtxn: ReadTransaction = self.db.begin_read().map_err(redb_err("begin_read"))?;
        match rtxn.open_table(self.table()) {
            Ok(table) => f(&table).map(Some),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(redb_err("open_table")(e)),
        }
    }
}

impl DocBackend for DocStoreBackend {
    fn kind(&self) -> &'static str {
        "docstore"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, _schema: &Fields) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(self.table()).map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    fn insert(&self, docs: &[Document]) -> StoreResult<()> {
        let mut txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.set_durability(Durability::Eventual);
        {
            let mut table = txn.open_table(self.table()).map_err(redb_err("open_table"))?;
            for doc in docs {
                let bytes = encode(&doc.fields)?;
                let existed = table
                    .insert(doc.id.as_str(), bytes.as_slice())
                    .map_err(redb_err("insert"))?
                    .is_some();
                if existed {
                    // Dropping the uncommitted transaction discards the batch.
                    return Err(StoreError::DuplicateId {
                        collection: self.name.clone(),
                        id: doc.id.clone(),
                    });
                }
            }
        }
        txn.commit().map_err(redb_err("commit"))?;
        debug!(collection = %self.name, inserted = docs.len(), "docstore insert");
        Ok(())
    }

    fn update(&self, id: &DocId, patch: &DocPatch) -> StoreResult<UpdateOutcome> {
        let mut txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.set_durability(Durability::Eventual);
        let outcome = {
            let mut table = txn.open_table(self.table()).map_err(redb_err("open_table"))?;
            let stored = table
                .get(id.as_str())
                .map_err(redb_err("get"))?
                .map(|guard| guard.value().to_vec());
            match stored {
                None => UpdateOutcome::Missing,
                Some(bytes) => {
                    let mut fields = decode(&self.name, id.as_str(), &bytes)?;
                    if patch.apply_to(&mut fields, true) {
                        let bytes = encode(&fields)?;
                        table
                            .insert(id.as_str(), bytes.as_slice())
                            .map_err(redb_err("insert"))?;
                        UpdateOutcome::Modified
                    } else {
                        UpdateOutcome::Unchanged
                    }
                }
            }
        };
        if outcome == UpdateOutcome::Modified {
            txn.commit().map_err(redb_err("commit"))?;
        } else {
            txn.abort().map_err(redb_err("abort"))?;
        }
        Ok(outcome)
    }

    fn drop_collection(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        let existed = txn.delete_table(self.table()).map_err(redb_err("delete_table"))?;
        txn.commit().map_err(redb_err("commit"))?;
        debug!(collection = %self.name, existed, "docstore drop");
        Ok(())
    }

    fn ids_after(&self, after: Option<&DocId>, limit: usize) -> StoreResult<Vec<DocId>> {
        let ids = self.with_read(|table| {
            let lower: Bound<&str> = match after {
                Some(id) => Bound::Excluded(id.as_str()),
                None => Bound::Unbounded,
            };
            let mut ids = Vec::with_capacity(limit.min(1024));
            for entry in table
                .range::<&str>((lower, Bound::Unbounded))
                .map_err(redb_err("range"))?
                .take(limit)
            {
                let (key, _) = entry.map_err(redb_err("range"))?;
                ids.push(DocId::new(key.value()));
            }
            Ok(ids)
        })?;
        Ok(ids.unwrap_or_default())
    }

    fn get(&self, id: &DocId) -> StoreResult<Option<Document>> {
        let found = self.with_read(|table| {
            match table.get(id.as_str()).map_err(redb_err("get"))? {
                Some(guard) => {
                    let fields = decode(&self.name, id.as_str(), guard.value())?;
                    Ok(Some(Document::new(id.clone(), fields)))
                }
                None => Ok(None),
            }
        })?;
        Ok(found.flatten())
    }

    fn get_many(&self, ids: &[DocId]) -> StoreResult<Vec<Option<Document>>> {
        let found = self.with_read(|table| {
            let mut docs = Vec::with_capacity(ids.len());
            for id in ids {
                let doc = match table.get(id.as_str()).map_err(redb_err("get"))? {
                    Some(guard) => Some(Document::new(
                        id.clone(),
                        decode(&self.name, id.as_str(), guard.value())?,
                    )),
                    None => None,
                };
                docs.push(doc);
            }
            Ok(docs)
        })?;
        Ok(found.unwrap_or_else(|| vec![None; ids.len()]))
    }

    fn remove_many(&self, ids: &[DocId]) -> StoreResult<usize> {
        let mut txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.set_durability(Durability::Eventual);
        let mut removed = 0;
        {
            let mut table = txn.open_table(self.table()).map_err(redb_err("open_table"))?;
            for id in ids {
                if table.remove(id.as_str()).map_err(redb_err("remove"))?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(removed)
    }

    fn count(&self) -> StoreResult<u64> {
        let n = self.with_read(|table| table.len().map_err(redb_err("len")))?;
        Ok(n.unwrap_or(0))
    }

    fn finalize(&self) -> StoreResult<()> {
        let mut txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        txn.set_durability(Durability::Immediate);
        txn.commit().map_err(redb_err("commit"))?;
        info!(collection = %self.name, "docstore committed");
        Ok(())
    }
}

impl std::fmt::Debug for DocStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocStoreBackend")
            .field("name", &self.name)
            .finish()
    }
}
