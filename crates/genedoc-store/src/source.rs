//! Read side of a build: the parsed source collections.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use genedoc_types::Document;

use crate::error::{StoreError, StoreResult};

/// Query-level restriction on a source stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceFilter {
    /// Keep only documents whose integer `taxid` is in the set.
    pub species: Option<BTreeSet<i64>>,
}

impl SourceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn species(taxids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            species: Some(taxids.into_iter().collect()),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match &self.species {
            None => true,
            Some(taxids) => doc.species().is_some_and(|t| taxids.contains(&t)),
        }
    }
}

/// Named collections of parsed source documents.
///
/// Each source is read in a stable order, so `(skip, limit)` windows
/// partition it and can be handed to independent workers.
pub trait SourceStore: Send + Sync {
    /// Names of all available sources, sorted.
    fn sources(&self) -> StoreResult<Vec<String>>;

    fn has_source(&self, name: &str) -> StoreResult<bool> {
        Ok(self.sources()?.iter().any(|s| s == name))
    }

    /// Number of documents in `name` passing `filter`.
    fn count(&self, name: &str, filter: &SourceFilter) -> StoreResult<u64>;

    /// Documents `skip..skip + limit` of the filtered stream.
    fn read_window(
        &self,
        name: &str,
        filter: &SourceFilter,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Document>>;
}

/// Fixed-size batches over one source.
pub struct SourceFeeder<'a, S: ?Sized> {
    store: &'a S,
    name: String,
    filter: SourceFilter,
    batch_size: usize,
    offset: usize,
    done: bool,
}

impl<S: SourceStore + ?Sized> Iterator for SourceFeeder<'_, S> {
    type Item = StoreResult<Vec<Document>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self
            .store
            .read_window(&self.name, &self.filter, self.offset, self.batch_size)
        {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => {
                self.offset += batch.len();
                if batch.len() < self.batch_size {
                    self.done = true;
                }
                Some(Ok(batch))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Stream `name` in batches of `batch_size`, starting at document `skip`.
pub fn doc_feeder<'a, S: SourceStore + ?Sized>(
    store: &'a S,
    name: &str,
    filter: SourceFilter,
    batch_size: usize,
    skip: usize,
) -> SourceFeeder<'a, S> {
    SourceFeeder {
        store,
        name: name.to_string(),
        filter,
        batch_size: batch_size.max(1),
        offset: skip,
        done: false,
    }
}

/// Source collections held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct InMemorySourceStore {
    sources: RwLock<BTreeMap<String, Vec<Document>>>,
}

impl InMemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content of one source.
    pub fn put(&self, name: impl Into<String>, docs: Vec<Document>) -> StoreResult<()> {
        let mut sources = self
            .sources
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        sources.insert(name.into(), docs);
        Ok(())
    }

    /// Builder-style [`put`](Self::put) for fixtures.
    pub fn with_source(self, name: impl Into<String>, docs: Vec<Document>) -> Self {
        if let Ok(mut sources) = self.sources.write() {
            sources.insert(name.into(), docs);
        }
        self
    }
}

impl SourceStore for InMemorySourceStore {
    fn sources(&self) -> StoreResult<Vec<String>> {
        let sources = self
            .sources
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(sources.keys().cloned().collect())
    }

    fn count(&self, name: &str, filter: &SourceFilter) -> StoreResult<u64> {
        let sources = self
            .sources
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let docs = sources
            .get(name)
            .ok_or_else(|| StoreError::SourceNotFound(name.to_string()))?;
        Ok(docs.iter().filter(|d| filter.matches(d)).count() as u64)
    }

    fn read_window(
        &self,
        name: &str,
        filter: &SourceFilter,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let sources = self
            .sources
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let docs = sources
            .get(name)
            .ok_or_else(|| StoreError::SourceNotFound(name.to_string()))?;
        Ok(docs
            .iter()
            .filter(|d| filter.matches(d))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}
