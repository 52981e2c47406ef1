use genedoc_types::{DocId, Document, Fields};
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreResult;

/// Page size used when a backend's id space is walked internally.
pub const DEFAULT_ID_PAGE: usize = 10_000;

/// Result of a single-document update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    /// The document existed and its content changed.
    Modified,
    /// The document existed and already carried the patched values.
    Unchanged,
    /// No document with this id. Updates never create documents.
    Missing,
}

impl UpdateOutcome {
    pub fn is_missing(self) -> bool {
        self == Self::Missing
    }
}

/// Counters over many [`UpdateOutcome`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdateTally {
    pub modified: u64,
    pub unchanged: u64,
    pub missing: u64,
}

impl UpdateTally {
    pub fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Modified => self.modified += 1,
            UpdateOutcome::Unchanged => self.unchanged += 1,
            UpdateOutcome::Missing => self.missing += 1,
        }
    }

    pub fn absorb(&mut self, other: UpdateTally) {
        self.modified += other.modified;
        self.unchanged += other.unchanged;
        self.missing += other.missing;
    }

    pub fn total(&self) -> u64 {
        self.modified + self.unchanged + self.missing
    }
}

/// Partial update of one document: fields to set and field names to unset.
///
/// Setting is shallow: a field named in `set` replaces the stored field of
/// the same name wholesale, nested objects are not merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocPatch {
    pub set: Fields,
    pub unset: Vec<String>,
}

impl DocPatch {
    pub fn set(fields: Fields) -> Self {
        Self {
            set: fields,
            unset: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    pub fn with_unset(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.unset.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Apply to `fields` in place. Returns `true` if anything changed.
    ///
    /// `_id` is never written through a patch. `unset` is skipped when the
    /// caller's backend cannot remove fields.
    pub fn apply_to(&self, fields: &mut Fields, honor_unset: bool) -> bool {
        let mut changed = false;
        for (name, value) in &self.set {
            if name == "_id" {
                continue;
            }
            if fields.get(name) != Some(value) {
                fields.insert(name.clone(), value.clone());
                changed = true;
            }
        }
        if honor_unset {
            for name in &self.unset {
                changed |= fields.remove(name).is_some();
            }
        }
        changed
    }
}

/// Uniform storage contract for one collection of canonical documents.
///
/// All higher-level algorithms (root construction, merge, diff, sync) are
/// written against this trait only. Implementations must satisfy:
/// - `update` never creates documents; a missing id yields
///   [`UpdateOutcome::Missing`], not an error.
/// - `drop_collection` and `prepare` are idempotent.
/// - `ids_after` pages through the id space in ascending id order without
///   materializing it.
/// - `get_many` preserves input order, with `None` for misses.
/// - Calls may arrive concurrently from several workers; no external locking
///   is required.
/// - After `finalize`, reads observe every prior write.
pub trait DocBackend: Send + Sync {
    /// Backend kind, for logs and reports.
    fn kind(&self) -> &'static str;

    /// Collection name.
    fn name(&self) -> &str;

    /// Create the collection (and declare `schema` where the backend keeps
    /// one) before the first write.
    fn prepare(&self, schema: &Fields) -> StoreResult<()>;

    /// Create documents. Never upserts; collision behavior is backend-defined.
    fn insert(&self, docs: &[Document]) -> StoreResult<()>;

    /// Update one existing document.
    fn update(&self, id: &DocId, patch: &DocPatch) -> StoreResult<UpdateOutcome>;

    /// Wipe the collection. Safe on an empty or nonexistent collection.
    fn drop_collection(&self) -> StoreResult<()>;

    /// Up to `limit` ids strictly greater than `after`, ascending.
    fn ids_after(&self, after: Option<&DocId>, limit: usize) -> StoreResult<Vec<DocId>>;

    fn get(&self, id: &DocId) -> StoreResult<Option<Document>>;

    fn get_many(&self, ids: &[DocId]) -> StoreResult<Vec<Option<Document>>> {
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Remove documents by id. Returns how many existed.
    fn remove_many(&self, ids: &[DocId]) -> StoreResult<usize>;

    /// Number of documents.
    fn count(&self) -> StoreResult<u64>;

    /// End-of-bulk-session hook: flush, commit, or refresh.
    fn finalize(&self) -> StoreResult<()>;

    /// Whether `DocPatch::unset` is honored.
    fn supports_unset(&self) -> bool {
        true
    }

    /// Number of documents whose `field` equals `value`.
    fn count_where(&self, field: &str, value: &Value) -> StoreResult<u64> {
        let mut matched = 0;
        let mut after: Option<DocId> = None;
        loop {
            let ids = self.ids_after(after.as_ref(), DEFAULT_ID_PAGE)?;
            let Some(last) = ids.last().cloned() else {
                break;
            };
            matched += self
                .get_many(&ids)?
                .iter()
                .flatten()
                .filter(|doc| doc.fields.get(field) == Some(value))
                .count() as u64;
            after = Some(last);
        }
        Ok(matched)
    }
}

/// Paging iterator over a backend's id space.
pub struct IdPages<'a, B: ?Sized> {
    backend: &'a B,
    page_size: usize,
    after: Option<DocId>,
    done: bool,
}

impl<B: DocBackend + ?Sized> Iterator for IdPages<'_, B> {
    type Item = StoreResult<Vec<DocId>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.backend.ids_after(self.after.as_ref(), self.page_size) {
            Ok(ids) if ids.is_empty() => {
                self.done = true;
                None
            }
            Ok(ids) => {
                if ids.len() < self.page_size {
                    self.done = true;
                }
                self.after = ids.last().cloned();
                Some(Ok(ids))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Id-listing helpers available on every backend, including trait objects.
pub trait DocBackendExt: DocBackend {
    /// Stream the id space in pages of `page_size`.
    fn id_pages(&self, page_size: usize) -> IdPages<'_, Self> {
        IdPages {
            backend: self,
            page_size: page_size.max(1),
            after: None,
            done: false,
        }
    }

    /// The whole id list, materialized by the caller.
    fn id_list(&self) -> StoreResult<Vec<DocId>> {
        let mut all = Vec::new();
        for page in self.id_pages(DEFAULT_ID_PAGE) {
            all.extend(page?);
        }
        Ok(all)
    }
}

impl<B: DocBackend + ?Sized> DocBackendExt for B {}
