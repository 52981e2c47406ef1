use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use genedoc_types::Document;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::source::{SourceFilter, SourceStore};

const EXT: &str = "jsonl";

/// Byte offsets of the documents of one source passing one filter.
#[derive(Debug)]
struct LineIndex {
    /// File length and modification time the offsets were taken from.
    stamp: (u64, Option<SystemTime>),
    offsets: Vec<u64>,
}

type IndexKey = (String, SourceFilter);

/// Source collections stored as `<dir>/<name>.jsonl`, one JSON document
/// per line. Blank lines are skipped.
///
/// The first read of a source under a filter parses the whole file once and
/// keeps the byte offset of every matching document. Later windows seek
/// straight to their first document. A file whose length or modification
/// time changed is indexed again.
#[derive(Clone, Debug)]
pub struct JsonlSourceStore {
    dir: PathBuf,
    index: Arc<RwLock<HashMap<IndexKey, Arc<LineIndex>>>>,
}

impl JsonlSourceStore {
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(StoreError::Open {
                path: dir,
                reason: "not a directory".into(),
            });
        }
        Ok(Self {
            dir,
            index: Arc::default(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{EXT}"))
    }

    fn open_source(&self, name: &str) -> StoreResult<(PathBuf, File)> {
        let path = self.file(name);
        match File::open(&path) {
            Ok(f) => Ok((path, f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::SourceNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parse(line: &str, location: impl FnOnce() -> String) -> StoreResult<Document> {
        serde_json::from_str(line).map_err(|e| StoreError::CorruptDocument {
            location: location(),
            reason: e.to_string(),
        })
    }

    /// Offsets of the documents of `name` passing `filter`, indexing the
    /// file if it has no current index.
    fn line_index(&self, name: &str, filter: &SourceFilter) -> StoreResult<Arc<LineIndex>> {
        let (path, file) = self.open_source(name)?;
        let meta = file.metadata()?;
        let stamp = (meta.len(), meta.modified().ok());
        let key = (name.to_string(), filter.clone());

        {
            let index = self
                .index
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            if let Some(found) = index.get(&key).filter(|i| i.stamp == stamp) {
                return Ok(Arc::clone(found));
            }
        }

        let mut reader = BufReader::new(file);
        let mut offsets = Vec::new();
        let mut line = String::new();
        let mut pos = 0u64;
        let mut lineno = 0usize;
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let start = pos;
            pos += n as u64;
            lineno += 1;
            if line.trim().is_empty() {
                continue;
            }
            let doc = Self::parse(&line, || format!("{}:{}", path.display(), lineno))?;
            if filter.matches(&doc) {
                offsets.push(start);
            }
        }
        debug!(source = name, documents = offsets.len(), "indexed source file");

        let built = Arc::new(LineIndex { stamp, offsets });
        self.index
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .insert(key, Arc::clone(&built));
        Ok(built)
    }
}

impl SourceStore for JsonlSourceStore {
    fn sources(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn has_source(&self, name: &str) -> StoreResult<bool> {
        Ok(self.file(name).is_file())
    }

    fn count(&self, name: &str, filter: &SourceFilter) -> StoreResult<u64> {
        Ok(self.line_index(name, filter)?.offsets.len() as u64)
    }

    fn read_window(
        &self,
        name: &str,
        filter: &SourceFilter,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Document>> {
        let index = self.line_index(name, filter)?;
        let Some(&first) = index.offsets.get(skip) else {
            return Ok(Vec::new());
        };
        let wanted = limit.min(index.offsets.len() - skip);
        let mut out = Vec::with_capacity(wanted);
        if wanted == 0 {
            return Ok(out);
        }

        let (path, mut file) = self.open_source(name)?;
        file.seek(SeekFrom::Start(first))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let mut pos = first;
        while out.len() < wanted {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let start = pos;
            pos += n as u64;
            if line.trim().is_empty() {
                continue;
            }
            let doc = Self::parse(&line, || format!("{}@{}", path.display(), start))?;
            if filter.matches(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, JsonlSourceStore) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("entrez_gene.jsonl"),
            "{\"_id\": 1017, \"taxid\": 9606}\n\n{\"_id\": 12566, \"taxid\": 10090}\n{\"_id\": 1018, \"taxid\": 9606}\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let store = JsonlSourceStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn lists_jsonl_files_only() {
        let (_dir, store) = fixture();
        assert_eq!(store.sources().unwrap(), vec!["entrez_gene"]);
        assert!(store.has_source("entrez_gene").unwrap());
    }

    #[test]
    fn windows_and_filters() {
        let (_dir, store) = fixture();
        let all = SourceFilter::all();
        assert_eq!(store.count("entrez_gene", &all).unwrap(), 3);
        let page = store.read_window("entrez_gene", &all, 1, 1).unwrap();
        assert_eq!(page[0].id.as_str(), "12566");
        let human = store
            .read_window("entrez_gene", &SourceFilter::species([9606]), 0, 10)
            .unwrap();
        assert_eq!(human.len(), 2);
    }

    #[test]
    fn feeder_walks_every_window_in_order() {
        let dir = TempDir::new().unwrap();
        let lines: String = (0..25)
            .map(|i| {
                let taxid = if i % 5 == 0 { 10090 } else { 9606 };
                format!("{{\"_id\": {i}, \"taxid\": {taxid}}}\n")
            })
            .collect();
        fs::write(dir.path().join("genes.jsonl"), lines).unwrap();
        let store = JsonlSourceStore::open(dir.path()).unwrap();

        let human = SourceFilter::species([9606]);
        let ids: Vec<String> = crate::source::doc_feeder(&store, "genes", human.clone(), 3, 0)
            .flat_map(|batch| batch.unwrap())
            .map(|doc| doc.id.to_string())
            .collect();
        let expected: Vec<String> = (0..25).filter(|i| i % 5 != 0).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
        assert_eq!(store.count("genes", &human).unwrap(), 20);

        let tail = store.read_window("genes", &human, 18, 10).unwrap();
        assert_eq!(tail.len(), 2);
        assert!(store.read_window("genes", &human, 20, 10).unwrap().is_empty());
    }

    #[test]
    fn rewritten_file_is_indexed_again() {
        let (dir, store) = fixture();
        let all = SourceFilter::all();
        assert_eq!(store.count("entrez_gene", &all).unwrap(), 3);
        fs::write(
            dir.path().join("entrez_gene.jsonl"),
            "{\"_id\": 1017, \"taxid\": 9606}\n{\"_id\": 1018, \"taxid\": 9606}\n{\"_id\": 1019, \"taxid\": 9606}\n{\"_id\": 1020, \"taxid\": 9606}\n",
        )
        .unwrap();
        assert_eq!(store.count("entrez_gene", &all).unwrap(), 4);
        let page = store.read_window("entrez_gene", &all, 3, 1).unwrap();
        assert_eq!(page[0].id.as_str(), "1020");
    }

    #[test]
    fn bad_line_reports_location() {
        let (dir, store) = fixture();
        fs::write(dir.path().join("broken.jsonl"), "{\"_id\": 1}\nnot json\n").unwrap();
        let err = store.count("broken", &SourceFilter::all()).unwrap_err();
        match err {
            StoreError::CorruptDocument { location, .. } => assert!(location.ends_with(":2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let (_dir, store) = fixture();
        assert!(matches!(
            store.read_window("nope", &SourceFilter::all(), 0, 1),
            Err(StoreError::SourceNotFound(_))
        ));
    }
}
