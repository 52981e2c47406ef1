//! Identifier reference data: retired-id history and cross-reference lists.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use genedoc_types::DocId;

use crate::error::{ResolveError, ResolveResult};

/// Source of the id reference data a build needs.
pub trait IdCatalog: Send + Sync {
    /// `(retired, replaced_by)` pairs of canonical ids.
    fn retired_history(&self) -> ResolveResult<Vec<(DocId, DocId)>>;

    /// `(secondary, canonical)` pairs for one id space.
    fn cross_references(&self, id_type: &str) -> ResolveResult<Vec<(DocId, DocId)>>;

    fn has_cross_references(&self, id_type: &str) -> ResolveResult<bool>;
}

/// Catalog held in memory, for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIdCatalog {
    retired: Vec<(DocId, DocId)>,
    xrefs: BTreeMap<String, Vec<(DocId, DocId)>>,
}

impl InMemoryIdCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retired(mut self, retired: impl Into<DocId>, current: impl Into<DocId>) -> Self {
        self.retired.push((retired.into(), current.into()));
        self
    }

    pub fn with_xref(
        mut self,
        id_type: &str,
        secondary: impl Into<DocId>,
        canonical: impl Into<DocId>,
    ) -> Self {
        self.xrefs
            .entry(id_type.to_string())
            .or_default()
            .push((secondary.into(), canonical.into()));
        self
    }

    /// Declare an id space with no entries yet.
    pub fn with_id_type(mut self, id_type: &str) -> Self {
        self.xrefs.entry(id_type.to_string()).or_default();
        self
    }
}

impl IdCatalog for InMemoryIdCatalog {
    fn retired_history(&self) -> ResolveResult<Vec<(DocId, DocId)>> {
        Ok(self.retired.clone())
    }

    fn cross_references(&self, id_type: &str) -> ResolveResult<Vec<(DocId, DocId)>> {
        self.xrefs
            .get(id_type)
            .cloned()
            .ok_or_else(|| ResolveError::MissingCrossReference(id_type.to_string()))
    }

    fn has_cross_references(&self, id_type: &str) -> ResolveResult<bool> {
        Ok(self.xrefs.contains_key(id_type))
    }
}

const RETIRED_FILE: &str = "retired.tsv";
const XREF_DIR: &str = "xref";

/// Catalog read from a directory of two-column TSV files:
///
/// ```text
/// <dir>/retired.tsv          retired_id <TAB> current_id
/// <dir>/xref/<id_type>.tsv   secondary_id <TAB> canonical_id
/// ```
///
/// Lines starting with `#` and blank lines are ignored. Extra columns are
/// ignored. A missing `retired.tsv` means nothing was retired.
#[derive(Clone, Debug)]
pub struct DirIdCatalog {
    dir: PathBuf,
}

impl DirIdCatalog {
    pub fn open(dir: impl Into<PathBuf>) -> ResolveResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(ResolveError::Catalog {
                location: dir.display().to_string(),
                reason: "not a directory".into(),
            });
        }
        Ok(Self { dir })
    }

    fn xref_file(&self, id_type: &str) -> PathBuf {
        self.dir.join(XREF_DIR).join(format!("{id_type}.tsv"))
    }
}

fn read_pairs(path: &Path) -> ResolveResult<Vec<(DocId, DocId)>> {
    let text = fs::read_to_string(path)?;
    let mut pairs = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.split('\t');
        match (cols.next(), cols.next()) {
            (Some(a), Some(b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
                pairs.push((DocId::new(a.trim()), DocId::new(b.trim())));
            }
            _ => {
                return Err(ResolveError::Catalog {
                    location: format!("{}:{}", path.display(), lineno + 1),
                    reason: "expected two tab-separated ids".into(),
                })
            }
        }
    }
    Ok(pairs)
}

impl IdCatalog for DirIdCatalog {
    fn retired_history(&self) -> ResolveResult<Vec<(DocId, DocId)>> {
        let path = self.dir.join(RETIRED_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_pairs(&path)
    }

    fn cross_references(&self, id_type: &str) -> ResolveResult<Vec<(DocId, DocId)>> {
        let path = self.xref_file(id_type);
        if !path.is_file() {
            return Err(ResolveError::MissingCrossReference(id_type.to_string()));
        }
        read_pairs(&path)
    }

    fn has_cross_references(&self, id_type: &str) -> ResolveResult<bool> {
        Ok(self.xref_file(id_type).is_file())
    }
}
