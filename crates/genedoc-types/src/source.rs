use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::document::Fields;
use crate::error::TypeError;
use crate::names::validate_name;

/// Registry entry describing one parsed data source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    /// Id space of the source's native key (e.g. `"ensembl"`). `None` means
    /// the source is already keyed by canonical id.
    #[serde(default)]
    pub id_type: Option<String>,
    #[serde(default)]
    pub is_root: bool,
    /// Field schema contributed to the merged collection.
    #[serde(default)]
    pub field_mapping: Fields,
}

impl SourceDescriptor {
    /// A source keyed by canonical id.
    pub fn canonical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_type: None,
            is_root: false,
            field_mapping: Fields::new(),
        }
    }

    /// A source keyed by ids of another id space.
    pub fn keyed_by(name: impl Into<String>, id_type: impl Into<String>) -> Self {
        Self {
            id_type: Some(id_type.into()),
            ..Self::canonical(name)
        }
    }

    pub fn root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn with_mapping(mut self, mapping: Fields) -> Self {
        self.field_mapping = mapping;
        self
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        validate_name("source", &self.name)?;
        if let Some(id_type) = &self.id_type {
            validate_name("id type", id_type)?;
        }
        Ok(())
    }
}

/// What one build merges: an ordered source list, its root sources, and an
/// optional species restriction on the roots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub name: String,
    pub sources: Vec<String>,
    pub root_sources: Vec<String>,
    #[serde(default)]
    pub species_filter: Option<BTreeSet<i64>>,
}

impl BuildConfig {
    pub fn new(
        name: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
        root_sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
            root_sources: root_sources.into_iter().map(Into::into).collect(),
            species_filter: None,
        }
    }

    pub fn with_species(mut self, taxids: impl IntoIterator<Item = i64>) -> Self {
        self.species_filter = Some(taxids.into_iter().collect());
        self
    }

    /// The root source defining the canonical id space.
    pub fn primary_root(&self) -> Option<&str> {
        self.root_sources.first().map(String::as_str)
    }

    /// The optional second root source, in a secondary id space.
    pub fn secondary_root(&self) -> Option<&str> {
        self.root_sources.get(1).map(String::as_str)
    }

    pub fn is_root(&self, source: &str) -> bool {
        self.root_sources.iter().any(|r| r == source)
    }

    /// Sources folded in by the general merge pass, in declared order.
    pub fn merge_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .map(String::as_str)
            .filter(|s| !self.is_root(s))
            .collect()
    }

    /// Every source name the build touches: sources first, then any root
    /// not listed in `sources`.
    pub fn all_sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .chain(self.root_sources.iter())
            .map(String::as_str)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Structural checks that need no registry lookups.
    pub fn validate(&self) -> Result<(), TypeError> {
        validate_name("build", &self.name)?;
        let invalid = |reason: String| TypeError::InvalidBuildConfig {
            name: self.name.clone(),
            reason,
        };

        if self.root_sources.is_empty() || self.root_sources.len() > 2 {
            return Err(invalid(format!(
                "expected 1 or 2 root sources, got {}",
                self.root_sources.len()
            )));
        }
        if self.root_sources.len() == 2 && self.root_sources[0] == self.root_sources[1] {
            return Err(invalid("root sources must be distinct".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            validate_name("source", source)?;
            if !seen.insert(source.as_str()) {
                return Err(invalid(format!("source {source} listed twice")));
            }
        }
        for root in &self.root_sources {
            validate_name("source", root)?;
        }
        Ok(())
    }
}
