//! Root insertion: turning one or two root sources into the canonical id set.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use genedoc_store::{doc_feeder, DocBackend, SourceFilter, SourceStore};
use genedoc_types::{BuildConfig, DocId, Document, SourceDescriptor};
use tracing::{debug, info, warn};

use crate::catalog::IdCatalog;
use crate::error::{ResolveError, ResolveResult};
use crate::identity::{IdentityMap, MappingPolicy};
use crate::retire::RetireMap;

/// Default number of root documents per insert batch.
pub const DEFAULT_ROOT_BATCH: usize = 10_000;

/// The second root source, in its own id space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryRoot {
    pub name: String,
    /// `None` when the source is already keyed by canonical id.
    pub id_type: Option<String>,
}

/// Which root sources to read and how to filter them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootPlan {
    pub primary: String,
    pub secondary: Option<SecondaryRoot>,
    pub species: Option<BTreeSet<i64>>,
}

impl RootPlan {
    /// Plan for `config`. `secondary` is the registry descriptor of the
    /// config's second root source, if it has one.
    pub fn for_build(config: &BuildConfig, secondary: Option<&SourceDescriptor>) -> Option<Self> {
        let primary = config.primary_root()?.to_string();
        let secondary = config.secondary_root().map(|name| SecondaryRoot {
            name: name.to_string(),
            id_type: secondary.and_then(|d| d.id_type.clone()),
        });
        Some(Self {
            primary,
            secondary,
            species: config.species_filter.clone(),
        })
    }

    pub fn primary_only(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
            species: None,
        }
    }

    pub fn with_secondary(mut self, name: impl Into<String>, id_type: Option<&str>) -> Self {
        self.secondary = Some(SecondaryRoot {
            name: name.into(),
            id_type: id_type.map(str::to_string),
        });
        self
    }

    pub fn with_species(mut self, taxids: impl IntoIterator<Item = i64>) -> Self {
        self.species = Some(taxids.into_iter().collect());
        self
    }

    fn filter(&self) -> SourceFilter {
        SourceFilter {
            species: self.species.clone(),
        }
    }
}

/// Identity data loaded before any root is inserted.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    retire: RetireMap,
    secondary: Option<(String, IdentityMap)>,
}

impl Identity {
    pub fn retire_map(&self) -> &RetireMap {
        &self.retire
    }

    /// The secondary root's id space and its map, if one was loaded.
    pub fn secondary_map(&self) -> Option<(&str, &IdentityMap)> {
        self.secondary.as_ref().map(|(t, m)| (t.as_str(), m))
    }

    pub fn into_parts(self) -> (RetireMap, Option<(String, IdentityMap)>) {
        (self.retire, self.secondary)
    }

    /// Canonical candidates for a secondary-root id.
    fn candidates<'a>(&'a self, id: &'a DocId) -> &'a [DocId] {
        match &self.secondary {
            Some((_, map)) => map.translate(id),
            None => std::slice::from_ref(id),
        }
    }
}

/// Identity with retirement history only and no secondary root map.
impl From<RetireMap> for Identity {
    fn from(retire: RetireMap) -> Self {
        Self {
            retire,
            secondary: None,
        }
    }
}

/// Counters of root insertion, recorded on the build run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootStats {
    pub total_primary: u64,
    pub total_secondary: u64,
    pub secondary_matched: u64,
    pub secondary_unmatched: u64,
    pub total_canonical: u64,
}

impl RootStats {
    pub fn record_into(&self, stats: &mut BTreeMap<String, u64>) {
        let entries = [
            ("total_primary", self.total_primary),
            ("total_secondary", self.total_secondary),
            ("secondary_matched", self.secondary_matched),
            ("secondary_unmatched", self.secondary_unmatched),
            ("total_canonical", self.total_canonical),
        ];
        for (key, value) in entries {
            stats.insert(key.to_string(), value);
        }
    }
}

/// Result of root insertion.
#[derive(Debug)]
pub struct Resolution {
    pub identity: Identity,
    pub geneid_set: HashSet<DocId>,
    pub stats: RootStats,
}

/// Reads the root sources and writes the initial canonical documents.
pub struct RootResolver<'a> {
    sources: &'a dyn SourceStore,
    catalog: &'a dyn IdCatalog,
    batch_size: usize,
    policy: MappingPolicy,
}

impl<'a> RootResolver<'a> {
    pub fn new(sources: &'a dyn SourceStore, catalog: &'a dyn IdCatalog) -> Self {
        Self {
            sources,
            catalog,
            batch_size: DEFAULT_ROOT_BATCH,
            policy: MappingPolicy::default(),
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn policy(mut self, policy: MappingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load the retired-id map and the secondary root's identity map without
    /// writing anything. Current ids are every id of the primary root,
    /// regardless of the species filter.
    pub fn load_identity(&self, plan: &RootPlan) -> ResolveResult<Identity> {
        if !self.sources.has_source(&plan.primary)? {
            return Err(ResolveError::PrimaryRootUnavailable(plan.primary.clone()));
        }
        let mut live = Vec::new();
        let feeder = doc_feeder(
            self.sources,
            &plan.primary,
            SourceFilter::all(),
            self.batch_size,
            0,
        );
        for batch in feeder {
            live.extend(batch?.into_iter().map(|d| d.id));
        }
        let retire = RetireMap::new(live, self.catalog.retired_history()?);
        debug!(
            live = retire.live_count(),
            retired = retire.retired_count(),
            "loaded retired-id map"
        );

        let secondary = match plan.secondary.as_ref().and_then(|s| s.id_type.as_deref()) {
            Some(id_type) => {
                let pairs = self.catalog.cross_references(id_type)?;
                let map = IdentityMap::build(pairs, &retire, self.policy);
                if map.one_to_many() > 0 {
                    warn!(
                        id_type,
                        one_to_many = map.one_to_many(),
                        policy = ?self.policy,
                        "secondary ids with several canonical ids"
                    );
                }
                Some((id_type.to_string(), map))
            }
            None => None,
        };
        Ok(Identity { retire, secondary })
    }

    /// Insert the filtered root documents into `target`.
    ///
    /// Primary root documents are inserted as-is. A secondary root document
    /// is skipped (matched) when any of its canonical ids is already present,
    /// otherwise it is inserted under its own id.
    pub fn insert_roots(
        &self,
        plan: &RootPlan,
        identity: &Identity,
        target: &dyn DocBackend,
    ) -> ResolveResult<(HashSet<DocId>, RootStats)> {
        let filter = plan.filter();
        let mut geneid_set = HashSet::new();
        let mut stats = RootStats::default();

        for batch in doc_feeder(self.sources, &plan.primary, filter.clone(), self.batch_size, 0) {
            let batch = batch?;
            stats.total_primary += batch.len() as u64;
            geneid_set.extend(batch.iter().map(|d| d.id.clone()));
            target.insert(&batch)?;
        }
        info!(source = %plan.primary, inserted = stats.total_primary, "primary root inserted");

        if let Some(secondary) = &plan.secondary {
            for batch in doc_feeder(self.sources, &secondary.name, filter, self.batch_size, 0) {
                let mut unmatched: Vec<Document> = Vec::new();
                for doc in batch? {
                    stats.total_secondary += 1;
                    let matched = geneid_set.contains(&doc.id)
                        || identity
                            .candidates(&doc.id)
                            .iter()
                            .any(|c| geneid_set.contains(c));
                    if matched {
                        stats.secondary_matched += 1;
                    } else {
                        stats.secondary_unmatched += 1;
                        geneid_set.insert(doc.id.clone());
                        unmatched.push(doc);
                    }
                }
                if !unmatched.is_empty() {
                    target.insert(&unmatched)?;
                }
            }
            info!(
                source = %secondary.name,
                matched = stats.secondary_matched,
                unmatched = stats.secondary_unmatched,
                "secondary root reconciled"
            );
        }

        stats.total_canonical = geneid_set.len() as u64;
        Ok((geneid_set, stats))
    }

    /// [`load_identity`](Self::load_identity) then
    /// [`insert_roots`](Self::insert_roots).
    pub fn resolve(&self, plan: &RootPlan, target: &dyn DocBackend) -> ResolveResult<Resolution> {
        let identity = self.load_identity(plan)?;
        let (geneid_set, stats) = self.insert_roots(plan, &identity, target)?;
        Ok(Resolution {
            identity,
            geneid_set,
            stats,
        })
    }
}
