use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use genedoc_resolve::{IdCatalog, Identity, IdentityMap, MappingPolicy, RetireMap};
use tracing::debug;

use crate::error::{MergeError, MergeResult};

/// Identity maps of one build run, keyed by id type.
///
/// Seeded with the secondary root's map and filled lazily the first time a
/// source keyed by another id type is merged. Owned by the run and dropped
/// with it.
pub struct IdMapCache<'a> {
    catalog: &'a dyn IdCatalog,
    retire: RetireMap,
    policy: MappingPolicy,
    maps: Mutex<HashMap<String, Arc<IdentityMap>>>,
}

impl<'a> IdMapCache<'a> {
    pub fn new(catalog: &'a dyn IdCatalog, identity: Identity, policy: MappingPolicy) -> Self {
        let (retire, secondary) = identity.into_parts();
        let maps = secondary
            .into_iter()
            .map(|(id_type, map)| (id_type, Arc::new(map)))
            .collect();
        Self {
            catalog,
            retire,
            policy,
            maps: Mutex::new(maps),
        }
    }

    /// The map for `id_type`, loading it from the catalog on first use.
    pub fn get(&self, id_type: &str) -> MergeResult<Arc<IdentityMap>> {
        let mut maps = self
            .maps
            .lock()
            .map_err(|e| MergeError::LockPoisoned(e.to_string()))?;
        if let Some(map) = maps.get(id_type) {
            return Ok(Arc::clone(map));
        }
        let pairs = self.catalog.cross_references(id_type)?;
        let map = Arc::new(IdentityMap::build(pairs, &self.retire, self.policy));
        debug!(id_type, mapped = map.len(), "loaded identity map");
        maps.insert(id_type.to_string(), Arc::clone(&map));
        Ok(map)
    }

    /// Number of id types loaded so far.
    pub fn loaded(&self) -> usize {
        self.maps.lock().map(|m| m.len()).unwrap_or_default()
    }
}
