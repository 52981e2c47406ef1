use std::collections::{HashMap, HashSet};

use genedoc_types::DocId;

/// Maps current and retired canonical ids to the current id that replaced
/// them.
///
/// Live ids map to themselves. A retired id maps to the live id at the end
/// of its replacement chain (`a -> b -> c` with only `c` live resolves `a`
/// to `c`). Retirements that never reach a live id are discarded, as are
/// cycles.
#[derive(Clone, Debug, Default)]
pub struct RetireMap {
    live: HashSet<DocId>,
    retired: HashMap<DocId, DocId>,
}

impl RetireMap {
    pub fn new(
        live: impl IntoIterator<Item = DocId>,
        history: impl IntoIterator<Item = (DocId, DocId)>,
    ) -> Self {
        let live: HashSet<DocId> = live.into_iter().collect();
        let raw: HashMap<DocId, DocId> = history
            .into_iter()
            .filter(|(old, _)| !live.contains(old))
            .collect();

        let mut retired = HashMap::with_capacity(raw.len());
        for (old, next) in &raw {
            let mut current = next;
            let mut hops = 0;
            while !live.contains(current) && hops <= raw.len() {
                match raw.get(current) {
                    Some(n) => current = n,
                    None => break,
                }
                hops += 1;
            }
            if live.contains(current) {
                retired.insert(old.clone(), current.clone());
            }
        }
        Self { live, retired }
    }

    /// The current id for `id`, or `None` if it is neither live nor retired
    /// into a live id.
    pub fn resolve<'a>(&'a self, id: &'a DocId) -> Option<&'a DocId> {
        if self.live.contains(id) {
            Some(id)
        } else {
            self.retired.get(id)
        }
    }

    pub fn is_live(&self, id: &DocId) -> bool {
        self.live.contains(id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}
