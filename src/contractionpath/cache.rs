use std::sync::Arc;

use log::debug;
use rustc_hash::FxHashMap;

use crate::types::ContrTriple;

/// Opt-in cache of optimized contraction sequences, keyed by the network
/// topology fingerprint (vertex count, edge structure, extents). Trades
/// memory for repeated-evaluation planning latency; correctness never
/// depends on it.
#[derive(Debug, Default)]
pub struct ContrSeqCache {
    sequences: FxHashMap<u64, Arc<Vec<ContrTriple>>>,
}

impl ContrSeqCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: u64) -> Option<Arc<Vec<ContrTriple>>> {
        let hit = self.sequences.get(&fingerprint).cloned();
        debug!(fingerprint, hit = hit.is_some(); "contraction sequence cache lookup");
        hit
    }

    pub fn insert(&mut self, fingerprint: u64, path: Vec<ContrTriple>) -> Arc<Vec<ContrTriple>> {
        let path = Arc::new(path);
        self.sequences.insert(fingerprint, Arc::clone(&path));
        path
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn clear(&mut self) {
        self.sequences.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::contr;

    #[test]
    fn test_cache_roundtrip() {
        let mut cache = ContrSeqCache::new();
        assert!(cache.get(42).is_none());
        cache.insert(42, contr![(3, 1, 2)]);
        assert_eq!(*cache.get(42).unwrap(), contr![(3, 1, 2)]);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
