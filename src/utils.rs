use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::{BuildHasher, Hash};

/// Map insertion that treats an already-present key as a logic bug.
pub trait HashMapInsertNew<K, V> {
    /// Inserts a key-value pair that must not be present yet.
    ///
    /// # Panics
    /// Panics if the key is already present in the map.
    fn insert_new(&mut self, key: K, value: V);
}

impl<K, V, H> HashMapInsertNew<K, V> for HashMap<K, V, H>
where
    K: Eq + Hash + Debug,
    V: Debug,
    H: BuildHasher,
{
    #[inline]
    fn insert_new(&mut self, key: K, value: V) {
        match self.entry(key) {
            Entry::Occupied(entry) => panic!(
                "can not insert value {value:?}, key {:?} already maps to {:?}",
                entry.key(),
                entry.get()
            ),
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    #[test]
    fn test_insert_new() {
        let mut hm = FxHashMap::default();
        hm.insert_new("a", 2);
        hm.insert_new("b", 4);
        assert_eq!(hm["a"], 2);
        assert_eq!(hm["b"], 4);
    }

    #[test]
    #[should_panic(expected = "already maps to")]
    fn test_insert_new_duplicate() {
        let mut hm = FxHashMap::default();
        hm.insert_new("a", 2);
        hm.insert_new("a", 4);
    }
}
