//! String-keyed map split over independently locked shards

use std::collections::HashMap;

use parking_lot::RwLock;
use sha1::{Digest, Sha1};

/// Concurrent map whose keys are spread over `nshards` `RwLock`ed shards.
///
/// A key's shard is chosen from one byte of its SHA-1 digest, so at most 256
/// shards are ever used; extra shards stay empty.
pub struct ShardedMap<V> {
    shards: Vec<RwLock<HashMap<String, V>>>,
}

impl<V> ShardedMap<V> {
    /// `nshards` of zero is rounded up to one.
    pub fn new(nshards: usize) -> Self {
        let shards = (0..nshards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_index(&self, key: &str) -> usize {
        let checksum = Sha1::digest(key.as_bytes());
        usize::from(checksum[17]) % self.shards.len()
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, V>> {
        &self.shards[self.shard_index(key)]
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        self.shard(&key).write().insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete(&self, key: &str) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// Every key currently stored, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for shard in &self.shards {
            keys.extend(shard.read().keys().cloned());
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}

impl<V: Clone> ShardedMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const KEYS: [&str; 10] = [
        "test", "try", "prova", "chance", "again", "123", "QWERTY", "test", "test2", "test3",
    ];

    #[test]
    fn shard_count_matches_request() {
        for n in [1, 3, 10, 100, 255] {
            assert_eq!(ShardedMap::<i32>::new(n).shard_count(), n);
        }
        assert_eq!(ShardedMap::<i32>::new(0).shard_count(), 1);
    }

    #[test]
    fn set_get_and_overwrite() {
        let map = ShardedMap::new(10);
        for (i, k) in KEYS.iter().enumerate() {
            map.set(*k, i);
        }
        // "test" appears twice; the later write wins
        assert_eq!(map.get("test"), Some(7));
        assert_eq!(map.get("QWERTY"), Some(6));
        assert_eq!(map.get("missing"), None);
        assert_eq!(map.len(), 9);
    }

    #[test]
    fn delete_removes_keys() {
        let map = ShardedMap::new(10);
        for (i, k) in KEYS.iter().enumerate() {
            map.set(*k, i);
        }
        for k in KEYS.iter().rev() {
            map.delete(k);
            assert!(!map.contains(k), "{} still present", k);
        }
        assert!(map.is_empty());
        assert_eq!(map.delete("never-there"), None);
    }

    #[test]
    fn keys_lists_everything() {
        let map = ShardedMap::new(10);
        for (i, k) in KEYS.iter().enumerate() {
            map.set(*k, i);
        }
        let keys = map.keys();
        for k in KEYS {
            assert!(keys.iter().any(|fk| fk == k), "missing {}", k);
        }
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn same_key_always_lands_in_the_same_shard() {
        let map = ShardedMap::<()>::new(7);
        for k in KEYS {
            assert_eq!(map.shard_index(k), map.shard_index(k));
            assert!(map.shard_index(k) < 7);
        }
    }

    #[test]
    fn concurrent_writers_on_threads() {
        let map = Arc::new(ShardedMap::new(8));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        map.set(format!("{}-{}", t, i), i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 1000);
        assert_eq!(map.get("3-249"), Some(249));
    }
}
