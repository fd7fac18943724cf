//! Sharded Keyspace
//!
//! Fixed-fanout map of key to item. Each shard owns its own readers-writer
//! lock so unrelated keys never contend.

use hashbrown::HashMap;
use std::sync::RwLock;

use super::item::Item;

/// Shard fanout. Power of two so the shard index is a mask of the key hash.
pub const SHARD_COUNT: usize = 2048;

struct Shard {
    items: RwLock<HashMap<String, Item>>,
}

/// Concurrent keyspace partitioned into [`SHARD_COUNT`] shards.
///
/// Keys are routed by a 32-bit FNV-1a hash. The hash is an internal detail:
/// shard residency is not stable across restarts and nothing may depend on it.
pub struct ShardedMap {
    shards: Vec<Shard>,
}

fn fnv1a(key: &str) -> u32 {
    let mut h: u32 = 2166136261;
    for b in key.bytes() {
        h ^= u32::from(b);
        h = h.wrapping_mul(16777619);
    }
    h
}

impl Default for ShardedMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedMap {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Shard {
                items: RwLock::new(HashMap::new()),
            });
        }
        Self { shards }
    }

    fn shard(&self, key: &str) -> &Shard {
        &self.shards[fnv1a(key) as usize & (SHARD_COUNT - 1)]
    }

    /// Get a clone of the item under `key`, expired or not.
    pub fn load(&self, key: &str) -> Option<Item> {
        self.shard(key).items.read().unwrap().get(key).cloned()
    }

    pub fn store(&self, key: String, item: Item) {
        self.shard(&key).items.write().unwrap().insert(key, item);
    }

    /// Remove `key`, returning whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.shard(key).items.write().unwrap().remove(key).is_some()
    }

    /// Run `f` against the write-locked shard map owning `key`.
    ///
    /// Composite read-modify-write operations go through here so two
    /// concurrent writers cannot interleave between the load and the store.
    /// `f` must not block or perform I/O.
    pub fn with_shard_mut<R>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Item>) -> R) -> R {
        let mut items = self.shard(key).items.write().unwrap();
        f(&mut items)
    }

    /// Visit every entry. Returning `false` from the visitor aborts the scan.
    ///
    /// Each shard is read-locked only while its own entries are walked, so
    /// the visitor observes a weakly consistent view rather than a
    /// point-in-time snapshot of the whole map.
    pub fn range(&self, mut f: impl FnMut(&str, &Item) -> bool) {
        for shard in &self.shards {
            let items = shard.items.read().unwrap();
            for (key, item) in items.iter() {
                if !f(key, item) {
                    return;
                }
            }
        }
    }

    /// Sum of shard sizes. Weakly consistent, like `range`.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.items.read().unwrap().len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::item::Value;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::thread;

    fn bytes_item(v: &'static [u8]) -> Item {
        Item::never(Value::Bytes(Bytes::from_static(v)))
    }

    #[test]
    fn test_load_store_remove() {
        let map = ShardedMap::new();

        assert!(map.load("k").is_none());
        map.store("k".to_string(), bytes_item(b"v"));
        assert_eq!(
            map.load("k").unwrap().value,
            Value::Bytes(Bytes::from_static(b"v"))
        );

        assert!(map.remove("k"));
        assert!(!map.remove("k"));
        assert!(map.load("k").is_none());
    }

    #[test]
    fn test_store_after_delete_wins() {
        let map = ShardedMap::new();
        map.store("k".to_string(), bytes_item(b"old"));
        map.remove("k");
        map.store("k".to_string(), bytes_item(b"new"));
        assert_eq!(
            map.load("k").unwrap().value,
            Value::Bytes(Bytes::from_static(b"new"))
        );
    }

    #[test]
    fn test_range_visits_all_and_aborts() {
        let map = ShardedMap::new();
        for i in 0..50 {
            map.store(format!("key{i}"), bytes_item(b"v"));
        }

        let mut seen = 0;
        map.range(|_, _| {
            seen += 1;
            true
        });
        assert_eq!(seen, 50);

        let mut visited = 0;
        map.range(|_, _| {
            visited += 1;
            visited < 10
        });
        assert_eq!(visited, 10);
    }

    #[test]
    fn test_len_sums_shards() {
        let map = ShardedMap::new();
        assert!(map.is_empty());
        for i in 0..100 {
            map.store(format!("key{i}"), bytes_item(b"v"));
        }
        assert_eq!(map.len(), 100);
    }

    #[test]
    fn test_concurrent_writers() {
        let map = Arc::new(ShardedMap::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = map.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("key-{t}-{i}");
                        map.store(key.clone(), bytes_item(b"v"));
                        assert!(map.load(&key).is_some());
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 1600);
    }
}
