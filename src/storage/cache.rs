//! Cache Engine
//!
//! Typed operations over the sharded keyspace, shared by every front-end.
//! Reads apply lazy expiry; composite operations run their whole
//! load-mutate-store sequence under the owning shard's write lock.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::item::{Item, Value};
use super::sharded_map::ShardedMap;
use crate::pubsub::{PubSub, Sink, SubscriberId};

/// The engine. Cheap to clone; clones share the keyspace and the pub/sub
/// registry.
#[derive(Clone, Default)]
pub struct Cache {
    data: Arc<ShardedMap>,
    pubsub: Arc<PubSub>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `key` with an opaque blob. A zero TTL means no expiry.
    pub fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.data
            .store(key.to_string(), Item::new(Value::Bytes(value), ttl));
    }

    /// Get the blob under `key`. Expired items are deleted on sight; a key
    /// holding a composite value is a wrong-type read and reports not-found.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let item = self.data.load(key)?;
        if item.is_expired() {
            self.data.remove(key);
            return None;
        }
        match item.value {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Remove `key` unconditionally, returning whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.data.remove(key)
    }

    /// Whether `key` holds a live item of any type.
    pub fn exists(&self, key: &str) -> bool {
        match self.data.load(key) {
            Some(item) if item.is_expired() => {
                self.data.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Push values onto the head of the list at `key`, each in turn, so the
    /// last argument becomes the new head. Creates the list if the key is
    /// missing; replaces the item if it holds another type. Returns the new
    /// length.
    pub fn lpush(&self, key: &str, values: &[String]) -> usize {
        self.data.with_shard_mut(key, |items| {
            if let Some(item) = items.get_mut(key) {
                if !item.is_expired() {
                    if let Value::List(list) = &mut item.value {
                        for v in values {
                            list.push_front(v.clone());
                        }
                        item.expires_at = None;
                        return list.len();
                    }
                }
            }

            let mut list = VecDeque::with_capacity(values.len());
            for v in values {
                list.push_front(v.clone());
            }
            let len = list.len();
            items.insert(key.to_string(), Item::never(Value::List(list)));
            len
        })
    }

    /// Pop the head of the list at `key`. Popping the last element deletes
    /// the key.
    pub fn lpop(&self, key: &str) -> Option<String> {
        self.data.with_shard_mut(key, |items| {
            let (popped, drop_key) = match items.get_mut(key) {
                None => (None, false),
                Some(item) if item.is_expired() => (None, true),
                Some(item) => match &mut item.value {
                    Value::List(list) => {
                        let head = list.pop_front();
                        let emptied = list.is_empty();
                        if head.is_some() {
                            item.expires_at = None;
                        }
                        (head, emptied)
                    }
                    _ => (None, false),
                },
            };
            if drop_key {
                items.remove(key);
            }
            popped
        })
    }

    /// Insert members into the set at `key`, creating or replacing as for
    /// `lpush`. Returns the cardinality after insertion.
    pub fn sadd(&self, key: &str, members: &[String]) -> usize {
        self.data.with_shard_mut(key, |items| {
            if let Some(item) = items.get_mut(key) {
                if !item.is_expired() {
                    if let Value::Set(set) = &mut item.value {
                        for m in members {
                            set.insert(m.clone());
                        }
                        item.expires_at = None;
                        return set.len();
                    }
                }
            }

            let set: HashSet<String> = members.iter().cloned().collect();
            let cardinality = set.len();
            items.insert(key.to_string(), Item::never(Value::Set(set)));
            cardinality
        })
    }

    /// All members of the set at `key`, in no particular order. Missing key
    /// or wrong type yields an empty vec.
    pub fn smembers(&self, key: &str) -> Vec<String> {
        let item = match self.data.load(key) {
            Some(item) => item,
            None => return Vec::new(),
        };
        if item.is_expired() {
            self.data.remove(key);
            return Vec::new();
        }
        match item.value {
            Value::Set(set) => set.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Create or overwrite one field of the hash at `key`, creating or
    /// replacing the hash as for `lpush`.
    pub fn hset(&self, key: &str, field: &str, value: &str) {
        self.data.with_shard_mut(key, |items| {
            if let Some(item) = items.get_mut(key) {
                if !item.is_expired() {
                    if let Value::Hash(hash) = &mut item.value {
                        hash.insert(field.to_string(), value.to_string());
                        item.expires_at = None;
                        return;
                    }
                }
            }

            let mut hash = HashMap::new();
            hash.insert(field.to_string(), value.to_string());
            items.insert(key.to_string(), Item::never(Value::Hash(hash)));
        });
    }

    /// Get one field of the hash at `key`.
    pub fn hget(&self, key: &str, field: &str) -> Option<String> {
        let item = self.data.load(key)?;
        if item.is_expired() {
            self.data.remove(key);
            return None;
        }
        match item.value {
            Value::Hash(hash) => hash.get(field).cloned(),
            _ => None,
        }
    }

    /// Live key count. Weakly consistent.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Scan for expired keys, then delete them. No shard lock is held
    /// between the scan and the deletes; readers' lazy expiry covers the
    /// race with concurrent writers.
    pub fn sweep_expired(&self) -> usize {
        let mut expired = Vec::new();
        self.data.range(|key, item| {
            if item.is_expired() {
                expired.push(key.to_string());
            }
            true
        });

        let mut removed = 0;
        for key in &expired {
            if self.data.remove(key) {
                removed += 1;
            }
        }
        removed
    }

    /// Visit every entry, for snapshotting. See [`ShardedMap::range`] for
    /// the consistency caveats.
    pub fn range(&self, f: impl FnMut(&str, &Item) -> bool) {
        self.data.range(f)
    }

    /// Store a reconstructed item, used when loading a snapshot.
    pub fn restore(&self, key: String, item: Item) {
        self.data.store(key, item);
    }

    /// The pub/sub registry backing `subscribe` and `publish`.
    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    /// Register a sink under `channel`.
    pub fn subscribe(&self, channel: &str, id: SubscriberId, sink: Sink) {
        self.pubsub.subscribe(channel, id, sink);
    }

    /// Fan a message out to `channel`, returning the delivery count.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        self.pubsub.publish(channel, message)
    }
}
