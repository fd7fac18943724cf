//! Storage Engine
//!
//! Sharded in-memory keyspace holding typed items with optional TTL.

mod cache;
mod item;
mod sharded_map;
mod sweeper;

pub use cache::Cache;
pub use item::{Item, PersistedItem, PersistedValue, Value};
pub use sharded_map::{ShardedMap, SHARD_COUNT};
pub use sweeper::ExpirySweeper;
