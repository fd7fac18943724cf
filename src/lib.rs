//! BoltCache - In-Memory Key-Value Cache Server
//!
//! Redis-modelled cache holding typed values (string, list, set, hash)
//! with per-key TTL, periodic JSON snapshots for warm restart, and three
//! wire surfaces over one engine: a text line protocol, a RESP2 subset,
//! and an HTTP/JSON API with WebSocket pub/sub.

pub mod config;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod pubsub;
pub mod script;
pub mod server;
pub mod storage;

pub use config::{Config, ConfigError, ServerMode};
pub use metrics::Metrics;
pub use persistence::{SnapshotStore, SnapshotTask};
pub use protocol::{RespCodec, RespReply, TextCommand, TextReply};
pub use pubsub::PubSub;
pub use script::ScriptEngine;
pub use server::{AppState, Server};
pub use storage::{Cache, ExpirySweeper, Item, Value};
