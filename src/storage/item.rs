//! Cache Items
//!
//! Typed values with optional absolute expiry, plus the JSON shape they
//! take inside a snapshot.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Payload stored under a key.
///
/// Every front-end dispatches on this tag; there is no untyped escape hatch.
/// List and set elements and hash field values are always strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Opaque byte-or-string blob written by plain SET.
    Bytes(Bytes),
    /// Ordered sequence, head first.
    List(VecDeque<String>),
    /// Unordered distinct members.
    Set(HashSet<String>),
    /// Field name to string value.
    Hash(HashMap<String, String>),
}

/// The record a key maps to: a typed value and an optional expiry instant.
///
/// `expires_at == None` means the item never expires.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub value: Value,
    pub expires_at: Option<SystemTime>,
}

impl Item {
    /// Create an item. A zero TTL means no expiry.
    pub fn new(value: Value, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(SystemTime::now() + ttl)
        };
        Self { value, expires_at }
    }

    /// Create an item that never expires.
    pub fn never(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|t| SystemTime::now() > t)
            .unwrap_or(false)
    }
}

/// On-disk form of a [`Value`].
///
/// The snapshot is plain JSON, so composite values come back as generic
/// arrays and objects; serde coerces them into the typed shape here and
/// rejects anything that does not fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PersistedValue {
    String(String),
    List(Vec<String>),
    Set(Vec<String>),
    Hash(HashMap<String, String>),
}

/// On-disk form of an [`Item`]. Expiry is persisted as unix millis so TTLs
/// keep their wall-clock meaning across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedItem {
    #[serde(flatten)]
    pub value: PersistedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl From<&Item> for PersistedItem {
    fn from(item: &Item) -> Self {
        let value = match &item.value {
            Value::Bytes(b) => PersistedValue::String(String::from_utf8_lossy(b).into_owned()),
            Value::List(l) => PersistedValue::List(l.iter().cloned().collect()),
            Value::Set(s) => PersistedValue::Set(s.iter().cloned().collect()),
            Value::Hash(h) => PersistedValue::Hash(h.clone()),
        };
        let expires_at_ms = item.expires_at.map(|t| {
            t.duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64
        });
        Self {
            value,
            expires_at_ms,
        }
    }
}

impl From<PersistedItem> for Item {
    fn from(persisted: PersistedItem) -> Self {
        let value = match persisted.value {
            PersistedValue::String(s) => Value::Bytes(Bytes::from(s)),
            PersistedValue::List(l) => Value::List(l.into()),
            PersistedValue::Set(m) => Value::Set(m.into_iter().collect()),
            PersistedValue::Hash(h) => Value::Hash(h),
        };
        let expires_at = persisted
            .expires_at_ms
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms));
        Self { value, expires_at }
    }
}
