//! Snapshot Persistence
//!
//! Periodic JSON dump of the whole keyspace, reloaded on startup for warm
//! restart. The snapshot is best-effort: a failed cycle is logged and
//! skipped, and a corrupt file just means the server starts empty.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use super::backup::create_backup;
use crate::storage::{Cache, Item, PersistedItem};

/// Reads and writes the snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
    backup_count: usize,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, backup_count: usize) -> Self {
        Self {
            path: path.into(),
            backup_count,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialise the keyspace and atomically replace the snapshot file.
    ///
    /// The walk holds no lock across the whole map, so the result is
    /// consistent per key, not across keys. Returns the entry count.
    pub fn save(&self, cache: &Cache) -> io::Result<usize> {
        let mut entries: HashMap<String, PersistedItem> = HashMap::new();
        cache.range(|key, item| {
            entries.insert(key.to_string(), PersistedItem::from(item));
            true
        });

        let data = serde_json::to_vec(&entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.backup_count > 0 && self.path.exists() {
            if let Err(e) = create_backup(&self.path) {
                warn!(error = %e, "failed to back up previous snapshot");
            }
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &self.path)?;

        debug!(entries = entries.len(), path = %self.path.display(), "snapshot written");
        Ok(entries.len())
    }

    /// Load the snapshot into the cache. A missing file loads nothing; a
    /// file that fails to parse is an error the caller logs and treats as
    /// "no snapshot".
    pub fn load(&self, cache: &Cache) -> io::Result<usize> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let entries: HashMap<String, PersistedItem> = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let count = entries.len();
        for (key, persisted) in entries {
            cache.restore(key, Item::from(persisted));
        }
        Ok(count)
    }
}

/// Periodic snapshot task.
pub struct SnapshotTask {
    cache: Cache,
    store: SnapshotStore,
    interval: Duration,
}

impl SnapshotTask {
    pub fn new(cache: Cache, store: SnapshotStore, snapshot_interval: Duration) -> Self {
        Self {
            cache,
            store,
            interval: snapshot_interval,
        }
    }

    /// Run the snapshot loop (should be spawned as a task). Failed cycles
    /// are logged and skipped; the loop never dies.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        info!(
            path = %self.store.path().display(),
            interval = ?self.interval,
            "snapshot persistence started"
        );

        loop {
            ticker.tick().await;
            match self.store.save(&self.cache) {
                Ok(entries) => debug!(entries, "periodic snapshot complete"),
                Err(e) => warn!(error = %e, "snapshot cycle failed, will retry next tick"),
            }
        }
    }

    /// Spawn the snapshot loop as a background task.
    pub fn spawn(
        cache: Cache,
        store: SnapshotStore,
        snapshot_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(cache, store, snapshot_interval).run())
    }
}
