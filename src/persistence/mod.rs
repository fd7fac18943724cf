//! Persistence Module
//!
//! Best-effort periodic snapshots with timestamped backup rotation.

mod backup;
mod snapshot;

pub use backup::{create_backup, rotate_backups, BackupRotation};
pub use snapshot::{SnapshotStore, SnapshotTask};
