//! Backup Rotation
//!
//! Timestamped copies of the snapshot file, pruned on a slow cadence. The
//! main snapshot is never touched; rotation only fires once enough backups
//! pile up, so routine snapshot cycles stay cheap.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};

/// How often the rotation task inspects the snapshot directory.
const ROTATION_INTERVAL: Duration = Duration::from_secs(3600);

/// Copy the current snapshot aside as `<file>.backup.<YYYYMMDD-HHMMSS>`.
pub fn create_backup(file: &Path) -> io::Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut name = file.as_os_str().to_os_string();
    name.push(format!(".backup.{stamp}"));
    let backup = PathBuf::from(name);

    fs::copy(file, &backup)?;
    Ok(backup)
}

/// Prune old backups of `file`.
///
/// Nothing happens until at least `cleanup_when_exceeds` backups exist;
/// when rotation fires, the oldest (by mtime) are removed until exactly
/// `backup_count` newest remain. Returns how many files were deleted.
pub fn rotate_backups(
    file: &Path,
    backup_count: usize,
    cleanup_when_exceeds: usize,
) -> io::Result<usize> {
    if backup_count == 0 || cleanup_when_exceeds == 0 {
        return Ok(0);
    }

    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let main_name = file.file_name().unwrap_or_default().to_string_lossy();
    let prefix = format!("{main_name}.backup.");

    let mut backups: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == main_name || !name.starts_with(&prefix) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        backups.push((entry.path(), modified));
    }

    if backups.len() <= backup_count || backups.len() < cleanup_when_exceeds {
        return Ok(0);
    }

    backups.sort_by_key(|(_, modified)| *modified);

    let to_delete = backups.len() - backup_count;
    let mut deleted = 0;
    for (path, _) in backups.into_iter().take(to_delete) {
        if fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, kept = backup_count, "rotated snapshot backups");
    }
    Ok(deleted)
}

/// Hourly rotation task.
pub struct BackupRotation {
    file: PathBuf,
    backup_count: usize,
    cleanup_when_exceeds: usize,
}

impl BackupRotation {
    pub fn new(file: impl Into<PathBuf>, backup_count: usize, cleanup_when_exceeds: usize) -> Self {
        Self {
            file: file.into(),
            backup_count,
            cleanup_when_exceeds,
        }
    }

    /// Run the rotation loop (should be spawned as a task).
    pub async fn run(self) {
        let mut ticker = interval(ROTATION_INTERVAL);
        info!(file = %self.file.display(), "backup rotation started");

        loop {
            ticker.tick().await;
            if let Err(e) =
                rotate_backups(&self.file, self.backup_count, self.cleanup_when_exceeds)
            {
                warn!(error = %e, "backup rotation failed");
            }
        }
    }

    /// Spawn the rotation loop as a background task.
    pub fn spawn(
        file: impl Into<PathBuf>,
        backup_count: usize,
        cleanup_when_exceeds: usize,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Self::new(file, backup_count, cleanup_when_exceeds).run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::UNIX_EPOCH;
    use tempfile::tempdir;

    fn touch_with_mtime(path: &Path, secs: u64) {
        let f = File::create(path).unwrap();
        f.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn test_create_backup_naming() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("boltcache.json");
        fs::write(&main, b"{}").unwrap();

        let backup = create_backup(&main).unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("boltcache.json.backup."));
        assert_eq!(fs::read(&backup).unwrap(), b"{}");
    }

    #[test]
    fn test_rotation_hysteresis() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("boltcache.json");
        fs::write(&main, b"{}").unwrap();

        // Four backups: below the trigger, nothing happens.
        for i in 0..4 {
            let path = dir.path().join(format!("boltcache.json.backup.2024010{i}-000000"));
            touch_with_mtime(&path, 1_000 + i);
        }
        assert_eq!(rotate_backups(&main, 3, 5).unwrap(), 0);

        // A fifth backup reaches the trigger: the two oldest go.
        let fifth = dir.path().join("boltcache.json.backup.20240104-000000");
        touch_with_mtime(&fifth, 1_004);
        assert_eq!(rotate_backups(&main, 3, 5).unwrap(), 2);

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".backup."))
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                "boltcache.json.backup.20240102-000000",
                "boltcache.json.backup.20240103-000000",
                "boltcache.json.backup.20240104-000000",
            ]
        );

        // The main snapshot was never a candidate.
        assert!(main.exists());
    }

    #[test]
    fn test_rotation_disabled_by_zero_config() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("boltcache.json");
        for i in 0..10 {
            touch_with_mtime(
                &dir.path().join(format!("boltcache.json.backup.{i}")),
                1_000 + i,
            );
        }

        assert_eq!(rotate_backups(&main, 0, 5).unwrap(), 0);
        assert_eq!(rotate_backups(&main, 3, 0).unwrap(), 0);
    }
}
