use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use filetime::FileTime;
use modsync_core::{RootedPath, BACKUP_SUFFIX};
use modsync_state::unix_timestamp_of;

use crate::fs_utils::remove_file_if_exists;

/// Four-operation contract shared by every layer of the backup chain.
///
/// `restore_backup` returns `false` when a backup existed but was
/// intentionally not restored; `true` means restored or nothing to restore.
pub trait BackupStrategy {
    fn perform_backup(&self, path: &RootedPath) -> Result<()>;
    fn restore_backup(&self, path: &RootedPath) -> Result<bool>;
    fn delete_backup(&self, path: &RootedPath) -> Result<()>;
    fn after_install(&self, path: &RootedPath) -> Result<()>;
}

/// Innermost mechanism: move the live file aside to `<path>.orig` and back.
pub struct SuffixBackup;

impl BackupStrategy for SuffixBackup {
    fn perform_backup(&self, path: &RootedPath) -> Result<()> {
        let live = path.full();
        if is_backup_name(live) {
            return Err(anyhow!(
                "refusing to back up a path already in backup form: {}",
                live.display()
            ));
        }
        if !live.exists() {
            return Ok(());
        }

        let backup = backup_path(live);
        if backup.exists() {
            // An existing backup predates this pass and stays authoritative;
            // the live file is package-managed content and can go.
            fs::remove_file(live)
                .with_context(|| format!("failed to remove {}", live.display()))?;
            return Ok(());
        }

        fs::rename(live, &backup).with_context(|| {
            format!(
                "failed to move {} to {}",
                live.display(),
                backup.display()
            )
        })?;
        Ok(())
    }

    fn restore_backup(&self, path: &RootedPath) -> Result<bool> {
        let live = path.full();
        let backup = backup_path(live);

        remove_file_if_exists(live)
            .with_context(|| format!("failed to remove {}", live.display()))?;
        if !backup.exists() {
            return Ok(true);
        }

        fs::rename(&backup, live).with_context(|| {
            format!(
                "failed to move {} back to {}",
                backup.display(),
                live.display()
            )
        })?;
        Ok(true)
    }

    fn delete_backup(&self, path: &RootedPath) -> Result<()> {
        let backup = backup_path(path.full());
        remove_file_if_exists(&backup)
            .with_context(|| format!("failed to delete backup {}", backup.display()))?;
        Ok(())
    }

    fn after_install(&self, _path: &RootedPath) -> Result<()> {
        Ok(())
    }
}

/// Decorator that refuses to clobber content replaced by a third party
/// (e.g. the application's own updater) after `backup_time_unix`.
pub struct SkipUpdated<S> {
    inner: S,
    backup_time_unix: Option<u64>,
}

impl<S: BackupStrategy> SkipUpdated<S> {
    pub fn new(inner: S, backup_time_unix: Option<u64>) -> Self {
        Self {
            inner,
            backup_time_unix,
        }
    }
}

impl<S: BackupStrategy> BackupStrategy for SkipUpdated<S> {
    fn perform_backup(&self, path: &RootedPath) -> Result<()> {
        self.inner.perform_backup(path)
    }

    fn restore_backup(&self, path: &RootedPath) -> Result<bool> {
        if let Some(backup_time) = self.backup_time_unix {
            if let Some(stamp) = file_stamp_unix(path.full())? {
                if stamp > backup_time {
                    self.inner.delete_backup(path)?;
                    return Ok(false);
                }
            }
        }
        self.inner.restore_backup(path)
    }

    fn delete_backup(&self, path: &RootedPath) -> Result<()> {
        self.inner.delete_backup(path)
    }

    fn after_install(&self, path: &RootedPath) -> Result<()> {
        self.inner.after_install(path)?;
        clamp_future_stamp(path.full())
    }
}

/// The chain the engine runs with: suffix rename inside, skip-if-updated
/// outside. Composition order is part of the contract.
pub fn standard_chain(backup_time_unix: Option<u64>) -> SkipUpdated<SuffixBackup> {
    SkipUpdated::new(SuffixBackup, backup_time_unix)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(BACKUP_SUFFIX);
    PathBuf::from(os)
}

fn is_backup_name(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_lowercase()
                .ends_with(BACKUP_SUFFIX)
        })
        .unwrap_or(false)
}

/// Creation timestamp of a file in unix seconds, falling back to the
/// modification time on filesystems without birth-time support. `None` when
/// the file does not exist.
fn file_stamp_unix(path: &Path) -> Result<Option<u64>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", path.display()));
        }
    };

    let stamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .with_context(|| format!("failed to read timestamps of {}", path.display()))?;
    Ok(Some(unix_timestamp_of(stamp)))
}

/// Archive metadata occasionally stamps files in the future, which would
/// permanently trigger the externally-updated skip on the next run. Both
/// timestamps are checked: birth time where the filesystem has one, and the
/// modification time that stands in for it everywhere else.
fn clamp_future_stamp(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", path.display()));
        }
    };

    let now = SystemTime::now();
    let now_unix = unix_timestamp_of(now);
    let created_future = metadata
        .created()
        .map(|stamp| unix_timestamp_of(stamp) > now_unix)
        .unwrap_or(false);
    let modified_future = metadata
        .modified()
        .map(|stamp| unix_timestamp_of(stamp) > now_unix)
        .unwrap_or(false);

    if created_future || modified_future {
        filetime::set_file_mtime(path, FileTime::from_system_time(now))
            .with_context(|| format!("failed to clamp timestamp of {}", path.display()))?;
    }
    Ok(())
}
