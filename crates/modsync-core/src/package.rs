use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub full_path: PathBuf,
    pub enabled: bool,
    pub fs_hash: Option<u64>,
}

impl Package {
    /// Builds a package record for a source on disk, stamping its current
    /// fingerprint. Directory sources carry no fingerprint and are treated
    /// as always changed.
    pub fn resolve(name: &str, full_path: impl Into<PathBuf>, enabled: bool) -> Result<Self> {
        let full_path = full_path.into();
        let fs_hash = package_fingerprint(&full_path)?;
        Ok(Self {
            name: name.to_string(),
            full_path,
            enabled,
            fs_hash,
        })
    }
}

/// Cheap change signal for a package source: a mix of last-write time and
/// length for files, `None` for directories. Not a content hash.
pub fn package_fingerprint(path: &Path) -> Result<Option<u64>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read package source: {}", path.display()))?;
    if metadata.is_dir() {
        return Ok(None);
    }

    let modified = metadata
        .modified()
        .with_context(|| format!("failed to read package mtime: {}", path.display()))?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(Some(mix_fingerprint(
        since_epoch.as_secs(),
        since_epoch.subsec_nanos(),
        metadata.len(),
    )))
}

fn mix_fingerprint(secs: u64, nanos: u32, len: u64) -> u64 {
    let mut mixed = secs.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    mixed ^= u64::from(nanos).rotate_left(32);
    mixed ^= len.wrapping_mul(0x2545_f491_4f6c_dd1d);
    mixed
}
