use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{PackageState, SavedState};
use crate::unix_timestamp_of;

pub const STATE_FILE: &str = "install-state.json";

/// The flat file older releases wrote: package name to file list, nothing
/// else. Readable forever, deleted after the first current-format write.
pub const LEGACY_STATE_FILE: &str = "installed-mods.json";

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    #[serde(rename = "Install")]
    install: InstallSection,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstallSection {
    #[serde(rename = "Time")]
    time: u64,
    #[serde(rename = "Mods", default)]
    mods: BTreeMap<String, PackageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageRecord {
    #[serde(rename = "Time")]
    time: u64,
    #[serde(rename = "FsHash")]
    fs_hash: Option<u64>,
    #[serde(rename = "Partial", default)]
    partial: bool,
    #[serde(rename = "Dependencies", default)]
    dependencies: Vec<String>,
    #[serde(rename = "Files", default)]
    files: Vec<String>,
    #[serde(rename = "ShadowedBy", default)]
    shadowed_by: Vec<String>,
}

type LegacyStateFile = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    legacy_path: PathBuf,
}

impl StateStore {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            state_path: dir.join(STATE_FILE),
            legacy_path: dir.join(LEGACY_STATE_FILE),
        }
    }

    pub fn at(state_path: impl Into<PathBuf>, legacy_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
            legacy_path: legacy_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Reads the current snapshot, upgrading from the legacy file when only
    /// that exists. A missing store reads as an empty snapshot.
    pub fn read(&self) -> Result<SavedState> {
        match fs::read_to_string(&self.state_path) {
            Ok(raw) => {
                let parsed: StateFile = serde_json::from_str(&raw).with_context(|| {
                    format!("failed to parse state file: {}", self.state_path.display())
                })?;
                Ok(saved_state_from_file(parsed))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => self.read_legacy(),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read state file: {}", self.state_path.display())
            }),
        }
    }

    fn read_legacy(&self) -> Result<SavedState> {
        let raw = match fs::read_to_string(&self.legacy_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(SavedState::default());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to read legacy state file: {}",
                        self.legacy_path.display()
                    )
                });
            }
        };

        let legacy: LegacyStateFile = serde_json::from_str(&raw).with_context(|| {
            format!(
                "failed to parse legacy state file: {}",
                self.legacy_path.display()
            )
        })?;

        let file_time = fs::metadata(&self.legacy_path)
            .and_then(|metadata| metadata.modified())
            .map(unix_timestamp_of)
            .unwrap_or(0);
        Ok(upgrade_legacy(legacy, file_time))
    }

    /// Writes the current-format snapshot and retires the legacy file.
    pub fn write(&self, state: &SavedState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = state_file_from_saved(state);
        let content = serde_json::to_string_pretty(&file).with_context(|| {
            format!(
                "failed serializing state file: {}",
                self.state_path.display()
            )
        })?;
        fs::write(&self.state_path, content).with_context(|| {
            format!("failed to write state file: {}", self.state_path.display())
        })?;

        if self.legacy_path.exists() {
            fs::remove_file(&self.legacy_path).with_context(|| {
                format!(
                    "failed to remove legacy state file: {}",
                    self.legacy_path.display()
                )
            })?;
        }
        Ok(())
    }
}

/// Pure upgrade from the legacy flat shape: unknown fingerprints, nothing
/// partial, timestamps taken from the legacy file itself.
pub fn upgrade_legacy(legacy: BTreeMap<String, Vec<String>>, file_time_unix: u64) -> SavedState {
    let packages = legacy
        .into_iter()
        .map(|(name, files)| {
            let state = PackageState {
                time_unix: file_time_unix,
                fs_hash: None,
                partial: false,
                dependencies: Vec::new(),
                files,
                shadowed_by: Vec::new(),
            };
            (name, state)
        })
        .collect();
    SavedState {
        time_unix: file_time_unix,
        packages,
    }
}

fn saved_state_from_file(file: StateFile) -> SavedState {
    let packages = file
        .install
        .mods
        .into_iter()
        .map(|(name, record)| {
            let state = PackageState {
                time_unix: record.time,
                fs_hash: record.fs_hash,
                partial: record.partial,
                dependencies: record.dependencies,
                files: record.files,
                shadowed_by: record.shadowed_by,
            };
            (name, state)
        })
        .collect();
    SavedState {
        time_unix: file.install.time,
        packages,
    }
}

fn state_file_from_saved(state: &SavedState) -> StateFile {
    let mods = state
        .packages
        .iter()
        .map(|(name, package)| {
            let record = PackageRecord {
                time: package.time_unix,
                fs_hash: package.fs_hash,
                partial: package.partial,
                dependencies: package.dependencies.clone(),
                files: package.files.clone(),
                shadowed_by: package.shadowed_by.clone(),
            };
            (name.clone(), record)
        })
        .collect();
    StateFile {
        install: InstallSection {
            time: state.time_unix,
            mods,
        },
    }
}
