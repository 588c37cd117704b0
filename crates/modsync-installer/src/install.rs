use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use modsync_core::{EngineConfig, Package, RootedPath, REMOVE_SUFFIX};

use crate::backup::BackupStrategy;
use crate::fs_utils::create_parent_dirs;
use crate::roots::find_roots;
use crate::source::ContentSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    /// Set the instant installation begins; observed at rest only when the
    /// file loop was interrupted by an error.
    PartiallyInstalled,
    Installed,
}

/// Per-file callbacks the orchestrator threads through an installation.
/// `accept` decides ownership; the rest are notifications.
pub trait InstallHooks {
    fn accept(&mut self, path: &RootedPath) -> bool;
    fn not_accepted(&mut self, _path: &RootedPath) {}
    fn before(&mut self, _path: &RootedPath) {}
    fn after(&mut self, _path: &RootedPath) {}
}

/// Hooks for standalone use: every path is accepted.
pub struct AcceptAll;

impl InstallHooks for AcceptAll {
    fn accept(&mut self, _path: &RootedPath) -> bool {
        true
    }
}

/// One package's installation attempt. Single-use: driving `install` twice
/// on the same instance is a contract error.
pub struct Installer {
    package_name: String,
    package_fs_hash: Option<u64>,
    source: Box<dyn ContentSource>,
    declared_dependencies: BTreeSet<String>,
    files: BTreeSet<RootedPath>,
    state: InstallState,
}

impl Installer {
    pub fn new(package: &Package, source: Box<dyn ContentSource>) -> Self {
        Self {
            package_name: package.name.clone(),
            package_fs_hash: package.fs_hash,
            source,
            declared_dependencies: BTreeSet::new(),
            files: BTreeSet::new(),
            state: InstallState::NotInstalled,
        }
    }

    /// Dependencies the package declares intrinsically, merged with the
    /// shadowing dependencies detected during installation.
    pub fn with_declared_dependencies(mut self, dependencies: BTreeSet<String>) -> Self {
        self.declared_dependencies = dependencies;
        self
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn package_fs_hash(&self) -> Option<u64> {
        self.package_fs_hash
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Every path this installer claimed, whether or not its content write
    /// completed.
    pub fn files(&self) -> &BTreeSet<RootedPath> {
        &self.files
    }

    pub fn declared_dependencies(&self) -> &BTreeSet<String> {
        &self.declared_dependencies
    }

    /// Runs the file loop. Per entry: resolve the destination, apply the
    /// removal-suffix convention, ask `hooks.accept`, back up whatever
    /// occupies the destination, record ownership, then write content
    /// (unless the entry is a removal). An error leaves the installer
    /// `PartiallyInstalled` with an accurate record of the paths it touched.
    pub fn install(
        &mut self,
        config: &EngineConfig,
        destination: &dyn Fn(&Path) -> RootedPath,
        backup: &dyn BackupStrategy,
        hooks: &mut dyn InstallHooks,
    ) -> Result<()> {
        if self.state != InstallState::NotInstalled {
            return Err(anyhow!(
                "installer for '{}' has already run",
                self.package_name
            ));
        }
        self.state = InstallState::PartiallyInstalled;

        let directories = self.source.list_dirs()?;
        let roots = find_roots(&directories, config);

        let mut touched: BTreeSet<RootedPath> = BTreeSet::new();
        let result = self.source.visit_files(&mut |entry_path, reader| {
            let Some(relative) = relative_under_roots(entry_path, &roots) else {
                return Ok(());
            };
            if config.is_excluded(&relative) {
                return Ok(());
            }

            let (relative, removal) = split_removal(&relative);
            let dest = destination(&relative);

            if !hooks.accept(&dest) {
                hooks.not_accepted(&dest);
                return Ok(());
            }

            hooks.before(&dest);
            backup.perform_backup(&dest)?;
            // Ownership is recorded the moment the backup lands, so a write
            // interrupted below still leaves the path accounted for.
            touched.insert(dest.clone());

            if !removal {
                create_parent_dirs(dest.full())?;
                let mut out = File::create(dest.full())
                    .with_context(|| format!("failed to create {}", dest.full().display()))?;
                io::copy(reader, &mut out)
                    .with_context(|| format!("failed to write {}", dest.full().display()))?;
            }

            backup.after_install(&dest)?;
            hooks.after(&dest);
            Ok(())
        });

        self.files.extend(touched);
        result?;

        self.state = InstallState::Installed;
        Ok(())
    }
}

/// Maps a package-top-relative entry to its root-relative path, or `None`
/// when the entry lies outside every resolved root. Roots never nest, so at
/// most one root matches.
fn relative_under_roots(entry: &Path, roots: &BTreeSet<PathBuf>) -> Option<PathBuf> {
    for root in roots {
        if let Ok(relative) = entry.strip_prefix(root) {
            if !relative.as_os_str().is_empty() {
                return Some(relative.to_path_buf());
            }
        }
    }
    None
}

fn split_removal(relative: &Path) -> (PathBuf, bool) {
    let Some(name) = relative.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return (relative.to_path_buf(), false);
    };
    if name.to_lowercase().ends_with(REMOVE_SUFFIX) {
        let stripped = name[..name.len() - REMOVE_SUFFIX.len()].to_string();
        return (relative.with_file_name(stripped), true);
    }
    (relative.to_path_buf(), false)
}
