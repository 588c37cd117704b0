use std::collections::BTreeMap;

/// Everything currently installed: a snapshot timestamp plus one record per
/// package that owns at least one file in the target tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedState {
    pub time_unix: u64,
    pub packages: BTreeMap<String, PackageState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageState {
    /// When this package was last (re)installed.
    pub time_unix: u64,
    /// Source fingerprint at install time. `None` means unknown — a partial
    /// install, a directory-backed package, or a record upgraded from the
    /// legacy format.
    pub fs_hash: Option<u64>,
    /// Sticky: once true it stays true across runs until the package is
    /// fully uninstalled.
    pub partial: bool,
    /// Packages whose files shadowed paths this one wanted.
    pub dependencies: Vec<String>,
    /// Target-relative paths owned by this package. Unique across packages.
    pub files: Vec<String>,
    /// Reserved for the reverse of `dependencies`; carried but never
    /// populated here.
    pub shadowed_by: Vec<String>,
}

/// Per-package outcome reported by the updater after each package, whether
/// or not the pass as a whole succeeds. `None` removes the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDelta {
    pub name: String,
    pub state: Option<PackageState>,
}

impl SavedState {
    pub fn apply(&mut self, delta: StateDelta) {
        match delta.state {
            Some(state) => {
                self.packages.insert(delta.name, state);
            }
            None => {
                self.packages.remove(&delta.name);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
