use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use modsync_core::{normalize_relative, EngineConfig, Package, RootedPath};
use modsync_state::{current_unix_timestamp, PackageState, SavedState, StateDelta};

use crate::backup::{standard_chain, BackupStrategy};
use crate::events::{EventSink, UpdateEvent};
use crate::fs_utils::prune_empty_ancestors;
use crate::install::{InstallHooks, InstallState, Installer};
use crate::source::{open_package_source, ContentSource};

pub type SourceFactory<'a> = dyn Fn(&Package) -> Result<Box<dyn ContentSource>> + 'a;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The folded end state; equal to what the delta stream produces.
    pub state: SavedState,
    pub cancelled: bool,
}

/// What a run would do, computed without touching the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Previously installed packages skipped by the unchanged-fingerprint
    /// fast path (no restore pass; they are still rewritten in place).
    pub unchanged: Vec<String>,
    /// Previously installed packages whose files will be restored.
    pub uninstall: Vec<String>,
    /// Packages installed this run, in priority order.
    pub install: Vec<String>,
}

/// Drives a full reconciliation pass: an uninstall phase over the previous
/// state, then an install phase over the selected packages in priority
/// order (earlier entries win path conflicts). After each package a
/// `StateDelta` is reported, whether or not the pass as a whole survives,
/// so persisted state can always track the real filesystem.
pub struct Updater<'a> {
    config: &'a EngineConfig,
    target_root: &'a Path,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Updater<'a> {
    pub fn new(config: &'a EngineConfig, target_root: &'a Path) -> Self {
        Self {
            config,
            target_root,
            cancel: None,
        }
    }

    /// Cooperative cancellation, polled at package boundaries only; the
    /// package in flight always runs to completion or error first.
    pub fn with_cancel_flag(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run(
        &self,
        previous: &SavedState,
        packages: &[Package],
        on_delta: &mut dyn FnMut(StateDelta),
        events: &mut dyn EventSink,
    ) -> Result<UpdateOutcome> {
        self.run_with_sources(previous, packages, &open_source_for, on_delta, events)
    }

    /// Same as `run`, with the package-source opener supplied by the
    /// caller. Sources for every selected package are opened up front, so
    /// an unreadable package fails the run before anything is touched.
    pub fn run_with_sources(
        &self,
        previous: &SavedState,
        packages: &[Package],
        sources: &SourceFactory,
        on_delta: &mut dyn FnMut(StateDelta),
        events: &mut dyn EventSink,
    ) -> Result<UpdateOutcome> {
        let selected: Vec<&Package> = packages.iter().filter(|p| p.enabled).collect();

        let mut installers = Vec::with_capacity(selected.len());
        for package in &selected {
            let source = sources(package)
                .with_context(|| format!("failed to open package '{}'", package.name))?;
            installers.push(Installer::new(package, source));
        }

        let mut state = previous.packages.clone();
        let total_steps = previous.packages.len() + selected.len() + 2;
        let mut progress = Progress::new(total_steps);

        progress.tick(events);

        // Uninstall phase.
        let incoming: HashMap<&str, Option<u64>> = selected
            .iter()
            .map(|p| (p.name.as_str(), p.fs_hash))
            .collect();

        events.emit(UpdateEvent::UninstallStarted {
            packages: previous.packages.len(),
        });
        for (name, entry) in &previous.packages {
            if self.is_cancelled() {
                events.emit(UpdateEvent::Cancelled);
                return Ok(self.outcome(state, true));
            }

            if let Some(&hash) = incoming.get(name.as_str()) {
                if hash.is_some() && hash == entry.fs_hash {
                    events.emit(UpdateEvent::PackageUnchanged { name: name.clone() });
                    progress.tick(events);
                    continue;
                }
            }

            events.emit(UpdateEvent::UninstallingPackage { name: name.clone() });
            let (delta, result) = self.uninstall_package(name, entry, events);
            apply_delta(&mut state, &delta);
            on_delta(delta);
            result?;
            progress.tick(events);
        }
        events.emit(UpdateEvent::UninstallFinished);

        // Install phase. The claim map is the single owner of path
        // ownership for this run; it is seeded with the files of surviving
        // packages that are not being reinstalled, so no path ends up with
        // two owners at rest.
        let mut claims: HashMap<String, String> = HashMap::new();
        let installing: HashSet<&str> = selected.iter().map(|p| p.name.as_str()).collect();
        for (name, entry) in &state {
            if installing.contains(name.as_str()) {
                continue;
            }
            for file in &entry.files {
                claims.insert(normalize_relative(Path::new(file)), name.clone());
            }
        }

        events.emit(UpdateEvent::InstallStarted {
            packages: installers.len(),
        });
        for mut installer in installers {
            if self.is_cancelled() {
                events.emit(UpdateEvent::Cancelled);
                return Ok(self.outcome(state, true));
            }

            events.emit(UpdateEvent::InstallingPackage {
                name: installer.package_name().to_string(),
            });
            let (delta, result) = self.install_package(&mut installer, &mut claims, &state);
            apply_delta(&mut state, &delta);
            on_delta(delta);
            result?;
            progress.tick(events);
        }
        events.emit(UpdateEvent::InstallFinished);

        progress.tick(events);
        Ok(self.outcome(state, false))
    }

    fn outcome(&self, state: BTreeMap<String, PackageState>, cancelled: bool) -> UpdateOutcome {
        UpdateOutcome {
            state: SavedState {
                time_unix: current_unix_timestamp(),
                packages: state,
            },
            cancelled,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Restores every file the package owns. A skipped restore (externally
    /// modified content) keeps the path owned; an error keeps the path and
    /// everything after it owned, marks the record permanently partial, and
    /// aborts the run after the delta is reported.
    fn uninstall_package(
        &self,
        name: &str,
        entry: &PackageState,
        events: &mut dyn EventSink,
    ) -> (StateDelta, Result<()>) {
        let chain = standard_chain(Some(entry.time_unix));

        let mut remaining: Vec<String> = Vec::new();
        let mut failure: Option<anyhow::Error> = None;
        for (index, file) in entry.files.iter().enumerate() {
            let dest = RootedPath::new(self.target_root, Path::new(file));
            match chain.restore_backup(&dest) {
                Ok(true) => {}
                Ok(false) => {
                    events.emit(UpdateEvent::ExternallyModified {
                        package: name.to_string(),
                        path: dest.full().to_path_buf(),
                    });
                    remaining.push(file.clone());
                }
                Err(err) => {
                    remaining.extend(entry.files[index..].iter().cloned());
                    failure = Some(err);
                    break;
                }
            }
        }

        if failure.is_none() {
            for file in &entry.files {
                prune_empty_ancestors(&self.target_root.join(file), self.target_root);
            }
        }

        let next = if remaining.is_empty() && failure.is_none() {
            None
        } else {
            let partial = match failure {
                Some(_) => true,
                None => entry.partial || remaining.len() < entry.files.len(),
            };
            Some(PackageState {
                time_unix: entry.time_unix,
                // Content no longer matches any package source; a later run
                // must not fast-path past this record.
                fs_hash: None,
                partial,
                dependencies: entry.dependencies.clone(),
                files: remaining,
                shadowed_by: entry.shadowed_by.clone(),
            })
        };

        let delta = StateDelta {
            name: name.to_string(),
            state: next,
        };
        match failure {
            Some(err) => (delta, Err(err)),
            None => (delta, Ok(())),
        }
    }

    /// Runs one installer against the shared claim map and derives its
    /// state record. The record is produced whether the installer finished
    /// or threw; an empty file list removes the record instead.
    fn install_package(
        &self,
        installer: &mut Installer,
        claims: &mut HashMap<String, String>,
        state: &BTreeMap<String, PackageState>,
    ) -> (StateDelta, Result<()>) {
        let chain = standard_chain(None);
        let target_root = self.target_root;
        let destination = |relative: &Path| RootedPath::new(target_root, relative);

        let mut hooks = ClaimHooks {
            claims,
            owner: installer.package_name().to_string(),
            shadowed_by_owners: BTreeSet::new(),
        };
        let result = installer.install(self.config, &destination, &chain, &mut hooks);
        let shadowed_by_owners = hooks.shadowed_by_owners;

        let files: Vec<String> = installer
            .files()
            .iter()
            .filter(|file| file.is_rooted_at(target_root))
            .map(|file| file.storage_relative())
            .collect();

        let name = installer.package_name().to_string();
        let next = if files.is_empty() {
            None
        } else {
            let mut dependencies: BTreeSet<String> = shadowed_by_owners;
            dependencies.extend(installer.declared_dependencies().iter().cloned());

            let completed = installer.state() == InstallState::Installed;
            let survivor_partial = state.get(&name).map(|e| e.partial).unwrap_or(false);
            let shadowed_by = state
                .get(&name)
                .map(|e| e.shadowed_by.clone())
                .unwrap_or_default();

            Some(PackageState {
                time_unix: current_unix_timestamp(),
                fs_hash: if completed {
                    installer.package_fs_hash()
                } else {
                    None
                },
                // Sticky: a record that survived the uninstall phase as
                // partial stays partial until it is fully uninstalled.
                partial: !completed || survivor_partial,
                dependencies: dependencies.into_iter().collect(),
                files,
                shadowed_by,
            })
        };

        (StateDelta { name, state: next }, result)
    }
}

/// Computes the run's shape without filesystem effects. Mirrors the fast
/// path exactly: a previously installed package is skipped only when a
/// selected package of the same name carries the same known fingerprint.
pub fn plan_update(previous: &SavedState, packages: &[Package]) -> UpdatePlan {
    let selected: Vec<&Package> = packages.iter().filter(|p| p.enabled).collect();
    let incoming: HashMap<&str, Option<u64>> = selected
        .iter()
        .map(|p| (p.name.as_str(), p.fs_hash))
        .collect();

    let mut plan = UpdatePlan::default();
    for (name, entry) in &previous.packages {
        let unchanged = incoming
            .get(name.as_str())
            .map(|&hash| hash.is_some() && hash == entry.fs_hash)
            .unwrap_or(false);
        if unchanged {
            plan.unchanged.push(name.clone());
        } else {
            plan.uninstall.push(name.clone());
        }
    }
    plan.install = selected.iter().map(|p| p.name.clone()).collect();
    plan
}

fn open_source_for(package: &Package) -> Result<Box<dyn ContentSource>> {
    open_package_source(&package.full_path)
}

fn apply_delta(state: &mut BTreeMap<String, PackageState>, delta: &StateDelta) {
    match &delta.state {
        Some(entry) => {
            state.insert(delta.name.clone(), entry.clone());
        }
        None => {
            state.remove(&delta.name);
        }
    }
}

/// Shared-claim hooks for one installer: a path owned by a different
/// package is rejected and its owner recorded as a dependency; an unowned
/// path is claimed immediately.
struct ClaimHooks<'a> {
    claims: &'a mut HashMap<String, String>,
    owner: String,
    shadowed_by_owners: BTreeSet<String>,
}

impl InstallHooks for ClaimHooks<'_> {
    fn accept(&mut self, path: &RootedPath) -> bool {
        let key = path.relative_key();
        match self.claims.get(&key) {
            Some(existing) if *existing != self.owner => {
                self.shadowed_by_owners.insert(existing.clone());
                false
            }
            _ => {
                self.claims.insert(key, self.owner.clone());
                true
            }
        }
    }
}

/// Monotonic fraction over `uninstall + install + 2` discrete steps.
struct Progress {
    total: usize,
    completed: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total: total.max(1),
            completed: 0,
        }
    }

    fn tick(&mut self, events: &mut dyn EventSink) {
        self.completed = (self.completed + 1).min(self.total);
        events.emit(UpdateEvent::Progress {
            fraction: self.completed as f64 / self.total as f64,
        });
    }
}
