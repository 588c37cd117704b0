use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::CommandFactory;
use modsync_core::Profile;
use modsync_installer::{plan_update, Updater};
use modsync_resolver::{resolve_transitive, DependencyItem};
use modsync_state::{current_unix_timestamp, SavedState, StateDelta, StateStore};

use crate::render::{self, CliSink};
use crate::{Cli, Commands};

pub fn run_cli(cli: Cli) -> Result<()> {
    let profile_path = cli
        .profile
        .clone()
        .unwrap_or_else(|| PathBuf::from("modsync.toml"));

    match cli.command {
        Commands::Sync { dry_run } => run_sync(&profile_path, dry_run),
        Commands::List => run_list(&profile_path),
        Commands::Status => run_status(&profile_path),
        Commands::Doctor => run_doctor(&profile_path),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "modsync", &mut std::io::stdout());
            Ok(())
        }
    }
}

pub(crate) fn run_sync(profile_path: &Path, dry_run: bool) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    let config = profile.engine_config()?;
    let store = StateStore::in_dir(&profile.target);
    let previous = store.read()?;
    let packages = profile.resolve_packages()?;

    if dry_run {
        let plan = plan_update(&previous, &packages);
        for line in render::plan_lines(&plan) {
            println!("{line}");
        }
        return Ok(());
    }

    // State is flushed after every package delta, so a crash mid-run still
    // leaves the store describing the real filesystem.
    let mut folded = previous.clone();
    let mut persist_error: Option<anyhow::Error> = None;
    let mut sink = CliSink::new();
    let updater = Updater::new(&config, &profile.target);
    let result = {
        let mut on_delta = |delta: StateDelta| {
            folded.apply(delta);
            folded.time_unix = current_unix_timestamp();
            if persist_error.is_none() {
                if let Err(err) = store.write(&folded) {
                    persist_error = Some(err);
                }
            }
        };
        updater.run(&previous, &packages, &mut on_delta, &mut sink)
    };
    sink.finish();

    let outcome = result?;
    if let Some(err) = persist_error {
        return Err(err.context("reconciliation succeeded but state could not be persisted"));
    }
    store.write(&outcome.state)?;

    for line in render::summary_lines(&outcome.state, &sink.skipped) {
        println!("{line}");
    }
    if outcome.cancelled {
        println!("cancelled before completion; already-processed packages were kept");
    }
    Ok(())
}

pub(crate) fn run_list(profile_path: &Path) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    let state = StateStore::in_dir(&profile.target).read()?;

    if state.is_empty() {
        println!("nothing installed");
        return Ok(());
    }
    for (name, package) in &state.packages {
        println!("{}", render::package_line(name, package));
    }
    Ok(())
}

pub(crate) fn run_status(profile_path: &Path) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    let state = StateStore::in_dir(&profile.target).read()?;

    if state.is_empty() {
        println!("nothing installed");
        return Ok(());
    }

    let closures = transitive_dependencies(&state);
    for (name, package) in &state.packages {
        println!("{}", render::package_line(name, package));
        if !package.dependencies.is_empty() {
            println!("  depends on: {}", package.dependencies.join(", "));
        }
        if let Some(all) = closures.get(name) {
            let indirect: Vec<&str> = all
                .iter()
                .map(String::as_str)
                .filter(|dep| !package.dependencies.iter().any(|d| d == dep))
                .collect();
            if !indirect.is_empty() {
                println!("  depends transitively on: {}", indirect.join(", "));
            }
        }
        for file in &package.files {
            println!("  {file}");
        }
    }
    Ok(())
}

pub(crate) fn run_doctor(profile_path: &Path) -> Result<()> {
    let profile = Profile::load(profile_path)?;
    let store = StateStore::in_dir(&profile.target);
    let state = store.read()?;

    println!("profile: {}", profile_path.display());
    println!("target: {}", profile.target.display());
    println!(
        "state file: {} ({})",
        store.state_path().display(),
        if store.state_path().exists() {
            "present"
        } else {
            "absent"
        }
    );
    if store.legacy_path().exists() {
        println!(
            "legacy state file: {} (will be upgraded on next sync)",
            store.legacy_path().display()
        );
    }
    println!(
        "packages: {} selected in profile, {} installed",
        profile.packages.len(),
        state.packages.len()
    );
    for (name, package) in &state.packages {
        if package.partial {
            println!("partial install: {name} (re-run sync to repair)");
        }
    }
    Ok(())
}

/// Transitive dependency closure per installed package, derived from the
/// shadowing dependencies the reconciler recorded.
pub(crate) fn transitive_dependencies(
    state: &SavedState,
) -> std::collections::BTreeMap<String, std::collections::BTreeSet<String>> {
    let items: Vec<DependencyItem<String, String>> = state
        .packages
        .iter()
        .map(|(name, package)| {
            DependencyItem::new(
                name.clone(),
                package.dependencies.clone(),
                package.dependencies.clone(),
            )
        })
        .collect();
    resolve_transitive(&items)
}
