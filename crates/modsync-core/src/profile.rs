use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::package::Package;

/// The user-edited profile: target directory plus an ordered package list.
/// List order is priority order — packages listed first win path conflicts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub target: PathBuf,
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub packages: Vec<ProfilePackage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePackage {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Profile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let profile: Self = toml::from_str(input).context("failed to parse modsync profile")?;

        let mut seen = HashSet::new();
        for package in &profile.packages {
            validate_package_name(&package.name)?;
            if !seen.insert(package.name.clone()) {
                bail!("duplicate package entry '{}'", package.name);
            }
        }

        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read profile: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed loading profile: {}", path.display()))
    }

    /// Marker and exclusion settings, falling back to the built-in defaults
    /// for whichever list the profile leaves empty.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let markers = if self.markers.is_empty() {
            crate::config::default_markers()
        } else {
            self.markers.clone()
        };
        let exclude = if self.exclude.is_empty() {
            crate::config::default_exclusions()
        } else {
            self.exclude.clone()
        };
        EngineConfig::new(&markers, &exclude)
    }

    /// Resolves the package list against the filesystem, stamping current
    /// fingerprints. Order is preserved; disabled entries are kept so the
    /// engine can treat them as deselected.
    pub fn resolve_packages(&self) -> Result<Vec<Package>> {
        let mut packages = Vec::with_capacity(self.packages.len());
        for entry in &self.packages {
            packages.push(Package::resolve(&entry.name, &entry.path, entry.enabled)?);
        }
        Ok(packages)
    }
}

pub fn validate_package_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        bail!("invalid package name: must be 1-64 characters");
    }

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("invalid package name: '{name}'");
    };

    let first_is_valid = first.is_ascii_lowercase() || first.is_ascii_digit();
    let rest_is_valid =
        chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_');
    if !first_is_valid || !rest_is_valid {
        bail!("invalid package name: '{name}'");
    }

    Ok(())
}
