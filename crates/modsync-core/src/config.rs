use std::path::Path;

use anyhow::{Context, Result};
use glob::Pattern;

/// Suffix a live file is renamed to when a package writes over it.
pub const BACKUP_SUFFIX: &str = ".orig";

/// Suffix marking a package entry as a removal: the destination file is
/// backed up and deleted, and no content is written.
pub const REMOVE_SUFFIX: &str = ".remove";

const DEFAULT_MARKERS: &[&str] = &[
    "textures", "models", "materials", "sounds", "music", "shaders", "scripts", "maps", "ui",
    "fonts", "movies",
];

const DEFAULT_EXCLUDE: &[&str] = &["*.tmp", "*.bak", "thumbs.db", "desktop.ini"];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    marker_dirs: Vec<String>,
    exclude: Vec<Pattern>,
}

impl EngineConfig {
    pub fn new(marker_dirs: &[String], exclude_patterns: &[String]) -> Result<Self> {
        let marker_dirs = marker_dirs
            .iter()
            .map(|marker| marker.to_lowercase())
            .collect();

        let mut exclude = Vec::with_capacity(exclude_patterns.len());
        for raw in exclude_patterns {
            let pattern = Pattern::new(raw)
                .with_context(|| format!("invalid exclusion pattern: {raw}"))?;
            exclude.push(pattern);
        }

        Ok(Self {
            marker_dirs,
            exclude,
        })
    }

    pub fn is_marker(&self, dir_name: &str) -> bool {
        let folded = dir_name.to_lowercase();
        self.marker_dirs.iter().any(|marker| *marker == folded)
    }

    pub fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude.iter().any(|pattern| pattern.matches_path(relative))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(&default_markers(), &default_exclusions())
            .expect("default configuration must be valid")
    }
}

pub fn default_markers() -> Vec<String> {
    DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect()
}

pub fn default_exclusions() -> Vec<String> {
    DEFAULT_EXCLUDE.iter().map(|p| p.to_string()).collect()
}
