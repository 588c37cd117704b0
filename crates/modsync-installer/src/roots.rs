use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use modsync_core::EngineConfig;

/// Resolves the installable roots of a package from the directory paths
/// found anywhere below its top level.
///
/// A directory whose case-insensitive leaf name is on the marker allow-list
/// makes everything above it a candidate root (the marker itself and
/// anything below it are payload). Candidates nested under another
/// candidate are dropped, so roots never nest. No marker anywhere means the
/// package has no installable content — an empty result, not an error.
pub fn find_roots(directories: &[PathBuf], config: &EngineConfig) -> BTreeSet<PathBuf> {
    let mut candidates = BTreeSet::new();
    for dir in directories {
        if let Some(root) = root_above_marker(dir, config) {
            candidates.insert(root);
        }
    }

    let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
    ordered.sort_by_key(|candidate| candidate.components().count());

    let mut roots: BTreeSet<PathBuf> = BTreeSet::new();
    for candidate in ordered {
        if roots.iter().any(|kept| candidate.starts_with(kept)) {
            continue;
        }
        roots.insert(candidate);
    }
    roots
}

fn root_above_marker(dir: &Path, config: &EngineConfig) -> Option<PathBuf> {
    let mut above = PathBuf::new();
    for component in dir.components() {
        let Component::Normal(segment) = component else {
            return None;
        };
        if config.is_marker(&segment.to_string_lossy()) {
            return Some(above);
        }
        above.push(segment);
    }
    None
}
