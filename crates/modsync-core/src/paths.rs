use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootedPath {
    root: PathBuf,
    relative: PathBuf,
    full: PathBuf,
}

impl RootedPath {
    pub fn new(root: impl Into<PathBuf>, relative: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let relative = relative.into();
        let full = root.join(&relative);
        Self {
            root,
            relative,
            full,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn full(&self) -> &Path {
        &self.full
    }

    pub fn is_rooted_at(&self, root: &Path) -> bool {
        self.root == root
    }

    /// Case-folded, slash-normalized form of the relative path, used as the
    /// ownership-claim key so that paths differing only in case collide.
    pub fn relative_key(&self) -> String {
        normalize_relative(&self.relative)
    }

    /// Case-preserved, slash-normalized form of the relative path, the shape
    /// stored in persisted state.
    pub fn storage_relative(&self) -> String {
        storage_path(&self.relative)
    }
}

pub fn normalize_relative(path: &Path) -> String {
    storage_path(path).to_lowercase()
}

pub fn storage_path(path: &Path) -> String {
    let mut joined = String::new();
    for component in path.components() {
        if !joined.is_empty() {
            joined.push('/');
        }
        joined.push_str(&component.as_os_str().to_string_lossy());
    }
    joined
}
