use std::collections::BTreeSet;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Enumerable content of one package, either a plain directory or a zip
/// archive. Directory listing is cheap metadata used for root finding;
/// file content supports exactly one forward pass per installation attempt.
pub trait ContentSource {
    /// Relative paths of every directory anywhere under the package top.
    fn list_dirs(&mut self) -> Result<Vec<PathBuf>>;

    /// Visits every regular file once, in enumeration order, with a reader
    /// over its content. A second call is a contract error.
    fn visit_files(
        &mut self,
        visit: &mut dyn FnMut(&Path, &mut dyn Read) -> Result<()>,
    ) -> Result<()>;
}

/// Opens the right source for a package path: a directory is traversed in
/// place, anything else is treated as a zip archive.
pub fn open_package_source(path: &Path) -> Result<Box<dyn ContentSource>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read package source: {}", path.display()))?;
    if metadata.is_dir() {
        Ok(Box::new(DirSource::new(path)))
    } else {
        Ok(Box::new(ArchiveSource::open(path)?))
    }
}

pub struct DirSource {
    root: PathBuf,
    consumed: bool,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            consumed: false,
        }
    }
}

impl ContentSource for DirSource {
    fn list_dirs(&mut self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| {
                format!("failed to read package directory: {}", self.root.display())
            })?;
            if !entry.file_type().is_dir() || entry.path() == self.root {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .with_context(|| format!("failed to relativize {}", entry.path().display()))?;
            dirs.push(relative.to_path_buf());
        }
        Ok(dirs)
    }

    fn visit_files(
        &mut self,
        visit: &mut dyn FnMut(&Path, &mut dyn Read) -> Result<()>,
    ) -> Result<()> {
        if self.consumed {
            return Err(anyhow!(
                "package source already consumed: {}",
                self.root.display()
            ));
        }
        self.consumed = true;

        for entry in WalkDir::new(&self.root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| {
                format!("failed to read package directory: {}", self.root.display())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .with_context(|| format!("failed to relativize {}", entry.path().display()))?
                .to_path_buf();
            let mut reader = File::open(entry.path())
                .with_context(|| format!("failed to open {}", entry.path().display()))?;
            visit(&relative, &mut reader)?;
        }
        Ok(())
    }
}

pub struct ArchiveSource {
    path: PathBuf,
    archive: ZipArchive<File>,
    consumed: bool,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open package archive: {}", path.display()))?;
        let archive = ZipArchive::new(file)
            .with_context(|| format!("failed to read package archive: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            archive,
            consumed: false,
        })
    }
}

impl ContentSource for ArchiveSource {
    fn list_dirs(&mut self) -> Result<Vec<PathBuf>> {
        // Central-directory names only; no entry content is consumed.
        // Directories may be explicit entries or implied by file paths.
        let names: Vec<String> = self.archive.file_names().map(str::to_string).collect();

        let mut dirs = BTreeSet::new();
        for name in names {
            let is_dir = name.ends_with('/');
            let Some(relative) = entry_relative_path(&name) else {
                continue;
            };
            if is_dir {
                dirs.insert(relative.clone());
            }
            for ancestor in relative.ancestors().skip(1) {
                if !ancestor.as_os_str().is_empty() {
                    dirs.insert(ancestor.to_path_buf());
                }
            }
        }
        Ok(dirs.into_iter().collect())
    }

    fn visit_files(
        &mut self,
        visit: &mut dyn FnMut(&Path, &mut dyn Read) -> Result<()>,
    ) -> Result<()> {
        if self.consumed {
            return Err(anyhow!(
                "package archive already consumed: {}",
                self.path.display()
            ));
        }
        self.consumed = true;

        // Strictly in-order, single-pass walk of the entry stream.
        for index in 0..self.archive.len() {
            let mut entry = self.archive.by_index(index).with_context(|| {
                format!(
                    "failed to read entry {} of {}",
                    index,
                    self.path.display()
                )
            })?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name() else {
                // Entry escapes the archive root; never install it.
                continue;
            };
            let relative = relative.to_path_buf();
            visit(&relative, &mut entry)?;
        }
        Ok(())
    }
}

fn entry_relative_path(name: &str) -> Option<PathBuf> {
    let trimmed = name.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::{entry_relative_path, ArchiveSource, ContentSource, DirSource};

    static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn test_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "modsync-source-tests-{}-{}-{}",
            std::process::id(),
            nanos,
            sequence
        ));
        fs::create_dir_all(&path).expect("must create test dir");
        path
    }

    fn collect_files(source: &mut dyn ContentSource) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        source
            .visit_files(&mut |relative, reader| {
                let mut content = Vec::new();
                reader.read_to_end(&mut content)?;
                files.push((relative.to_string_lossy().replace('\\', "/"), content));
                Ok(())
            })
            .expect("must visit files");
        files
    }

    fn write_sample_tree(root: &Path) {
        fs::create_dir_all(root.join("textures/rocks")).expect("must create dirs");
        fs::create_dir_all(root.join("models")).expect("must create dirs");
        fs::write(root.join("textures/rocks/granite.dds"), b"granite").expect("must write");
        fs::write(root.join("models/rock.obj"), b"rock").expect("must write");
    }

    fn write_sample_archive(path: &Path) {
        let file = fs::File::create(path).expect("must create archive");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        writer
            .add_directory("textures/rocks/", options)
            .expect("must add directory");
        writer
            .start_file("textures/rocks/granite.dds", options)
            .expect("must start file");
        writer.write_all(b"granite").expect("must write entry");
        writer
            .start_file("models/rock.obj", options)
            .expect("must start file");
        writer.write_all(b"rock").expect("must write entry");
        writer.finish().expect("must finish archive");
    }

    #[test]
    fn dir_source_lists_every_directory() {
        let dir = test_dir();
        write_sample_tree(&dir);

        let mut source = DirSource::new(&dir);
        let mut dirs: Vec<String> = source
            .list_dirs()
            .expect("must list dirs")
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        dirs.sort();
        assert_eq!(dirs, vec!["models", "textures", "textures/rocks"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn dir_and_archive_sources_enumerate_equivalent_trees() {
        let dir = test_dir();
        let tree = dir.join("tree");
        fs::create_dir_all(&tree).expect("must create tree dir");
        write_sample_tree(&tree);
        let archive_path = dir.join("pack.zip");
        write_sample_archive(&archive_path);

        let mut dir_source = DirSource::new(&tree);
        let mut archive_source = ArchiveSource::open(&archive_path).expect("must open archive");

        let mut from_dir = collect_files(&mut dir_source);
        let mut from_archive = collect_files(&mut archive_source);
        from_dir.sort();
        from_archive.sort();
        assert_eq!(from_dir, from_archive);

        let mut dir_dirs = dir_source.list_dirs().expect("must list");
        let mut archive_dirs = ArchiveSource::open(&archive_path)
            .expect("must open archive")
            .list_dirs()
            .expect("must list");
        dir_dirs.sort();
        archive_dirs.sort();
        assert_eq!(dir_dirs, archive_dirs);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn archive_dirs_are_implied_by_file_paths() {
        let dir = test_dir();
        let archive_path = dir.join("pack.zip");
        let file = fs::File::create(&archive_path).expect("must create archive");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file("deep/nested/textures/a.dds", options)
            .expect("must start file");
        writer.write_all(b"a").expect("must write entry");
        writer.finish().expect("must finish archive");

        let mut source = ArchiveSource::open(&archive_path).expect("must open archive");
        let dirs = source.list_dirs().expect("must list dirs");
        assert!(dirs.contains(&PathBuf::from("deep")));
        assert!(dirs.contains(&PathBuf::from("deep/nested")));
        assert!(dirs.contains(&PathBuf::from("deep/nested/textures")));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sources_support_exactly_one_content_pass() {
        let dir = test_dir();
        write_sample_tree(&dir);

        let mut source = DirSource::new(&dir);
        collect_files(&mut source);
        let err = source
            .visit_files(&mut |_, _| Ok(()))
            .expect_err("second pass must fail");
        assert!(err.to_string().contains("already consumed"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn entry_names_escaping_the_root_are_rejected() {
        assert_eq!(entry_relative_path("a/b.txt"), Some(PathBuf::from("a/b.txt")));
        assert_eq!(entry_relative_path("./a/b.txt"), Some(PathBuf::from("a/b.txt")));
        assert_eq!(entry_relative_path("../evil.txt"), None);
        assert_eq!(entry_relative_path("a/../../evil.txt"), None);
        assert_eq!(entry_relative_path("/abs.txt"), None);
        assert_eq!(entry_relative_path(""), None);
    }
}
