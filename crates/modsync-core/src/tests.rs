use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    normalize_relative, package_fingerprint, storage_path, EngineConfig, Profile, RootedPath,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "modsync-core-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

#[test]
fn rooted_path_keeps_all_three_parts() {
    let path = RootedPath::new("/srv/game", "data/textures/rock.dds");
    assert_eq!(path.root(), Path::new("/srv/game"));
    assert_eq!(path.relative(), Path::new("data/textures/rock.dds"));
    assert_eq!(path.full(), Path::new("/srv/game/data/textures/rock.dds"));
    assert!(path.is_rooted_at(Path::new("/srv/game")));
    assert!(!path.is_rooted_at(Path::new("/srv/other")));
}

#[test]
fn relative_key_folds_case_and_separators() {
    let path = RootedPath::new("/srv/game", Path::new("Data").join("Textures").join("Rock.DDS"));
    assert_eq!(path.relative_key(), "data/textures/rock.dds");
    assert_eq!(path.storage_relative(), "Data/Textures/Rock.DDS");
}

#[test]
fn normalize_relative_matches_storage_path_folded() {
    let relative = Path::new("A").join("b").join("C.txt");
    assert_eq!(storage_path(&relative), "A/b/C.txt");
    assert_eq!(normalize_relative(&relative), "a/b/c.txt");
}

#[test]
fn fingerprint_is_none_for_directories() {
    let dir = test_dir();
    let fingerprint = package_fingerprint(&dir).expect("must fingerprint");
    assert_eq!(fingerprint, None);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn fingerprint_changes_with_length() {
    let dir = test_dir();
    let file = dir.join("pack.zip");

    fs::write(&file, b"one").expect("must write");
    let first = package_fingerprint(&file)
        .expect("must fingerprint")
        .expect("files must have a fingerprint");

    fs::write(&file, b"one plus more content").expect("must write");
    let second = package_fingerprint(&file)
        .expect("must fingerprint")
        .expect("files must have a fingerprint");

    assert_ne!(first, second);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn fingerprint_missing_source_is_an_error() {
    let dir = test_dir();
    let missing = dir.join("absent.zip");
    assert!(package_fingerprint(&missing).is_err());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn markers_match_case_insensitively() {
    let config = EngineConfig::new(&["Textures".to_string()], &[]).expect("must build config");
    assert!(config.is_marker("textures"));
    assert!(config.is_marker("TEXTURES"));
    assert!(!config.is_marker("models"));
}

#[test]
fn exclusions_match_anywhere_in_the_tree() {
    let config =
        EngineConfig::new(&["textures".to_string()], &["*.tmp".to_string()]).expect("must build");
    assert!(config.is_excluded(Path::new("scratch.tmp")));
    assert!(config.is_excluded(Path::new("deep/nested/scratch.tmp")));
    assert!(!config.is_excluded(Path::new("deep/nested/rock.dds")));
}

#[test]
fn invalid_exclusion_pattern_is_rejected() {
    let result = EngineConfig::new(&["textures".to_string()], &["[".to_string()]);
    assert!(result.is_err());
}

#[test]
fn profile_parses_with_defaults() {
    let profile = Profile::from_toml_str(
        r#"
target = "/srv/game"

[[packages]]
name = "better-rocks"
path = "/srv/mods/better-rocks.zip"

[[packages]]
name = "grass-overhaul"
path = "/srv/mods/grass"
enabled = false
"#,
    )
    .expect("profile must parse");

    assert_eq!(profile.target, PathBuf::from("/srv/game"));
    assert_eq!(profile.packages.len(), 2);
    assert!(profile.packages[0].enabled);
    assert!(!profile.packages[1].enabled);
    profile.engine_config().expect("defaults must apply");
}

#[test]
fn profile_rejects_duplicate_package_names() {
    let err = Profile::from_toml_str(
        r#"
target = "/srv/game"

[[packages]]
name = "dupe"
path = "/a"

[[packages]]
name = "dupe"
path = "/b"
"#,
    )
    .expect_err("duplicate names must be rejected");
    assert!(err.to_string().contains("duplicate package entry"));
}

#[test]
fn profile_rejects_invalid_package_names() {
    for bad in ["", "Uppercase", "-leading", "has space", "ok/slash"] {
        let raw = format!(
            "target = \"/srv/game\"\n\n[[packages]]\nname = \"{bad}\"\npath = \"/a\"\n"
        );
        assert!(
            Profile::from_toml_str(&raw).is_err(),
            "name '{bad}' should be rejected"
        );
    }
}
