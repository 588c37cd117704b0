use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{upgrade_legacy, PackageState, SavedState, StateDelta, StateStore};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "modsync-state-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

fn sample_state() -> SavedState {
    let mut packages = BTreeMap::new();
    packages.insert(
        "better-rocks".to_string(),
        PackageState {
            time_unix: 1_771_000_100,
            fs_hash: Some(42),
            partial: false,
            dependencies: vec!["grass-overhaul".to_string()],
            files: vec!["textures/rock.dds".to_string()],
            shadowed_by: Vec::new(),
        },
    );
    packages.insert(
        "grass-overhaul".to_string(),
        PackageState {
            time_unix: 1_771_000_200,
            fs_hash: None,
            partial: true,
            dependencies: Vec::new(),
            files: vec!["textures/grass.dds".to_string(), "models/grass.obj".to_string()],
            shadowed_by: vec!["reserved".to_string()],
        },
    );
    SavedState {
        time_unix: 1_771_000_300,
        packages,
    }
}

#[test]
fn state_round_trips_through_the_store() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    let state = sample_state();

    store.write(&state).expect("must write state");
    let loaded = store.read().expect("must read state");

    assert_eq!(loaded, state);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_store_reads_as_empty() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);

    let loaded = store.read().expect("must read state");
    assert!(loaded.is_empty());
    assert_eq!(loaded.time_unix, 0);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn state_file_uses_the_wire_field_names() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    store.write(&sample_state()).expect("must write state");

    let raw = fs::read_to_string(store.state_path()).expect("must read raw file");
    assert!(raw.contains("\"Install\""));
    assert!(raw.contains("\"Mods\""));
    assert!(raw.contains("\"FsHash\""));
    assert!(raw.contains("\"Partial\""));
    assert!(raw.contains("\"Dependencies\""));
    assert!(raw.contains("\"Files\""));
    assert!(raw.contains("\"ShadowedBy\""));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn malformed_state_file_is_an_error() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    fs::write(store.state_path(), b"{ not json").expect("must write malformed file");

    let err = store.read().expect_err("malformed state must fail");
    assert!(err.to_string().contains("failed to parse state file"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn legacy_file_is_upgraded_on_read() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    fs::write(
        store.legacy_path(),
        b"{\"old-mod\": [\"textures/a.dds\", \"models/a.obj\"]}",
    )
    .expect("must write legacy file");

    let loaded = store.read().expect("must read legacy state");
    let entry = loaded.packages.get("old-mod").expect("entry must exist");
    assert_eq!(entry.files, vec!["textures/a.dds", "models/a.obj"]);
    assert_eq!(entry.fs_hash, None);
    assert!(!entry.partial);
    assert!(entry.dependencies.is_empty());
    assert!(entry.time_unix > 0, "time must come from the file mtime");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn current_format_write_retires_the_legacy_file() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    fs::write(store.legacy_path(), b"{\"old-mod\": [\"textures/a.dds\"]}")
        .expect("must write legacy file");

    let loaded = store.read().expect("must read legacy state");
    store.write(&loaded).expect("must write current format");

    assert!(store.state_path().exists());
    assert!(!store.legacy_path().exists());

    let reread = store.read().expect("must read current state");
    assert_eq!(reread.packages, loaded.packages);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn current_file_wins_over_legacy() {
    let dir = test_dir();
    let store = StateStore::in_dir(&dir);
    store.write(&sample_state()).expect("must write state");
    fs::write(store.legacy_path(), b"{\"stale\": [\"x\"]}").expect("must write legacy file");

    let loaded = store.read().expect("must read state");
    assert!(loaded.packages.contains_key("better-rocks"));
    assert!(!loaded.packages.contains_key("stale"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn upgrade_legacy_is_pure_and_total() {
    let mut legacy = BTreeMap::new();
    legacy.insert("a".to_string(), vec!["one".to_string()]);
    legacy.insert("b".to_string(), Vec::new());

    let upgraded = upgrade_legacy(legacy, 123);
    assert_eq!(upgraded.time_unix, 123);
    assert_eq!(upgraded.packages.len(), 2);
    assert_eq!(upgraded.packages["a"].time_unix, 123);
    assert_eq!(upgraded.packages["b"].files, Vec::<String>::new());
}

#[test]
fn deltas_insert_replace_and_remove() {
    let mut state = SavedState::default();

    state.apply(StateDelta {
        name: "pack".to_string(),
        state: Some(PackageState {
            time_unix: 1,
            fs_hash: Some(7),
            partial: true,
            dependencies: Vec::new(),
            files: vec!["f".to_string()],
            shadowed_by: Vec::new(),
        }),
    });
    assert!(state.packages["pack"].partial);

    state.apply(StateDelta {
        name: "pack".to_string(),
        state: Some(PackageState {
            time_unix: 2,
            fs_hash: Some(7),
            partial: false,
            dependencies: Vec::new(),
            files: vec!["f".to_string()],
            shadowed_by: Vec::new(),
        }),
    });
    assert!(!state.packages["pack"].partial);

    state.apply(StateDelta {
        name: "pack".to_string(),
        state: None,
    });
    assert!(state.is_empty());
}
