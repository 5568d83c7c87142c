// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn defaults_are_sane() {
    let config = UndoConfig::default();
    assert_eq!(config.debounce_ms, 500);
    assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    assert_eq!(config.backup_retention_hours, 168);
    assert!(!config.exclude_patterns.is_empty());
}

#[parameterized(
    git_dir = { "/repo/.git/objects/ab/cd", true },
    node_modules = { "/repo/node_modules/dep/index.js", true },
    target_dir = { "/repo/target/debug/build.rs", true },
    pyc_file = { "/repo/src/mod.pyc", true },
    ds_store = { "/repo/.DS_Store", true },
    source_file = { "/repo/src/main.rs", false },
    readme = { "/repo/README.md", false },
)]
fn exclusions_match_defaults(path: &str, excluded: bool) {
    let config = UndoConfig::default();
    assert_eq!(config.is_excluded(std::path::Path::new(path)), excluded, "{path}");
}

#[test]
fn yaml_config_round_trips_through_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("undod.yaml");
    std::fs::write(
        &path,
        "watch_paths: [\"/home/me/project\"]\ndebounce_ms: 250\nexclude_patterns: [\".git\"]\n",
    )
    .unwrap();

    let config = UndoConfig::load_from(&path).unwrap();
    assert_eq!(config.watch_paths, vec![PathBuf::from("/home/me/project")]);
    assert_eq!(config.debounce_ms, 250);
    assert_eq!(config.exclude_patterns, vec![".git".to_string()]);
    // Unset fields keep their defaults.
    assert_eq!(config.max_file_size, 10 * 1024 * 1024);
}

#[test]
fn missing_config_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = UndoConfig::load_from(&dir.path().join("absent.yaml")).unwrap();
    assert_eq!(config, UndoConfig::default());
}

#[test]
fn json_config_is_accepted_as_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("undod.yaml");
    std::fs::write(&path, r#"{"debounce_ms": 100}"#).unwrap();
    let config = UndoConfig::load_from(&path).unwrap();
    assert_eq!(config.debounce_ms, 100);
}
