// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint backend tests. Git-backed tests require a `git` binary, which
//! the development environment always has; btrfs behavior is covered only
//! where it degrades (detection, error paths) since tests cannot assume a
//! btrfs mount.

use super::*;
use crate::subprocess::run_argv;
use std::time::Duration;

fn git(dir: &Path, args: &[&str]) {
    let dir_str = dir.display().to_string();
    let mut argv: Vec<&str> = vec!["git", "-C", dir_str.as_str()];
    argv.extend_from_slice(args);
    let out = run_argv(&argv, Path::new("."), Duration::from_secs(30), None).unwrap();
    assert!(out.success(), "git {:?} failed: {}", args, out.stderr);
}

fn init_repo() -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q", "-b", "main"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    git(&repo, &["config", "user.name", "Test"]);
    std::fs::write(repo.join("file.txt"), "v1\n").unwrap();
    git(&repo, &["add", "-A"]);
    git(&repo, &["commit", "-q", "-m", "initial"]);
    (tmp, repo)
}

#[test]
fn none_backend_creates_but_never_restores() {
    let backend = NoneBackend;
    let dir = tempfile::tempdir().unwrap();

    let id = backend.create("iter1", dir.path()).unwrap();
    assert!(id.starts_with("none_iter1_"));
    assert!(!backend.exists(&id));
    assert!(backend.list(dir.path()).is_empty());
    assert!(matches!(
        backend.restore(&id, dir.path()),
        Err(CheckpointError::Unsupported)
    ));
    backend.delete(&id).unwrap();
}

#[test]
fn git_backend_creates_branch_and_preserves_dirty_work() {
    let (_tmp, repo) = init_repo();
    let backend = GitBackend::new(&repo);

    // Uncommitted change must survive checkpoint creation.
    std::fs::write(repo.join("file.txt"), "dirty\n").unwrap();
    let id = backend.create("start", &repo).unwrap();

    assert!(id.starts_with("loop-checkpoint/start_"));
    assert!(backend.exists(&id));
    assert_eq!(std::fs::read_to_string(repo.join("file.txt")).unwrap(), "dirty\n");
}

#[test]
fn git_restore_refuses_dirty_tree() {
    let (_tmp, repo) = init_repo();
    let backend = GitBackend::new(&repo);
    let id = backend.create("start", &repo).unwrap();

    std::fs::write(repo.join("file.txt"), "uncommitted\n").unwrap();
    assert!(matches!(backend.restore(&id, &repo), Err(CheckpointError::DirtyTree)));
}

#[test]
fn git_restore_returns_tree_to_checkpoint_and_keeps_branch_name() {
    let (_tmp, repo) = init_repo();
    let backend = GitBackend::new(&repo);
    let id = backend.create("start", &repo).unwrap();

    // Commit a change on top, then restore to the checkpoint.
    std::fs::write(repo.join("file.txt"), "v2\n").unwrap();
    git(&repo, &["commit", "-aqm", "second"]);

    backend.restore(&id, &repo).unwrap();

    assert_eq!(std::fs::read_to_string(repo.join("file.txt")).unwrap(), "v1\n");
    let head = run_argv(
        &["git", "-C", &repo.display().to_string(), "rev-parse", "--abbrev-ref", "HEAD"],
        Path::new("."),
        Duration::from_secs(30),
        None,
    )
    .unwrap();
    assert_eq!(head.stdout.trim(), "main");
}

#[test]
fn git_restore_of_missing_checkpoint_fails() {
    let (_tmp, repo) = init_repo();
    let backend = GitBackend::new(&repo);
    assert!(matches!(
        backend.restore("loop-checkpoint/ghost", &repo),
        Err(CheckpointError::NotFound(_))
    ));
}

#[test]
fn git_list_returns_checkpoints_and_delete_removes() {
    let (_tmp, repo) = init_repo();
    let backend = GitBackend::new(&repo);
    let id = backend.create("start", &repo).unwrap();

    let listed = backend.list(&repo);
    assert!(listed.iter().any(|c| c.id == id));
    assert!(listed.iter().all(|c| c.backend == BackendKind::VcsBranch));

    backend.delete(&id).unwrap();
    assert!(!backend.exists(&id));
}

#[test]
fn detection_prefers_git_over_none() {
    let (_tmp, repo) = init_repo();
    assert_eq!(detect_backend(&repo), BackendKind::VcsBranch);

    let plain = tempfile::tempdir().unwrap();
    assert_eq!(detect_backend(plain.path()), BackendKind::None);
}

#[test]
fn backend_kind_serializes_to_stable_tags() {
    assert_eq!(serde_json::to_string(&BackendKind::Snapshot).unwrap(), "\"snapshot\"");
    assert_eq!(serde_json::to_string(&BackendKind::VcsBranch).unwrap(), "\"vcs-branch\"");
    assert_eq!(serde_json::to_string(&BackendKind::None).unwrap(), "\"none\"");
}
