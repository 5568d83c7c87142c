// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios across the workspace crates: the loop engine driven
//! by real (noop/custom) agents, the undo store, and the gate engine.

use dl_adapters::checkpoint::NoneBackend;
use dl_adapters::get_agent;
use dl_core::ChangeKind;
use dl_engine::{LoopOptions, LoopRunner, LoopStatus};
use dl_gates::{Gate, GateChecker, GateContext, SupervisionConfig, SupervisionLevel};
use dl_storage::UndoStore;
use std::time::Duration;

fn loop_options(dir: &std::path::Path, max_iterations: u32) -> LoopOptions {
    LoopOptions {
        max_iterations,
        timeout: Duration::from_secs(10),
        state_dir: dir.join("states"),
        ..Default::default()
    }
}

/// Scenario 1: a promise that never passes exhausts its iterations.
#[test]
fn failing_loop_records_every_iteration_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let agent = get_agent("noop", None).unwrap();

    let mut runner = LoopRunner::new(
        "make tests pass",
        "false",
        dir.path(),
        agent,
        Box::new(NoneBackend),
        loop_options(dir.path(), 2),
    );

    assert!(!runner.run().unwrap());

    let state = runner.state();
    assert_eq!(state.status, LoopStatus::Failed);
    assert_eq!(state.iterations.len(), 2);
    assert_eq!(state.current_iteration, 2);
    assert!(state.error_message.as_deref().unwrap().contains("Max iterations (2) reached"));
}

/// Scenario 2: an already-satisfied promise completes with zero iterations.
#[test]
fn satisfied_promise_completes_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let agent = get_agent("noop", None).unwrap();

    let mut runner = LoopRunner::new(
        "nothing to do",
        "true",
        dir.path(),
        agent,
        Box::new(NoneBackend),
        loop_options(dir.path(), 5),
    );

    assert!(runner.run().unwrap());
    assert_eq!(runner.state().status, LoopStatus::Completed);
    assert!(runner.state().iterations.is_empty());
}

/// A custom shell agent that actually fixes the tree converges.
#[test]
fn custom_agent_drives_the_promise_green() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fixed");
    let agent = get_agent("custom", Some("touch fixed")).unwrap();

    let mut runner = LoopRunner::new(
        "create the marker",
        &format!("test -f {}", marker.display()),
        dir.path(),
        agent,
        Box::new(NoneBackend),
        loop_options(dir.path(), 3),
    );

    assert!(runner.run().unwrap());
    assert_eq!(runner.state().status, LoopStatus::Completed);
    assert_eq!(runner.state().current_iteration, 1);
    assert!(marker.exists());
}

/// Scenario 3: record, overwrite, record, restore the first entry.
#[test]
fn undo_round_trip_restores_the_first_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = UndoStore::open(&dir.path().join("undo")).unwrap();
    let file = dir.path().join("x");

    std::fs::write(&file, "hello").unwrap();
    let first = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    std::fs::write(&file, "world").unwrap();
    let second = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    // Two distinct contents ⇒ two distinct blobs.
    assert_ne!(first.backup_hash, second.backup_hash);
    let blobs = std::fs::read_dir(store.backups().dir()).unwrap().count();
    assert_eq!(blobs, 2);

    store.restore_entry(&first.id).unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
}

/// Scenario 4: `file_delete` under `supervised`, non-interactively.
#[test]
fn supervised_file_delete_requires_approval() {
    let dir = tempfile::tempdir().unwrap();
    let checker = GateChecker::new(SupervisionConfig::for_level(SupervisionLevel::Supervised))
        .with_log_dir(dir.path())
        .with_interactive(false);

    let mut context = GateContext::new();
    context.insert("path".into(), serde_json::Value::String("/tmp/x".into()));
    let result = checker.check(Gate::FileDelete, context, "specs");

    assert!(!result.allowed);
    assert_eq!(result.action.as_str(), "approve");

    // Exactly one audit row, matching the returned result.
    let mut rows = Vec::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        rows.extend(content.lines().map(str::to_string));
    }
    assert_eq!(rows.len(), 1);
    let event: serde_json::Value = serde_json::from_str(&rows[0]).unwrap();
    assert_eq!(event["gate"], "file_delete");
    assert_eq!(event["result"]["allowed"], false);
    assert_eq!(event["result"]["action"], "approve");
}

/// A loop persisted mid-flight resumes to the same terminal state.
#[test]
fn interrupted_loop_resumes_to_the_same_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("states");

    let mut runner = LoopRunner::new(
        "never done",
        "false",
        dir.path(),
        get_agent("noop", None).unwrap(),
        Box::new(NoneBackend),
        loop_options(dir.path(), 2),
    );
    let id = runner.state().id.clone();
    runner.run().unwrap();

    // Load what a fresh process would see and check the invariant that the
    // record count always matches the counter.
    let persisted = dl_engine::LoopState::load(&state_dir, id.as_str()).unwrap();
    assert_eq!(persisted.iterations.len() as u32, persisted.current_iteration);
    assert_eq!(persisted.status, LoopStatus::Failed);
}
