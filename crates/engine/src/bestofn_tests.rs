// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dl_adapters::{AgentResult, FakeAgent};

fn seeded_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.txt"), "original\n").unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "// lib\n").unwrap();
    std::fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
    std::fs::write(dir.path().join("node_modules/dep/index.js"), "x").unwrap();
    dir
}

fn opts(dir: &Path, promise: &str, n: usize) -> BestOfN {
    BestOfN {
        n,
        max_iterations: 2,
        timeout: Duration::from_secs(5),
        ..BestOfN::new("make it pass", promise, dir)
    }
}

#[test]
fn winning_branch_files_land_on_the_main_tree() {
    let dir = seeded_tree();
    // Passes once the agent writes the answer file in its branch.
    let opts = opts(dir.path(), "test -f answer.txt", 3);

    let factory = || -> Result<Box<dyn AgentAdapter>, AgentError> {
        Ok(Box::new(FakeAgent::with(|_, work| {
            std::fs::write(work.join("answer.txt"), "42\n").unwrap_or_default();
            AgentResult { success: true, ..Default::default() }
        })))
    };

    let result = run_best_of_n(&opts, &factory).unwrap();

    let winner = result.winning_branch().expect("a winner");
    assert!(winner.success);
    assert_eq!(std::fs::read_to_string(dir.path().join("answer.txt")).unwrap(), "42\n");
    // Pre-existing files survive the copy-back untouched.
    assert_eq!(std::fs::read_to_string(dir.path().join("main.txt")).unwrap(), "original\n");
    assert!(result.selection_reason.contains("selected"));
}

#[test]
fn total_iterations_sums_across_branches() {
    let dir = seeded_tree();
    let opts = opts(dir.path(), "false", 3);

    let factory =
        || -> Result<Box<dyn AgentAdapter>, AgentError> { Ok(Box::new(FakeAgent::succeeding())) };

    let result = run_best_of_n(&opts, &factory).unwrap();

    // Every branch burned its full budget.
    assert_eq!(result.total_iterations, 6);
    assert!(result.all_results.iter().all(|r| !r.success));
    // A failing winner is not copied back.
    assert!(!dir.path().join("answer.txt").exists());
}

#[test]
fn passing_branch_outscores_failing_ones() {
    let dir = seeded_tree();
    let marker = "only-branch-1-passes";
    let promise = format!("test -f {marker}");
    let opts = opts(dir.path(), &promise, 3);

    // Only one branch's agent makes progress; the scorer must rank it first.
    let counter = std::sync::Arc::new(parking_lot::Mutex::new(0usize));
    let factory = move || -> Result<Box<dyn AgentAdapter>, AgentError> {
        let branch_index = {
            let mut n = counter.lock();
            *n += 1;
            *n
        };
        Ok(Box::new(FakeAgent::with(move |_, work| {
            if branch_index == 1 {
                std::fs::write(work.join(marker), "yes").unwrap_or_default();
            }
            AgentResult { success: true, ..Default::default() }
        })))
    };

    let result = run_best_of_n(&opts, &factory).unwrap();

    let winner = result.winning_branch().expect("a winner");
    assert!(winner.success);
    assert!(winner.score >= 100.0, "passing branch scores the pass bonus: {}", winner.score);
    assert!(dir.path().join(marker).exists());

    // Scores are ordered highest first.
    let scores: Vec<f64> = result.all_results.iter().map(|r| r.score).collect();
    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(scores, sorted);
}

#[test]
fn manual_mode_scores_without_applying() {
    let dir = seeded_tree();
    let mut opts = opts(dir.path(), "test -f answer.txt", 2);
    opts.selection = SelectionMode::Manual;

    let factory = || -> Result<Box<dyn AgentAdapter>, AgentError> {
        Ok(Box::new(FakeAgent::with(|_, work| {
            std::fs::write(work.join("answer.txt"), "42\n").unwrap_or_default();
            AgentResult { success: true, ..Default::default() }
        })))
    };

    let result = run_best_of_n(&opts, &factory).unwrap();

    assert!(result.winner.is_none());
    assert_eq!(result.selection_reason, "Manual selection required");
    assert!(!dir.path().join("answer.txt").exists(), "manual mode must not copy back");
    assert_eq!(result.all_results.len(), 2);
}

#[test]
fn branch_copies_skip_vcs_and_dependency_dirs() {
    let dir = seeded_tree();
    let saw_node_modules = std::sync::Arc::new(parking_lot::Mutex::new(false));
    let saw_clone = std::sync::Arc::clone(&saw_node_modules);

    let opts = opts(dir.path(), "true", 1);
    let factory = move || -> Result<Box<dyn AgentAdapter>, AgentError> {
        let saw = std::sync::Arc::clone(&saw_clone);
        Ok(Box::new(FakeAgent::with(move |_, work| {
            if work.join("node_modules").exists() {
                *saw.lock() = true;
            }
            AgentResult { success: true, ..Default::default() }
        })))
    };

    // Promise passes immediately, so the agent never actually runs; inspect
    // the branch layout directly instead via a failing promise.
    let mut opts = opts;
    opts.promise_cmd = "test -f never-there".into();
    opts.max_iterations = 1;
    let _ = run_best_of_n(&opts, &factory).unwrap();

    assert!(!*saw_node_modules.lock(), "node_modules must not be copied into branches");
}

#[test]
fn comparison_report_lists_branches_by_rank() {
    let results = vec![
        BranchResult {
            branch_id: 0,
            success: false,
            iterations_used: 2,
            final_state: None,
            score: -10.0,
            metrics: Default::default(),
        },
        BranchResult {
            branch_id: 1,
            success: true,
            iterations_used: 1,
            final_state: None,
            score: 190.0,
            metrics: Default::default(),
        },
    ];

    let report = compare_branches(&results);
    let first = report.find("#1 Branch 2").unwrap();
    let second = report.find("#2 Branch 1").unwrap();
    assert!(first < second);
    assert!(report.contains("Status: PASS"));
}
