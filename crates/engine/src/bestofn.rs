// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-of-N parallel exploration.
//!
//! Plan: copy the working tree into N branch directories. Execute: run one
//! loop per branch on a thread pool bounded by N. Analyze: score each
//! branch. Select: copy the winner's files back onto the main tree.

use crate::runner::{LoopOptions, LoopRunner};
use crate::state::LoopState;
use crate::LoopError;
use dl_adapters::subprocess::run_shell;
use dl_adapters::{auto_backend, AgentAdapter, AgentError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory names never copied into a branch.
const BRANCH_COPY_IGNORES: [&str; 5] = [".git", "target", "node_modules", "__pycache__", ".venv"];

/// Builds a fresh agent per branch thread.
pub type AgentFactory = dyn Fn() -> Result<Box<dyn AgentAdapter>, AgentError> + Sync;

/// How the winner is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Score, pick, and copy the winner back automatically.
    #[default]
    Auto,
    /// Score only; the caller inspects all branches and applies one itself.
    Manual,
}

/// Parameters for a best-of-N run.
pub struct BestOfN {
    pub task: String,
    pub promise_cmd: String,
    pub working_dir: PathBuf,
    pub n: usize,
    pub max_iterations: u32,
    pub timeout: Duration,
    pub selection: SelectionMode,
}

impl BestOfN {
    pub fn new(task: &str, promise_cmd: &str, working_dir: &Path) -> Self {
        Self {
            task: task.to_string(),
            promise_cmd: promise_cmd.to_string(),
            working_dir: working_dir.to_path_buf(),
            n: 3,
            max_iterations: 10,
            timeout: Duration::from_secs(300),
            selection: SelectionMode::Auto,
        }
    }
}

/// Result of a single branch execution.
#[derive(Debug, Clone)]
pub struct BranchResult {
    pub branch_id: usize,
    pub success: bool,
    pub iterations_used: u32,
    pub final_state: Option<LoopState>,
    pub score: f64,
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// Result of the whole exploration.
#[derive(Debug, Clone)]
pub struct BestOfNResult {
    /// Index into `all_results` of the selected branch, if any.
    pub winner: Option<usize>,
    /// All branches, highest score first.
    pub all_results: Vec<BranchResult>,
    pub total_iterations: u32,
    pub selection_reason: String,
}

impl BestOfNResult {
    pub fn winning_branch(&self) -> Option<&BranchResult> {
        self.winner.map(|i| &self.all_results[i])
    }
}

/// Run N parallel loop attempts and apply the best outcome.
pub fn run_best_of_n(opts: &BestOfN, factory: &AgentFactory) -> Result<BestOfNResult, LoopError> {
    let base = tempfile::Builder::new().prefix("dl-bestofn-").tempdir()?;

    // Plan: one isolated copy of the tree per branch, each with its own VCS
    // history so diffs are measurable.
    let mut branch_dirs = Vec::with_capacity(opts.n);
    for branch_id in 0..opts.n {
        let work = base.path().join(format!("branch_{branch_id}")).join("work");
        copy_tree(&opts.working_dir, &work)?;
        init_branch_history(&work);
        branch_dirs.push(work);
    }

    // Execute: thread pool bounded by N, one loop per branch.
    let mut results: Vec<BranchResult> = std::thread::scope(|scope| {
        let handles: Vec<_> = branch_dirs
            .iter()
            .enumerate()
            .map(|(branch_id, work)| {
                let state_dir = base.path().join(format!("branch_{branch_id}")).join("states");
                scope.spawn(move || run_branch(opts, factory, branch_id, work, &state_dir))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(branch_id, handle)| match handle.join() {
                Ok(result) => result,
                Err(_) => failed_branch(branch_id, "branch thread panicked"),
            })
            .collect()
    });

    // Analyze: attach scores, then sort highest first.
    for result in &mut results {
        score_branch(result, &branch_dirs);
    }
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let total_iterations = results.iter().map(|r| r.iterations_used).sum();

    if results.is_empty() {
        return Ok(BestOfNResult {
            winner: None,
            all_results: results,
            total_iterations,
            selection_reason: "No branches completed".to_string(),
        });
    }

    // Select.
    let winner_id = results[0].branch_id;
    let mut selection_reason = format!("Highest score: {:.1}", results[0].score);
    let mut winner = Some(0);

    match opts.selection {
        SelectionMode::Manual => {
            selection_reason = "Manual selection required".to_string();
            winner = None;
        }
        SelectionMode::Auto => {
            if results[0].success {
                copy_back(&branch_dirs[winner_id], &opts.working_dir)?;
                selection_reason = format!(
                    "Branch {} selected: score={:.1}, iterations={}",
                    winner_id + 1,
                    results[0].score,
                    results[0].iterations_used
                );
            }
        }
    }

    // Branch directories (winner included; its files are applied) vanish
    // with the temp dir.
    drop(base);

    Ok(BestOfNResult { winner, all_results: results, total_iterations, selection_reason })
}

fn run_branch(
    opts: &BestOfN,
    factory: &AgentFactory,
    branch_id: usize,
    work: &Path,
    state_dir: &Path,
) -> BranchResult {
    let agent = match factory() {
        Ok(agent) => agent,
        Err(e) => return failed_branch(branch_id, &e.to_string()),
    };

    let branch_task = format!("[Branch {}/{}] {}", branch_id + 1, opts.n, opts.task);
    let mut runner = LoopRunner::new(
        &branch_task,
        &opts.promise_cmd,
        work,
        agent,
        auto_backend(work),
        LoopOptions {
            max_iterations: opts.max_iterations,
            timeout: opts.timeout,
            state_dir: state_dir.to_path_buf(),
            ..Default::default()
        },
    );

    match runner.run() {
        Ok(success) => BranchResult {
            branch_id,
            success,
            iterations_used: runner.state().current_iteration,
            final_state: Some(runner.state().clone()),
            score: 0.0,
            metrics: BTreeMap::new(),
        },
        Err(e) => failed_branch(branch_id, &e.to_string()),
    }
}

fn failed_branch(branch_id: usize, error: &str) -> BranchResult {
    let mut metrics = BTreeMap::new();
    metrics.insert("error".to_string(), serde_json::Value::String(error.to_string()));
    BranchResult {
        branch_id,
        success: false,
        iterations_used: 0,
        final_state: None,
        score: -1000.0,
        metrics,
    }
}

/// Score a branch. Higher is better: +100 for a passing promise, +10 per
/// unused iteration, −0.5 per changed line, + half the coverage percentage
/// when a report is present.
fn score_branch(result: &mut BranchResult, branch_dirs: &[PathBuf]) {
    // Error placeholders keep their sentinel score.
    if result.final_state.is_none() {
        return;
    }

    let mut score = 0.0;
    let mut metrics = std::mem::take(&mut result.metrics);

    if result.success {
        score += 100.0;
    }
    metrics.insert("promise_met".to_string(), serde_json::Value::Bool(result.success));

    if let Some(state) = &result.final_state {
        let saved = state.max_iterations.saturating_sub(result.iterations_used);
        score += saved as f64 * 10.0;
        metrics.insert("iterations_saved".to_string(), serde_json::json!(saved));
    }

    let work = &branch_dirs[result.branch_id];
    let lines_changed = diff_line_count(work);
    score -= lines_changed as f64 * 0.5;
    metrics.insert("lines_changed".to_string(), serde_json::json!(lines_changed));

    if let Some(pct) = coverage_percent(work) {
        score += pct * 0.5;
        metrics.insert("coverage_pct".to_string(), serde_json::json!(pct));
    }

    result.score = score;
    result.metrics = metrics;
}

fn diff_line_count(dir: &Path) -> usize {
    run_shell("git diff --stat HEAD", dir, Duration::from_secs(10), None)
        .ok()
        .filter(|out| out.success())
        .map(|out| out.stdout.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}

fn coverage_percent(dir: &Path) -> Option<f64> {
    let report = dir.join("coverage").join("coverage-summary.json");
    let content = std::fs::read_to_string(report).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json.get("total")?.get("lines")?.get("pct")?.as_f64()
}

/// Copy `src` into `dst` for branch creation, skipping VCS and derived
/// directories.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), LoopError> {
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src).min_depth(1).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        !BRANCH_COPY_IGNORES.contains(&name.as_ref())
    }) {
        let entry = entry.map_err(|e| {
            LoopError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
            }))
        })?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Copy the winning branch's files back onto the main tree.
///
/// Byte-granular contract: every regular file outside `.git` is written
/// over the main tree (parents created as needed); main-tree files the
/// branch never had are left alone, and the caller's `.git` history is
/// preserved untouched.
fn copy_back(branch: &Path, main: &Path) -> Result<(), LoopError> {
    for entry in walkdir::WalkDir::new(branch)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name().to_string_lossy() != ".git")
    {
        let Ok(entry) = entry else { continue };
        let rel = entry.path().strip_prefix(branch).unwrap_or(entry.path());
        let target = main.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Give a branch its own history so diffs are measurable. Best-effort:
/// scoring degrades gracefully without git.
fn init_branch_history(work: &Path) {
    let timeout = Duration::from_secs(30);
    let steps = [
        "git init -q",
        "git -c user.email=loop@daedalos -c user.name=daedalos add -A",
        "git -c user.email=loop@daedalos -c user.name=daedalos commit -q -m 'Initial state for best-of-N branch' --allow-empty",
    ];
    for step in steps {
        match run_shell(step, work, timeout, None) {
            Ok(out) if out.success() => {}
            _ => {
                tracing::debug!(dir = %work.display(), step, "branch history init step failed");
                return;
            }
        }
    }
}

/// Format a comparison table of branch results.
pub fn compare_branches(results: &[BranchResult]) -> String {
    let rule = "=".repeat(60);
    let mut lines = vec![rule.clone(), "BEST-OF-N BRANCH COMPARISON".to_string(), rule.clone()];

    let mut sorted: Vec<&BranchResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    for (rank, result) in sorted.iter().enumerate() {
        lines.push(format!("\n#{} Branch {}", rank + 1, result.branch_id + 1));
        lines.push(format!("  Status: {}", if result.success { "PASS" } else { "FAIL" }));
        lines.push(format!("  Score: {:.1}", result.score));
        lines.push(format!("  Iterations: {}", result.iterations_used));
        if !result.metrics.is_empty() {
            lines.push("  Metrics:".to_string());
            for (key, value) in &result.metrics {
                lines.push(format!("    {key}: {value}"));
            }
        }
    }

    lines.push(format!("\n{rule}"));
    lines.join("\n")
}

#[cfg(test)]
#[path = "bestofn_tests.rs"]
mod tests;
