// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Promise verification.
//!
//! A promise is a shell command whose exit code 0 means the loop's task is
//! done. A failing promise is not an error; it is what drives the next
//! iteration.

use dl_adapters::subprocess::run_shell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default ceiling on one promise evaluation.
pub const PROMISE_TIMEOUT: Duration = Duration::from_secs(120);

/// Detailed result of a promise evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl PromiseResult {
    /// stdout and stderr joined the way iteration records store them.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Run the promise command; true iff it exits 0 within the default timeout.
pub fn verify_promise(command: &str, working_dir: &Path) -> bool {
    verify_promise_detailed(command, working_dir, PROMISE_TIMEOUT).success
}

/// Run the promise command and capture everything.
pub fn verify_promise_detailed(
    command: &str,
    working_dir: &Path,
    timeout: Duration,
) -> PromiseResult {
    match run_shell(command, working_dir, timeout, None) {
        Ok(out) => PromiseResult {
            success: out.success(),
            exit_code: out.exit_code,
            stdout: out.stdout,
            stderr: if out.timed_out {
                format!("Promise command timed out after {} seconds", timeout.as_secs())
            } else {
                out.stderr
            },
            timed_out: out.timed_out,
            duration_ms: out.duration_ms,
        },
        Err(e) => PromiseResult {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: e.to_string(),
            timed_out: false,
            duration_ms: 0,
        },
    }
}

/// Category of a promise command, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseKind {
    Test,
    Build,
    Lint,
    Typecheck,
    Custom,
}

impl PromiseKind {
    pub fn description(&self) -> &'static str {
        match self {
            PromiseKind::Test => "Tests must pass",
            PromiseKind::Build => "Build must succeed",
            PromiseKind::Lint => "Linting must pass",
            PromiseKind::Typecheck => "Type checking must pass",
            PromiseKind::Custom => "Command must exit with code 0",
        }
    }
}

/// Classify a promise by well-known command patterns.
pub fn classify_promise(promise: &str) -> PromiseKind {
    let lower = promise.to_lowercase();

    const TEST: [&str; 6] = ["test", "pytest", "jest", "mocha", "cargo test", "go test"];
    const BUILD: [&str; 3] = ["build", "compile", "make"];
    const LINT: [&str; 6] = ["lint", "clippy", "eslint", "ruff", "pylint", "flake8"];
    const TYPECHECK: [&str; 4] = ["tsc", "mypy", "pyright", "typecheck"];

    if TEST.iter().any(|p| lower.contains(p)) {
        PromiseKind::Test
    } else if BUILD.iter().any(|p| lower.contains(p)) {
        PromiseKind::Build
    } else if LINT.iter().any(|p| lower.contains(p)) {
        PromiseKind::Lint
    } else if TYPECHECK.iter().any(|p| lower.contains(p)) {
        PromiseKind::Typecheck
    } else {
        PromiseKind::Custom
    }
}

#[cfg(test)]
#[path = "promise_tests.rs"]
mod tests;
