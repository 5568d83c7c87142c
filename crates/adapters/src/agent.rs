// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent adapters for external AI coding CLIs.
//!
//! The loop engine is agent-agnostic: every adapter takes a prompt, a
//! working directory, optional context, and a timeout, and returns the
//! captured result. Auto-detection prefers open-source tools.

use crate::subprocess::{run_argv, run_shell, CommandOutput};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

impl AgentResult {
    fn from_output(out: CommandOutput) -> Self {
        Self {
            success: out.success(),
            output: out.stdout,
            error: out.stderr,
            exit_code: out.exit_code,
            timed_out: out.timed_out,
        }
    }

    fn timed_out_after(timeout: Duration) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: format!("Agent timed out after {} seconds", timeout.as_secs()),
            exit_code: -1,
            timed_out: true,
        }
    }

    fn spawn_failed(e: std::io::Error) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: format!("Failed to run agent: {e}"),
            exit_code: -1,
            timed_out: false,
        }
    }
}

/// Errors from agent selection.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unknown agent: {0} (available: opencode, claude, aider, custom, noop)")]
    Unknown(String),

    #[error("custom agent requires a command")]
    MissingCustomCommand,

    #[error("no agent CLI detected on this system")]
    NoneAvailable,
}

/// Uniform contract over external AI coding CLIs.
pub trait AgentAdapter: Send + Sync {
    /// The adapter's registry name.
    fn name(&self) -> &str;

    /// Whether the underlying CLI is installed and answering.
    fn is_available(&self) -> bool;

    /// Run the agent with the given prompt.
    fn run(
        &self,
        prompt: &str,
        working_dir: &Path,
        context: Option<&str>,
        timeout: Duration,
    ) -> AgentResult;
}

fn build_full_prompt(prompt: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!("{ctx}\n\n---\n\n{prompt}"),
        _ => prompt.to_string(),
    }
}

fn probe(argv: &[&str]) -> bool {
    run_argv(argv, Path::new("."), VERSION_PROBE_TIMEOUT, None)
        .map(|out| out.success())
        .unwrap_or(false)
}

fn finish(result: std::io::Result<CommandOutput>, timeout: Duration) -> AgentResult {
    match result {
        Ok(out) if out.timed_out => AgentResult::timed_out_after(timeout),
        Ok(out) => AgentResult::from_output(out),
        Err(e) => AgentResult::spawn_failed(e),
    }
}

/// OpenCode: the FOSS default. Takes the prompt via a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCodeAgent;

impl AgentAdapter for OpenCodeAgent {
    fn name(&self) -> &str {
        "opencode"
    }

    fn is_available(&self) -> bool {
        probe(&["opencode", "--version"])
    }

    fn run(
        &self,
        prompt: &str,
        working_dir: &Path,
        context: Option<&str>,
        timeout: Duration,
    ) -> AgentResult {
        let full_prompt = build_full_prompt(prompt, context);

        let mut prompt_file = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => return AgentResult::spawn_failed(e),
        };
        if let Err(e) = prompt_file.write_all(full_prompt.as_bytes()) {
            return AgentResult::spawn_failed(e);
        }
        let path = prompt_file.path().display().to_string();

        finish(
            run_argv(
                &["opencode", "--prompt-file", &path, "--non-interactive"],
                working_dir,
                timeout,
                None,
            ),
            timeout,
        )
        // prompt_file is removed on drop
    }
}

/// Claude Code CLI. Prompt on stdin avoids shell escaping and length limits;
/// `--permission-mode acceptEdits` lets it modify files without prompting.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeAgent;

impl AgentAdapter for ClaudeAgent {
    fn name(&self) -> &str {
        "claude"
    }

    fn is_available(&self) -> bool {
        probe(&["claude", "--version"])
    }

    fn run(
        &self,
        prompt: &str,
        working_dir: &Path,
        context: Option<&str>,
        timeout: Duration,
    ) -> AgentResult {
        let full_prompt = build_full_prompt(prompt, context);
        finish(
            run_argv(
                &["claude", "--print", "--permission-mode", "acceptEdits"],
                working_dir,
                timeout,
                Some(&full_prompt),
            ),
            timeout,
        )
    }
}

/// Aider.
#[derive(Debug, Default, Clone, Copy)]
pub struct AiderAgent;

impl AgentAdapter for AiderAgent {
    fn name(&self) -> &str {
        "aider"
    }

    fn is_available(&self) -> bool {
        probe(&["aider", "--version"])
    }

    fn run(
        &self,
        prompt: &str,
        working_dir: &Path,
        context: Option<&str>,
        timeout: Duration,
    ) -> AgentResult {
        let full_prompt = build_full_prompt(prompt, context);
        finish(
            run_argv(
                &["aider", "--message", &full_prompt, "--yes", "--no-auto-commits"],
                working_dir,
                timeout,
                None,
            ),
            timeout,
        )
    }
}

/// Any shell command as an agent; the prompt arrives on stdin.
#[derive(Debug, Clone)]
pub struct CustomAgent {
    command: String,
}

impl CustomAgent {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl AgentAdapter for CustomAgent {
    fn name(&self) -> &str {
        "custom"
    }

    fn is_available(&self) -> bool {
        // Custom commands are taken on faith.
        true
    }

    fn run(
        &self,
        prompt: &str,
        working_dir: &Path,
        context: Option<&str>,
        timeout: Duration,
    ) -> AgentResult {
        let full_prompt = build_full_prompt(prompt, context);
        finish(run_shell(&self.command, working_dir, timeout, Some(&full_prompt)), timeout)
    }
}

/// Does nothing and reports success. For dry runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAgent;

impl AgentAdapter for NoopAgent {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn run(&self, _: &str, _: &Path, _: Option<&str>, _: Duration) -> AgentResult {
        AgentResult { success: true, ..Default::default() }
    }
}

/// Look up an adapter by name.
pub fn get_agent(name: &str, custom_cmd: Option<&str>) -> Result<Box<dyn AgentAdapter>, AgentError> {
    match name {
        "opencode" => Ok(Box::new(OpenCodeAgent)),
        "claude" => Ok(Box::new(ClaudeAgent)),
        "aider" => Ok(Box::new(AiderAgent)),
        "noop" => Ok(Box::new(NoopAgent)),
        "custom" => match custom_cmd {
            Some(cmd) if !cmd.is_empty() => Ok(Box::new(CustomAgent::new(cmd))),
            _ => Err(AgentError::MissingCustomCommand),
        },
        other => Err(AgentError::Unknown(other.to_string())),
    }
}

/// Auto-detect an installed agent, preferring open-source tools:
/// opencode, then aider, then claude.
pub fn detect_agent() -> Option<Box<dyn AgentAdapter>> {
    let candidates: [Box<dyn AgentAdapter>; 3] =
        [Box::new(OpenCodeAgent), Box::new(AiderAgent), Box::new(ClaudeAgent)];
    candidates.into_iter().find(|agent| agent.is_available())
}

/// Names of all agents currently answering a version probe.
pub fn available_agents() -> Vec<&'static str> {
    let mut available = Vec::new();
    if OpenCodeAgent.is_available() {
        available.push("opencode");
    }
    if AiderAgent.is_available() {
        available.push("aider");
    }
    if ClaudeAgent.is_available() {
        available.push("claude");
    }
    available
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{AgentAdapter, AgentResult};
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    type Behavior = dyn Fn(&str, &Path) -> AgentResult + Send + Sync;

    /// Recorded invocation.
    #[derive(Debug, Clone)]
    pub struct AgentCall {
        pub prompt: String,
        pub working_dir: PathBuf,
    }

    /// Scriptable agent for tests. Records every prompt it receives.
    #[derive(Clone)]
    pub struct FakeAgent {
        calls: Arc<Mutex<Vec<AgentCall>>>,
        behavior: Arc<Behavior>,
    }

    impl FakeAgent {
        /// Succeeds without touching anything.
        pub fn succeeding() -> Self {
            Self::with(|_, _| AgentResult { success: true, ..Default::default() })
        }

        /// Custom behavior per invocation.
        pub fn with(
            behavior: impl Fn(&str, &Path) -> AgentResult + Send + Sync + 'static,
        ) -> Self {
            Self { calls: Arc::new(Mutex::new(Vec::new())), behavior: Arc::new(behavior) }
        }

        pub fn calls(&self) -> Vec<AgentCall> {
            self.calls.lock().clone()
        }
    }

    impl AgentAdapter for FakeAgent {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn run(
            &self,
            prompt: &str,
            working_dir: &Path,
            _context: Option<&str>,
            _timeout: Duration,
        ) -> AgentResult {
            self.calls.lock().push(AgentCall {
                prompt: prompt.to_string(),
                working_dir: working_dir.to_path_buf(),
            });
            (self.behavior)(prompt, working_dir)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentCall, FakeAgent};

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
