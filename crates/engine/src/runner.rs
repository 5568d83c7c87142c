// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-loop runner.
//!
//! One loop drives one agent against one working tree until the promise
//! passes or iterations run out. Each iteration: checkpoint, prompt, agent,
//! promise, persist.

use crate::promise::{verify_promise, verify_promise_detailed, PROMISE_TIMEOUT};
use crate::state::{LoopIteration, LoopState, LoopStatus};
use crate::LoopError;
use dl_adapters::subprocess::run_shell;
use dl_adapters::{AgentAdapter, CheckpointBackend, Notifier};
use dl_core::{now_iso, LoopId};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How many lines of a failing promise's output feed the next prompt.
const PROMISE_EXCERPT_LINES: usize = 20;

/// Tunables for a loop run.
pub struct LoopOptions {
    pub max_iterations: u32,
    /// Per-iteration agent timeout.
    pub timeout: Duration,
    pub state_dir: PathBuf,
    pub template: Option<String>,
    pub loop_id: Option<LoopId>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout: Duration::from_secs(300),
            state_dir: LoopState::default_state_dir(),
            template: None,
            loop_id: None,
        }
    }
}

/// Executes one loop to completion.
pub struct LoopRunner {
    state: LoopState,
    agent: Box<dyn AgentAdapter>,
    checkpoint: Box<dyn CheckpointBackend>,
    timeout: Duration,
    state_dir: PathBuf,
    notifier: Option<Box<dyn Notifier>>,
    on_iteration: Option<Box<dyn Fn(&LoopIteration) + Send>>,
}

impl LoopRunner {
    pub fn new(
        task: &str,
        promise_cmd: &str,
        working_dir: &Path,
        agent: Box<dyn AgentAdapter>,
        checkpoint: Box<dyn CheckpointBackend>,
        options: LoopOptions,
    ) -> Self {
        let id = options.loop_id.clone().unwrap_or_else(LoopId::generate);
        let mut state = LoopState::new(
            id,
            task,
            promise_cmd,
            working_dir,
            agent.name(),
            options.max_iterations,
        );
        state.template = options.template.clone();

        Self {
            state,
            agent,
            checkpoint,
            timeout: options.timeout,
            state_dir: options.state_dir,
            notifier: None,
            on_iteration: None,
        }
    }

    /// Resume a persisted loop. The saved counters and iteration records
    /// carry over; execution continues where it stopped.
    pub fn resume_from(
        state: LoopState,
        agent: Box<dyn AgentAdapter>,
        checkpoint: Box<dyn CheckpointBackend>,
        options: LoopOptions,
    ) -> Self {
        Self {
            state,
            agent,
            checkpoint,
            timeout: options.timeout,
            state_dir: options.state_dir,
            notifier: None,
            on_iteration: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_on_iteration(
        mut self,
        callback: impl Fn(&LoopIteration) + Send + 'static,
    ) -> Self {
        self.on_iteration = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    fn set_status(&mut self, status: LoopStatus) -> Result<(), LoopError> {
        self.state.transition(status);
        self.state.save(&self.state_dir)
    }

    fn notify(&self, title: &str, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(title, message);
        }
    }

    /// Execute until the promise passes, iterations run out, or another
    /// actor cancels the loop. Returns whether the promise was met.
    pub fn run(&mut self) -> Result<bool, LoopError> {
        // Pick up state written before the run started (injected context,
        // an early pause).
        self.refresh_from_disk();

        // Promise may already hold; nothing to iterate.
        if verify_promise(&self.state.promise_cmd, &self.state.working_dir) {
            self.set_status(LoopStatus::Completed)?;
            self.notify("Loop completed", "Promise already satisfied");
            return Ok(true);
        }

        // The initial checkpoint is the rollback anchor for the whole run;
        // without it the loop does not start.
        match self.checkpoint.create(&format!("{}_initial", self.state.id), &self.state.working_dir)
        {
            Ok(checkpoint_id) => self.state.initial_checkpoint = checkpoint_id,
            Err(e) => {
                self.state.error_message = Some(format!("Failed to create initial checkpoint: {e}"));
                self.set_status(LoopStatus::Failed)?;
                return Ok(false);
            }
        }

        self.set_status(LoopStatus::Running)?;

        while self.state.current_iteration < self.state.max_iterations {
            // Re-read our own state so pause/cancel written by another
            // process (or injected context) take effect between iterations.
            self.refresh_from_disk();

            match self.state.status {
                LoopStatus::Paused => {
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
                LoopStatus::Cancelled => {
                    self.notify("Loop cancelled", &self.state.task);
                    return Ok(false);
                }
                _ => {}
            }

            if self.run_iteration()? {
                self.set_status(LoopStatus::Completed)?;
                self.notify(
                    "Loop completed",
                    &format!("Promise met after {} iterations", self.state.current_iteration),
                );
                return Ok(true);
            }
        }

        self.state.error_message = Some(format!(
            "Max iterations ({}) reached without meeting promise",
            self.state.max_iterations
        ));
        self.set_status(LoopStatus::Failed)?;
        self.notify("Loop failed", &format!("Gave up after {} iterations", self.state.max_iterations));
        Ok(false)
    }

    /// Pick up externally-written status and injected context.
    fn refresh_from_disk(&mut self) {
        let Ok(disk) = LoopState::load(&self.state_dir, self.state.id.as_str()) else {
            return;
        };
        match disk.status {
            LoopStatus::Paused | LoopStatus::Cancelled => {
                self.state.status = disk.status;
            }
            LoopStatus::Running if self.state.status == LoopStatus::Paused => {
                self.state.status = LoopStatus::Running;
            }
            _ => {}
        }
        self.state.injected_context = disk.injected_context;
    }

    /// One iteration: checkpoint, agent, promise, record, persist.
    fn run_iteration(&mut self) -> Result<bool, LoopError> {
        self.state.current_iteration += 1;
        let number = self.state.current_iteration;
        let start = Instant::now();

        // A failed iteration checkpoint is recoverable: continue without
        // one rather than abandoning the run.
        let checkpoint_id = match self
            .checkpoint
            .create(&format!("{}_iter{}", self.state.id, number), &self.state.working_dir)
        {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(iteration = number, error = %e, "iteration checkpoint failed");
                format!("failed_{number}")
            }
        };

        let mut iteration = LoopIteration {
            number,
            started_at: now_iso(),
            checkpoint_id,
            ..Default::default()
        };

        let prompt = self.build_prompt(number);
        let agent_result =
            self.agent.run(&prompt, &self.state.working_dir, None, self.timeout);
        iteration.agent_output = agent_result.output;
        iteration.agent_error = agent_result.error;

        let promise_result =
            verify_promise_detailed(&self.state.promise_cmd, &self.state.working_dir, PROMISE_TIMEOUT);
        iteration.promise_result = Some(promise_result.success);
        iteration.promise_output = promise_result.combined_output();

        iteration.completed_at = Some(now_iso());
        iteration.changes_summary = self.changes_summary();
        iteration.duration_ms = start.elapsed().as_millis() as u64;

        let success = promise_result.success;
        self.state.iterations.push(iteration);
        self.state.updated_at = now_iso();
        self.state.save(&self.state_dir)?;

        if let Some(callback) = &self.on_iteration {
            if let Some(last) = self.state.iterations.last() {
                callback(last);
            }
        }

        Ok(success)
    }

    /// Compose the full prompt for iteration `number`.
    fn build_prompt(&self, number: u32) -> String {
        let rule = "=".repeat(60);
        let mut parts = Vec::new();

        parts.push(rule.clone());
        parts.push(format!("LOOP ITERATION {}/{}", number, self.state.max_iterations));
        parts.push(rule.clone());

        parts.push(format!("\nTASK:\n{}", self.state.task));

        parts.push("\nSUCCESS CONDITION:".to_string());
        parts.push("The following command must exit with code 0:".to_string());
        parts.push(format!("  {}", self.state.promise_cmd));

        if !self.state.injected_context.is_empty() {
            parts.push("\nADDITIONAL CONTEXT:".to_string());
            for ctx in &self.state.injected_context {
                parts.push(format!("- {ctx}"));
            }
        }

        if number > 1 {
            if let Some(last) = self.state.iterations.last() {
                parts.push(format!("\nPREVIOUS ITERATION ({}) RESULT:", number - 1));
                if last.promise_result == Some(true) {
                    parts.push("  Status: PASSED".to_string());
                } else {
                    parts.push("  Status: FAILED".to_string());
                    if !last.promise_output.is_empty() {
                        parts.push("  Output:".to_string());
                        for line in last.promise_output.lines().take(PROMISE_EXCERPT_LINES) {
                            parts.push(format!("    {line}"));
                        }
                    }
                }
                parts.push("\nAnalyze what went wrong and try a different approach.".to_string());
            }
        }

        parts.push(format!("\n{rule}"));
        parts.push("INSTRUCTIONS:".to_string());
        parts.push("Make changes to the codebase to satisfy the success condition.".to_string());
        parts.push("Focus on the specific task. Make minimal, targeted changes.".to_string());
        parts.push(rule);

        parts.join("\n")
    }

    /// `git diff --stat` summary of what changed, best-effort.
    fn changes_summary(&self) -> String {
        let run = |cmd: &str| {
            run_shell(cmd, &self.state.working_dir, Duration::from_secs(10), None)
                .ok()
                .filter(|out| out.success())
                .map(|out| out.stdout.trim().to_string())
        };

        match run("git diff --stat HEAD") {
            Some(s) if !s.is_empty() => s,
            Some(_) => match run("git diff --stat") {
                Some(s) if !s.is_empty() => s,
                Some(_) => "No changes detected".to_string(),
                None => "Unable to detect changes".to_string(),
            },
            None => "Unable to detect changes".to_string(),
        }
    }

    /// Restore the working tree to a checkpoint from this loop.
    pub fn rollback(&self, checkpoint_id: &str) -> bool {
        self.checkpoint.restore(checkpoint_id, &self.state.working_dir).is_ok()
    }

    /// Restore to the state captured before the first iteration.
    pub fn rollback_to_initial(&self) -> bool {
        if self.state.initial_checkpoint.is_empty() {
            return false;
        }
        self.rollback(&self.state.initial_checkpoint.clone())
    }
}

/// Write a `paused` status into a loop's state file. The running loop
/// observes it between iterations.
pub fn request_pause(state_dir: &Path, id: &str) -> Result<(), LoopError> {
    update_status(state_dir, id, LoopStatus::Paused)
}

/// Resume a paused loop.
pub fn request_resume(state_dir: &Path, id: &str) -> Result<(), LoopError> {
    update_status(state_dir, id, LoopStatus::Running)
}

/// Cancel a loop; the running loop breaks out between iterations.
pub fn request_cancel(state_dir: &Path, id: &str) -> Result<(), LoopError> {
    update_status(state_dir, id, LoopStatus::Cancelled)
}

/// Append context for the next iteration of a persisted loop.
pub fn inject_context(state_dir: &Path, id: &str, context: &str) -> Result<(), LoopError> {
    let mut state = LoopState::load(state_dir, id)?;
    state.injected_context.push(context.to_string());
    state.updated_at = now_iso();
    state.save(state_dir)
}

fn update_status(state_dir: &Path, id: &str, status: LoopStatus) -> Result<(), LoopError> {
    let mut state = LoopState::load(state_dir, id)?;
    state.transition(status);
    state.save(state_dir)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
