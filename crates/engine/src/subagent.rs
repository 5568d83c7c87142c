// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subagent execution for orchestrated loops.
//!
//! A subagent is a constrained loop: it runs with a fixed template that
//! sets its objective prefix, tool surface, boundaries, and expected output
//! shape, and it reports findings into the shared workspace.

use crate::promise::verify_promise;
use crate::LoopError;
use dl_adapters::AgentAdapter;
use dl_core::{now_iso, FindingId, LoopId, SubagentId};
use dl_workspace::{Finding, SubagentKind, SubagentStatus, SubagentUpdate, Workspace};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Template fixing a subagent's behavior.
#[derive(Debug, Clone, Copy)]
pub struct SubagentTemplate {
    pub kind: SubagentKind,
    pub objective_prefix: &'static str,
    pub tools: &'static [&'static str],
    pub boundaries: &'static str,
    pub output_format: &'static str,
}

impl SubagentTemplate {
    pub fn format_objective(&self, task: &str) -> String {
        format!("{}: {}", self.objective_prefix, task)
    }
}

static TEMPLATES: [SubagentTemplate; 5] = [
    SubagentTemplate {
        kind: SubagentKind::Explorer,
        objective_prefix: "Research and find information about",
        tools: &["read", "grep", "glob", "web_search"],
        boundaries: "Read-only. Do not modify any files.",
        output_format: "Markdown summary with relevant file paths and code snippets",
    },
    SubagentTemplate {
        kind: SubagentKind::Implementer,
        objective_prefix: "Implement the following",
        tools: &["read", "write", "edit", "bash"],
        boundaries: "Modify only files relevant to the task.",
        output_format: "List of files modified and summary of changes",
    },
    SubagentTemplate {
        kind: SubagentKind::Reviewer,
        objective_prefix: "Review and verify",
        tools: &["read", "grep", "bash"],
        boundaries: "Do not modify files. Report issues only.",
        output_format: "List of issues found with severity and location",
    },
    SubagentTemplate {
        kind: SubagentKind::Debugger,
        objective_prefix: "Debug and fix",
        tools: &["read", "write", "edit", "bash"],
        boundaries: "Focus on the specific error. Minimal changes.",
        output_format: "Root cause analysis and fix description",
    },
    SubagentTemplate {
        kind: SubagentKind::Tester,
        objective_prefix: "Write tests for",
        tools: &["read", "write", "bash"],
        boundaries: "Only create/modify test files.",
        output_format: "Test file paths and coverage summary",
    },
];

/// The template for a subagent kind.
pub fn template(kind: SubagentKind) -> &'static SubagentTemplate {
    // TEMPLATES carries one entry per kind, in declaration order.
    &TEMPLATES[SubagentKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(1)]
}

/// A task handed to a subagent by the orchestrator.
#[derive(Debug, Clone)]
pub struct SubagentTask {
    pub id: SubagentId,
    pub kind: SubagentKind,
    pub objective: String,
    pub promise: String,
    /// Extra context composed by the orchestrator.
    pub context: String,
    pub timeout: Duration,
    pub max_iterations: u32,
}

/// Result returned to the orchestrator for synthesis.
#[derive(Debug, Clone)]
pub struct SubagentResult {
    pub subagent_id: SubagentId,
    pub success: bool,
    pub iterations: u32,
    pub output: String,
    pub error: Option<String>,
    pub findings: Vec<Finding>,
    pub duration_ms: u64,
}

/// Executes one subagent task against the shared workspace.
pub struct SubagentRunner {
    task: SubagentTask,
    workspace: Arc<Mutex<Workspace>>,
    working_dir: PathBuf,
    agent: Arc<dyn AgentAdapter>,
}

impl SubagentRunner {
    pub fn new(
        task: SubagentTask,
        workspace: Arc<Mutex<Workspace>>,
        working_dir: &Path,
        agent: Arc<dyn AgentAdapter>,
    ) -> Self {
        Self { task, workspace, working_dir: working_dir.to_path_buf(), agent }
    }

    /// Run the subagent until its promise passes or iterations run out.
    pub fn run(self) -> Result<SubagentResult, LoopError> {
        let start = Instant::now();
        let template = template(self.task.kind);

        self.workspace.lock().update_subagent(
            &self.task.id,
            SubagentUpdate {
                status: Some(SubagentStatus::Running),
                loop_id: Some(LoopId::generate()),
                ..Default::default()
            },
        )?;

        if verify_promise(&self.task.promise, &self.working_dir) {
            self.workspace.lock().update_subagent(
                &self.task.id,
                SubagentUpdate {
                    status: Some(SubagentStatus::Completed),
                    promise_result: Some(true),
                    output_summary: Some("Promise already satisfied".to_string()),
                    ..Default::default()
                },
            )?;
            return Ok(SubagentResult {
                subagent_id: self.task.id.clone(),
                success: true,
                iterations: 0,
                output: "Promise already satisfied".to_string(),
                error: None,
                findings: Vec::new(),
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let mut iterations = 0;
        let mut last_output = String::new();
        let mut last_error: Option<String> = None;
        let mut findings: Vec<Finding> = Vec::new();

        while iterations < self.task.max_iterations {
            iterations += 1;
            self.workspace.lock().record_subagent_iteration()?;

            let prompt = self.build_prompt(template, iterations, &findings);
            let result = self.agent.run(&prompt, &self.working_dir, None, self.task.timeout);
            last_output = result.output;
            if !result.error.is_empty() {
                last_error = Some(result.error);
            }

            let finding = self.extract_finding(&last_output);
            {
                let mut ws = self.workspace.lock();
                ws.add_finding(finding.clone())?;
            }
            findings.push(finding);

            if verify_promise(&self.task.promise, &self.working_dir) {
                self.workspace.lock().update_subagent(
                    &self.task.id,
                    SubagentUpdate {
                        status: Some(SubagentStatus::Completed),
                        promise_result: Some(true),
                        output_summary: Some(bounded(&last_output, 500)),
                        ..Default::default()
                    },
                )?;
                return Ok(SubagentResult {
                    subagent_id: self.task.id.clone(),
                    success: true,
                    iterations,
                    output: last_output,
                    error: None,
                    findings,
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let error = last_error.clone().unwrap_or_else(|| "Max iterations reached".to_string());
        self.workspace.lock().update_subagent(
            &self.task.id,
            SubagentUpdate {
                status: Some(SubagentStatus::Failed),
                promise_result: Some(false),
                output_summary: Some(bounded(&last_output, 500)),
                error: Some(error.clone()),
                ..Default::default()
            },
        )?;

        Ok(SubagentResult {
            subagent_id: self.task.id.clone(),
            success: false,
            iterations,
            output: last_output,
            error: Some(error),
            findings,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn build_prompt(
        &self,
        template: &SubagentTemplate,
        iteration: u32,
        findings: &[Finding],
    ) -> String {
        let rule = "=".repeat(60);
        let mut lines = Vec::new();

        lines.push(rule.clone());
        lines.push(format!("SUBAGENT: {}", template.kind.as_str().to_uppercase()));
        lines.push(format!("Iteration {}/{}", iteration, self.task.max_iterations));
        lines.push(rule.clone());

        lines.push(format!("\nOBJECTIVE:\n{}", template.format_objective(&self.task.objective)));

        lines.push("\nSUCCESS CONDITION:".to_string());
        lines.push("The following command must exit with code 0:".to_string());
        lines.push(format!("  {}", self.task.promise));

        lines.push(format!("\nBOUNDARIES:\n  {}", template.boundaries));
        lines.push(format!("\nEXPECTED OUTPUT FORMAT:\n  {}", template.output_format));

        if !self.task.context.is_empty() {
            lines.push(format!("\nCONTEXT FROM ORCHESTRATOR:\n{}", self.task.context));
        }

        let workspace_context = self.workspace.lock().build_context_for_subagent(&self.task.id);
        if !workspace_context.is_empty() {
            lines.push(format!("\nWORKSPACE CONTEXT:\n{workspace_context}"));
        }

        if iteration > 1 && !findings.is_empty() {
            lines.push("\nPREVIOUS FINDINGS:".to_string());
            for finding in findings.iter().rev().take(3).rev() {
                lines.push(format!("- {}...", bounded(&finding.content, 200)));
            }
        }

        lines.push(format!("\n{rule}"));
        lines.push("Complete the objective above. Stay within boundaries.".to_string());
        lines.push(rule);

        lines.join("\n")
    }

    /// Wrap an agent's output into a finding, with file paths pulled out of
    /// the text.
    fn extract_finding(&self, output: &str) -> Finding {
        Finding {
            id: FindingId::generate(),
            from_agent: self.task.id.clone(),
            kind: self.task.kind,
            content: bounded(output, 2000),
            files: extract_file_paths(output),
            timestamp: now_iso(),
        }
    }
}

fn bounded(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

/// Pull file-path-looking tokens out of agent output. Capped at 10.
fn extract_file_paths(text: &str) -> Vec<String> {
    // Paths starting with ./ or /, and anything with an extension inside
    // backticks.
    static PATTERNS: [&str; 2] = [r"(?:^|\s)([./][\w/.\-]+\.\w+)", r"`([^`\s]+\.\w+)`"];

    let mut paths = Vec::new();
    for pattern in PATTERNS {
        let Ok(re) = regex::Regex::new(pattern) else { continue };
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let path = m.as_str().to_string();
            if ["http", "www", "<", ">"].iter().any(|x| path.contains(x)) {
                continue;
            }
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths.truncate(10);
    paths
}

/// Runs subagent tasks on a bounded worker pool.
pub struct ParallelSubagentRunner {
    workspace: Arc<Mutex<Workspace>>,
    working_dir: PathBuf,
    max_concurrent: usize,
    agent: Arc<dyn AgentAdapter>,
}

impl ParallelSubagentRunner {
    pub fn new(
        workspace: Arc<Mutex<Workspace>>,
        working_dir: &Path,
        max_concurrent: usize,
        agent: Arc<dyn AgentAdapter>,
    ) -> Self {
        Self {
            workspace,
            working_dir: working_dir.to_path_buf(),
            max_concurrent: max_concurrent.max(1),
            agent,
        }
    }

    /// Run tasks concurrently under the worker cap. Results land in the map
    /// in the order tasks complete.
    pub fn run_parallel(
        &self,
        tasks: Vec<SubagentTask>,
    ) -> BTreeMap<SubagentId, SubagentResult> {
        let queue = Mutex::new(VecDeque::from(tasks));
        let results = Mutex::new(BTreeMap::new());
        let workers = self.max_concurrent.min(queue.lock().len()).max(1);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let Some(task) = queue.lock().pop_front() else { break };
                    let id = task.id.clone();
                    let runner = SubagentRunner::new(
                        task,
                        Arc::clone(&self.workspace),
                        &self.working_dir,
                        Arc::clone(&self.agent),
                    );
                    let result = match runner.run() {
                        Ok(result) => result,
                        Err(e) => failed_result(id.clone(), &e.to_string()),
                    };
                    results.lock().insert(id, result);
                });
            }
        });

        results.into_inner()
    }

    /// Run tasks in order, stopping early when an implementation-critical
    /// task fails.
    pub fn run_sequential(
        &self,
        tasks: Vec<SubagentTask>,
    ) -> BTreeMap<SubagentId, SubagentResult> {
        let mut results = BTreeMap::new();

        for task in tasks {
            let id = task.id.clone();
            let kind = task.kind;
            let runner = SubagentRunner::new(
                task,
                Arc::clone(&self.workspace),
                &self.working_dir,
                Arc::clone(&self.agent),
            );
            let result = match runner.run() {
                Ok(result) => result,
                Err(e) => failed_result(id.clone(), &e.to_string()),
            };
            let failed = !result.success;
            results.insert(id, result);

            if failed && matches!(kind, SubagentKind::Implementer | SubagentKind::Debugger) {
                break;
            }
        }

        results
    }
}

fn failed_result(id: SubagentId, error: &str) -> SubagentResult {
    SubagentResult {
        subagent_id: id,
        success: false,
        iterations: 0,
        output: String::new(),
        error: Some(error.to_string()),
        findings: Vec::new(),
        duration_ms: 0,
    }
}

#[cfg(test)]
#[path = "subagent_tests.rs"]
mod tests;
