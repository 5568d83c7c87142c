// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-agent orchestration.
//!
//! The orchestrator analyzes the task, plans phases, dispatches subagents
//! (parallel for research, sequential for implementation and verification),
//! synthesizes their findings between phases, and retries with a targeted
//! debugger when the main promise still fails.

use crate::promise::{verify_promise, verify_promise_detailed, PromiseResult, PROMISE_TIMEOUT};
use crate::subagent::{ParallelSubagentRunner, SubagentResult, SubagentTask};
use crate::LoopError;
use dl_adapters::AgentAdapter;
use dl_core::{LoopId, SubagentId};
use dl_gates::{Gate, GateChecker, GateContext};
use dl_workspace::{SubagentKind, SubagentStatus, SubagentUpdate, Workspace};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Phases of an orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    Planning,
    Research,
    Implementation,
    Verification,
    Synthesis,
}

impl OrchestratorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorPhase::Planning => "planning",
            OrchestratorPhase::Research => "research",
            OrchestratorPhase::Implementation => "implementation",
            OrchestratorPhase::Verification => "verification",
            OrchestratorPhase::Synthesis => "synthesis",
        }
    }
}

/// What kind of work a task looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Bugfix,
    Refactor,
    Feature,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Bugfix => "bugfix",
            TaskType::Refactor => "refactor",
            TaskType::Feature => "feature",
            TaskType::General => "general",
        }
    }
}

/// Strategy recommendation from keyword analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    pub needs_research: bool,
    pub phases: Vec<&'static str>,
    pub parallel_explorers: usize,
}

const DEBUG_KEYWORDS: [&str; 10] = [
    "fix", "bug", "error", "broken", "failing", "crash", "issue", "problem", "wrong", "incorrect",
];
const REFACTOR_KEYWORDS: [&str; 9] = [
    "refactor", "clean", "improve", "optimize", "restructure", "rename", "move", "extract",
    "simplify",
];
const RESEARCH_KEYWORDS: [&str; 9] =
    ["implement", "add", "create", "build", "new", "feature", "integration", "connect", "setup"];

/// Classify a task and recommend an orchestration strategy.
pub fn analyze_task(task: &str) -> TaskAnalysis {
    let lower = task.to_lowercase();

    if DEBUG_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        TaskAnalysis {
            task_type: TaskType::Bugfix,
            needs_research: true,
            phases: vec!["research", "debug", "verify"],
            // One explorer for error context, one for related code.
            parallel_explorers: 2,
        }
    } else if REFACTOR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        TaskAnalysis {
            task_type: TaskType::Refactor,
            needs_research: true,
            phases: vec!["research", "implement", "verify"],
            parallel_explorers: 2,
        }
    } else if RESEARCH_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        TaskAnalysis {
            task_type: TaskType::Feature,
            needs_research: true,
            phases: vec!["research", "implement", "verify"],
            parallel_explorers: 3,
        }
    } else {
        TaskAnalysis {
            task_type: TaskType::General,
            needs_research: false,
            phases: vec!["implement", "verify"],
            parallel_explorers: 1,
        }
    }
}

/// Orchestrator tunables.
pub struct OrchestratorConfig {
    pub max_subagents: usize,
    pub max_subagent_iterations: u32,
    pub subagent_timeout: Duration,
    pub parallel_research: bool,
    /// Orchestration rounds before giving up.
    pub max_iterations: u32,
    /// When set, every subagent spawn passes the agent_spawn gate.
    pub gate: Option<GateChecker>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_subagents: 4,
            max_subagent_iterations: 3,
            subagent_timeout: Duration::from_secs(180),
            parallel_research: true,
            max_iterations: 3,
            gate: None,
        }
    }
}

/// Orchestrates multi-agent execution of one task.
pub struct Orchestrator {
    task: String,
    promise: String,
    working_dir: PathBuf,
    config: OrchestratorConfig,
    agent: Arc<dyn AgentAdapter>,
    workspace: Arc<Mutex<Workspace>>,
    loop_id: LoopId,
    subagent_counter: u32,
    current_phase: Option<OrchestratorPhase>,
}

impl Orchestrator {
    pub fn new(
        task: &str,
        promise: &str,
        working_dir: &Path,
        agent: Arc<dyn AgentAdapter>,
        config: OrchestratorConfig,
        workspace_base: Option<&Path>,
    ) -> Result<Self, LoopError> {
        let loop_id = LoopId::generate();
        let workspace = Workspace::create(loop_id.clone(), task, promise, workspace_base)?;

        Ok(Self {
            task: task.to_string(),
            promise: promise.to_string(),
            working_dir: working_dir.to_path_buf(),
            config,
            agent,
            workspace: Arc::new(Mutex::new(workspace)),
            loop_id,
            subagent_counter: 0,
            current_phase: None,
        })
    }

    pub fn loop_id(&self) -> &LoopId {
        &self.loop_id
    }

    pub fn workspace(&self) -> Arc<Mutex<Workspace>> {
        Arc::clone(&self.workspace)
    }

    pub fn current_phase(&self) -> Option<OrchestratorPhase> {
        self.current_phase
    }

    fn next_subagent_id(&mut self, kind: SubagentKind) -> SubagentId {
        self.subagent_counter += 1;
        SubagentId::from_string(format!("{}-{}", kind.as_str(), self.subagent_counter))
    }

    fn findings_promise(&self, id: &SubagentId) -> String {
        let findings = self.workspace.lock().path().join("findings");
        format!("test -f {}", findings.join(format!("{id}.txt")).display())
    }

    fn create_research_tasks(&mut self, analysis: &TaskAnalysis) -> Vec<SubagentTask> {
        let mut tasks = Vec::new();
        let explorers = analysis.parallel_explorers.min(self.config.max_subagents);

        if analysis.task_type == TaskType::Bugfix {
            let contexts = [
                ("Find the root cause of", "Focus on error messages, stack traces, and recent changes."),
                ("Find code related to", "Look for relevant functions, tests, and dependencies."),
            ];
            for (prefix, context) in contexts {
                let id = self.next_subagent_id(SubagentKind::Explorer);
                tasks.push(SubagentTask {
                    promise: self.findings_promise(&id),
                    id,
                    kind: SubagentKind::Explorer,
                    objective: format!("{prefix}: {}", self.task),
                    context: context.to_string(),
                    timeout: self.config.subagent_timeout,
                    max_iterations: self.config.max_subagent_iterations,
                });
            }
        } else {
            let aspects = [
                "existing patterns and conventions in the codebase",
                "relevant files and functions",
                "dependencies and imports needed",
            ];
            for aspect in aspects.iter().take(explorers) {
                let id = self.next_subagent_id(SubagentKind::Explorer);
                tasks.push(SubagentTask {
                    promise: self.findings_promise(&id),
                    id,
                    kind: SubagentKind::Explorer,
                    objective: format!("Research {aspect} for: {}", self.task),
                    context: format!("Focus on: {aspect}"),
                    timeout: self.config.subagent_timeout,
                    max_iterations: self.config.max_subagent_iterations,
                });
            }
        }

        tasks
    }

    fn create_implementation_task(&mut self, analysis: &TaskAnalysis) -> SubagentTask {
        let mut context_lines = Vec::new();

        let findings_summary = self.workspace.lock().findings_summary();
        if findings_summary != "No findings yet." {
            context_lines.push("RESEARCH FINDINGS:".to_string());
            context_lines.push(findings_summary);
        }

        let kind = match analysis.task_type {
            TaskType::Bugfix => {
                context_lines.push("\nApproach: Fix the root cause identified in research.".into());
                SubagentKind::Debugger
            }
            TaskType::Refactor => {
                context_lines.push("\nApproach: Refactor while maintaining behavior.".into());
                SubagentKind::Implementer
            }
            _ => {
                context_lines.push(
                    "\nApproach: Implement the feature using patterns found in research.".into(),
                );
                SubagentKind::Implementer
            }
        };

        SubagentTask {
            id: self.next_subagent_id(kind),
            kind,
            objective: self.task.clone(),
            promise: self.promise.clone(),
            context: context_lines.join("\n"),
            // Implementation gets more room than research.
            timeout: self.config.subagent_timeout * 2,
            max_iterations: self.config.max_subagent_iterations * 2,
        }
    }

    fn create_verification_task(&mut self) -> SubagentTask {
        let mut context_lines = Vec::new();

        {
            let ws = self.workspace.lock();
            let implementers: Vec<String> = ws
                .state
                .subagents
                .values()
                .filter(|s| matches!(s.kind, SubagentKind::Implementer | SubagentKind::Debugger))
                .map(|s| {
                    let summary: String = s.output_summary.chars().take(200).collect();
                    format!("- {}: {}", s.id, summary)
                })
                .collect();
            if !implementers.is_empty() {
                context_lines.push("IMPLEMENTATION SUMMARY:".to_string());
                context_lines.extend(implementers);
            }
        }

        SubagentTask {
            id: self.next_subagent_id(SubagentKind::Reviewer),
            kind: SubagentKind::Reviewer,
            objective: format!("Review the implementation of: {}", self.task),
            promise: self.promise.clone(),
            context: context_lines.join("\n"),
            timeout: self.config.subagent_timeout,
            // Quick review.
            max_iterations: 2,
        }
    }

    fn plan_retry(
        &mut self,
        failed_results: &BTreeMap<SubagentId, SubagentResult>,
        promise_result: &PromiseResult,
    ) -> Vec<SubagentTask> {
        let mut error_context = Vec::new();
        if !promise_result.stderr.is_empty() {
            let excerpt: String = promise_result.stderr.chars().take(500).collect();
            error_context.push(format!("Promise error: {excerpt}"));
        }
        if !promise_result.stdout.is_empty() {
            let excerpt: String = promise_result.stdout.chars().take(500).collect();
            error_context.push(format!("Promise output: {excerpt}"));
        }

        let id = self.next_subagent_id(SubagentKind::Debugger);
        vec![SubagentTask {
            id,
            kind: SubagentKind::Debugger,
            objective: format!("Fix the failure in: {}", self.task),
            promise: self.promise.clone(),
            context: [
                "PREVIOUS ATTEMPT FAILED".to_string(),
                String::new(),
                error_context.join("\n"),
                String::new(),
                "SYNTHESIS OF PREVIOUS WORK:".to_string(),
                synthesize_results(failed_results),
            ]
            .join("\n"),
            timeout: self.config.subagent_timeout * 2,
            max_iterations: self.config.max_subagent_iterations * 2,
        }]
    }

    /// Run one phase: register the subagents, gate their spawn, dispatch.
    fn run_phase(
        &mut self,
        phase: OrchestratorPhase,
        tasks: Vec<SubagentTask>,
        parallel: bool,
    ) -> Result<BTreeMap<SubagentId, SubagentResult>, LoopError> {
        self.current_phase = Some(phase);
        tracing::info!(phase = phase.as_str(), subagents = tasks.len(), "starting phase");

        let mut admitted = Vec::new();
        {
            let mut ws = self.workspace.lock();
            for task in tasks {
                ws.register_subagent(task.id.clone(), task.kind, &task.objective)?;
                admitted.push(task);
            }
        }

        // Spawning an agent is a gated action.
        if let Some(gate) = &self.config.gate {
            let mut allowed = Vec::with_capacity(admitted.len());
            for task in admitted {
                let mut context = GateContext::new();
                context.insert(
                    "description".to_string(),
                    serde_json::Value::String(format!(
                        "spawn {} subagent: {}",
                        task.kind, task.objective
                    )),
                );
                let result = gate.check(Gate::AgentSpawn, context, "orchestrator");
                if result.allowed {
                    allowed.push(task);
                } else {
                    self.workspace.lock().update_subagent(
                        &task.id,
                        SubagentUpdate {
                            status: Some(SubagentStatus::Cancelled),
                            error: Some(format!("agent_spawn denied: {}", result.reason)),
                            ..Default::default()
                        },
                    )?;
                }
            }
            admitted = allowed;
        }

        let runner = ParallelSubagentRunner::new(
            Arc::clone(&self.workspace),
            &self.working_dir,
            if parallel { self.config.max_subagents } else { 1 },
            Arc::clone(&self.agent),
        );

        Ok(if parallel { runner.run_parallel(admitted) } else { runner.run_sequential(admitted) })
    }

    /// Run the orchestrated loop. Returns whether the main promise was met.
    pub fn run(&mut self) -> Result<bool, LoopError> {
        if verify_promise(&self.promise, &self.working_dir) {
            return Ok(true);
        }

        self.current_phase = Some(OrchestratorPhase::Planning);
        let analysis = analyze_task(&self.task);
        self.workspace.lock().set_plan(
            analysis.phases.iter().map(|p| p.to_string()).collect(),
            &format!(
                "Task type: {}, Explorers: {}",
                analysis.task_type.as_str(),
                analysis.parallel_explorers
            ),
        )?;

        let mut all_results: BTreeMap<SubagentId, SubagentResult> = BTreeMap::new();

        for round in 1..=self.config.max_iterations {
            self.workspace.lock().start_iteration()?;

            // Phase 1: research, first round only.
            if analysis.needs_research && round == 1 {
                let research_tasks = self.create_research_tasks(&analysis);
                let research_results = self.run_phase(
                    OrchestratorPhase::Research,
                    research_tasks,
                    self.config.parallel_research,
                )?;
                all_results.extend(research_results.clone());

                self.current_phase = Some(OrchestratorPhase::Synthesis);
                let synthesis = synthesize_results(&research_results);
                self.workspace.lock().save_artifact("research_synthesis.txt", synthesis.as_bytes())?;
                self.workspace.lock().advance_phase()?;
            }

            // Phase 2: implementation, sequential for coherence.
            let impl_task = self.create_implementation_task(&analysis);
            let impl_results =
                self.run_phase(OrchestratorPhase::Implementation, vec![impl_task], false)?;
            all_results.extend(impl_results.clone());

            let promise_result =
                verify_promise_detailed(&self.promise, &self.working_dir, PROMISE_TIMEOUT);

            if promise_result.success {
                // Optional verification pass; advisory, never blocks success.
                if analysis.phases.contains(&"verify") {
                    self.workspace.lock().advance_phase()?;
                    let verify_task = self.create_verification_task();
                    self.run_phase(OrchestratorPhase::Verification, vec![verify_task], false)?;
                }
                return Ok(true);
            }

            // Targeted retry with the failure in hand.
            if round < self.config.max_iterations {
                let retry_tasks = self.plan_retry(&impl_results, &promise_result);
                let retry_results =
                    self.run_phase(OrchestratorPhase::Implementation, retry_tasks, false)?;
                all_results.extend(retry_results);

                if verify_promise(&self.promise, &self.working_dir) {
                    return Ok(true);
                }
            }
        }

        {
            let mut ws = self.workspace.lock();
            ws.state.last_error = Some("Max orchestration iterations reached".to_string());
            ws.save()?;
        }
        Ok(false)
    }
}

/// Summarize a set of subagent results for the next phase's context.
fn synthesize_results(results: &BTreeMap<SubagentId, SubagentResult>) -> String {
    let mut lines = vec!["SYNTHESIS OF SUBAGENT RESULTS:".to_string(), "=".repeat(40)];

    let successes: Vec<&SubagentResult> = results.values().filter(|r| r.success).collect();
    let failures: Vec<&SubagentResult> = results.values().filter(|r| !r.success).collect();

    lines.push(format!("\nSuccessful: {}/{}", successes.len(), results.len()));

    if !successes.is_empty() {
        lines.push("\nSUCCESSFUL SUBAGENTS:".to_string());
        for result in &successes {
            lines.push(format!("\n[{}]", result.subagent_id));
            lines.push(format!("  Iterations: {}", result.iterations));
            if !result.findings.is_empty() {
                lines.push("  Key findings:".to_string());
                for finding in result.findings.iter().take(2) {
                    let excerpt: String = finding.content.chars().take(100).collect();
                    lines.push(format!("    - {excerpt}..."));
                }
            }
        }
    }

    if !failures.is_empty() {
        lines.push("\nFAILED SUBAGENTS:".to_string());
        for result in &failures {
            lines.push(format!("\n[{}]", result.subagent_id));
            lines.push(format!(
                "  Error: {}",
                result.error.as_deref().unwrap_or("Max iterations reached")
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
