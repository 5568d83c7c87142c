// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace state records.

use dl_core::{FindingId, HandoffId, LoopId, SubagentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Template a subagent runs under; also the type tag on its findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentKind {
    Explorer,
    Implementer,
    Reviewer,
    Debugger,
    Tester,
}

impl SubagentKind {
    pub const ALL: [SubagentKind; 5] = [
        SubagentKind::Explorer,
        SubagentKind::Implementer,
        SubagentKind::Reviewer,
        SubagentKind::Debugger,
        SubagentKind::Tester,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubagentKind::Explorer => "explorer",
            SubagentKind::Implementer => "implementer",
            SubagentKind::Reviewer => "reviewer",
            SubagentKind::Debugger => "debugger",
            SubagentKind::Tester => "tester",
        }
    }
}

impl std::str::FromStr for SubagentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown subagent template: {s}"))
    }
}

impl std::fmt::Display for SubagentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subagent lifecycle. Status only advances; completed and failed are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SubagentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubagentStatus::Completed | SubagentStatus::Failed | SubagentStatus::Cancelled
        )
    }
}

/// A finding appended by a subagent. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub from_agent: SubagentId,
    pub kind: SubagentKind,
    pub content: String,
    pub files: Vec<String>,
    pub timestamp: String,
}

/// A handoff message between subagents. The acknowledged flag flips once,
/// from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub id: HandoffId,
    pub from_agent: SubagentId,
    pub to_agent: SubagentId,
    pub message: String,
    pub context_files: Vec<String>,
    pub timestamp: String,
    #[serde(default)]
    pub acknowledged: bool,
}

/// Record of one subagent's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentRecord {
    pub id: SubagentId,
    pub kind: SubagentKind,
    pub objective: String,
    pub status: SubagentStatus,
    pub loop_id: Option<LoopId>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub promise_result: Option<bool>,
    pub output_summary: String,
    pub error: Option<String>,
}

/// Partial mutation applied to a subagent record by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SubagentUpdate {
    pub status: Option<SubagentStatus>,
    pub loop_id: Option<LoopId>,
    pub promise_result: Option<bool>,
    pub output_summary: Option<String>,
    pub error: Option<String>,
}

/// The orchestrator's phase plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorPlan {
    pub phases: Vec<String>,
    pub current_phase: String,
    pub current_phase_index: usize,
    pub strategy: String,
}

/// Complete workspace state, persisted to `workspace.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub loop_id: LoopId,
    pub created_at: String,
    pub updated_at: String,
    pub iteration: u32,
    pub main_task: String,
    pub main_promise: String,

    pub plan: Option<OrchestratorPlan>,

    #[serde(default)]
    pub subagents: BTreeMap<SubagentId, SubagentRecord>,

    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub handoffs: Vec<Handoff>,

    #[serde(default)]
    pub total_subagent_iterations: u64,
    pub last_error: Option<String>,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
