// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared workspace for multi-agent orchestration.
//!
//! The workspace is the durable memory between an orchestrator and its
//! subagents: plan, subagent records, findings, handoffs, and artifacts.
//!
//! On-disk layout:
//!
//! ```text
//! <state>/loops/<loop-id>/
//! ├── workspace.json      main state file
//! ├── findings/           per-subagent finding transcripts
//! ├── handoffs/           one JSON file per handoff
//! └── artifacts/          files produced by subagents
//! ```
//!
//! Persistence is whole-file last-writer-wins; record-level ownership keeps
//! that safe (the orchestrator is the only writer of plan and subagent
//! status fields, subagents only append findings under their own ID).

mod state;
mod workspace;

pub use state::{
    Finding, Handoff, OrchestratorPlan, SubagentKind, SubagentRecord, SubagentStatus,
    SubagentUpdate, WorkspaceState,
};
pub use workspace::Workspace;

use thiserror::Error;

/// Maximum characters of a finding body kept in state.
pub const FINDING_CONTENT_LIMIT: usize = 2000;

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found: {0}")]
    Missing(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt workspace state: {0}")]
    Json(#[from] serde_json::Error),
}
