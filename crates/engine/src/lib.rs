// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The loop engine: iterate an external AI agent against a working tree
//! until a promise shell command passes.
//!
//! The engine is a library and holds no process-global state. It runs
//! synchronously in the calling process; best-of-N branching and parallel
//! subagents use bounded OS-thread pools.

pub mod bestofn;
pub mod orchestrator;
pub mod promise;
pub mod runner;
pub mod state;
pub mod subagent;

pub use bestofn::{
    compare_branches, run_best_of_n, BestOfN, BestOfNResult, BranchResult, SelectionMode,
};
pub use orchestrator::{
    analyze_task, Orchestrator, OrchestratorConfig, OrchestratorPhase, TaskAnalysis, TaskType,
};
pub use promise::{
    classify_promise, verify_promise, verify_promise_detailed, PromiseKind, PromiseResult,
};
pub use runner::{
    inject_context, request_cancel, request_pause, request_resume, LoopOptions, LoopRunner,
};
pub use state::{LoopIteration, LoopState, LoopStatus};
pub use subagent::{
    template, ParallelSubagentRunner, SubagentResult, SubagentRunner, SubagentTask,
    SubagentTemplate,
};

use thiserror::Error;

/// Errors from the loop engine.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("no agent CLI available: {0}")]
    Agent(#[from] dl_adapters::AgentError),

    #[error("gate {gate} denied: {reason}")]
    GateDenied { gate: String, reason: String },

    #[error("loop not found: {0}")]
    NotFound(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] dl_workspace::WorkspaceError),

    #[error("corrupt loop state: {0}")]
    State(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
