// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent loop state.
//!
//! State is rewritten to `<state>/loop/states/<id>.json` after every
//! iteration and every status change, which is what makes pause, resume,
//! and post-mortem inspection work.

use crate::LoopError;
use dl_core::{now_iso, LoopId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Status of a loop execution.
///
/// Transitions follow a DAG: pending → running → (paused ↔ running) →
/// {completed, failed, cancelled}; a loop whose promise already passes (or
/// whose initial checkpoint fails) goes terminal straight from pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl LoopStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopStatus::Completed | LoopStatus::Failed | LoopStatus::Cancelled)
    }

    /// Whether moving to `next` is a legal step along the DAG. Status never
    /// moves backward.
    pub fn can_transition(&self, next: LoopStatus) -> bool {
        use LoopStatus::*;
        match self {
            Pending => matches!(next, Running | Completed | Failed | Cancelled),
            Running => matches!(next, Paused | Completed | Failed | Cancelled),
            Paused => matches!(next, Running | Completed | Failed | Cancelled),
            Completed | Failed | Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Pending => "pending",
            LoopStatus::Running => "running",
            LoopStatus::Paused => "paused",
            LoopStatus::Completed => "completed",
            LoopStatus::Failed => "failed",
            LoopStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of a single loop iteration. Append-only within its loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopIteration {
    pub number: u32,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub checkpoint_id: String,
    /// None while the iteration is in flight.
    pub promise_result: Option<bool>,
    pub promise_output: String,
    pub agent_output: String,
    pub agent_error: String,
    pub changes_summary: String,
    pub duration_ms: u64,
}

/// Persistent state for a loop. Mutated only by the owning loop's thread
/// of control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    pub id: LoopId,
    pub task: String,
    pub promise_cmd: String,
    pub status: LoopStatus,
    pub working_dir: PathBuf,
    pub agent_name: String,
    pub max_iterations: u32,
    pub current_iteration: u32,
    pub iterations: Vec<LoopIteration>,
    pub created_at: String,
    pub updated_at: String,
    pub initial_checkpoint: String,
    #[serde(default)]
    pub injected_context: Vec<String>,
    pub template: Option<String>,
    pub error_message: Option<String>,
}

impl LoopState {
    pub fn new(
        id: LoopId,
        task: &str,
        promise_cmd: &str,
        working_dir: &Path,
        agent_name: &str,
        max_iterations: u32,
    ) -> Self {
        Self {
            id,
            task: task.to_string(),
            promise_cmd: promise_cmd.to_string(),
            status: LoopStatus::Pending,
            working_dir: working_dir.to_path_buf(),
            agent_name: agent_name.to_string(),
            max_iterations,
            current_iteration: 0,
            iterations: Vec::new(),
            created_at: now_iso(),
            updated_at: now_iso(),
            initial_checkpoint: String::new(),
            injected_context: Vec::new(),
            template: None,
            error_message: None,
        }
    }

    /// Default location for persisted loop states.
    pub fn default_state_dir() -> PathBuf {
        dl_core::paths::data_dir().join("loop").join("states")
    }

    fn file_for(state_dir: &Path, id: &str) -> PathBuf {
        state_dir.join(format!("{id}.json"))
    }

    /// Apply a status transition. Illegal steps are refused and logged;
    /// the DAG never moves backward.
    pub fn transition(&mut self, next: LoopStatus) -> bool {
        if self.status == next {
            return true;
        }
        if !self.status.can_transition(next) {
            tracing::warn!(
                from = %self.status,
                to = %next,
                loop_id = %self.id,
                "refusing illegal loop status transition"
            );
            return false;
        }
        self.status = next;
        self.updated_at = now_iso();
        true
    }

    /// Rewrite the state file.
    pub fn save(&self, state_dir: &Path) -> Result<(), LoopError> {
        std::fs::create_dir_all(state_dir)?;
        let body = serde_json::to_vec_pretty(self)?;
        std::fs::write(Self::file_for(state_dir, self.id.as_str()), body)?;
        Ok(())
    }

    pub fn load(state_dir: &Path, id: &str) -> Result<Self, LoopError> {
        let path = Self::file_for(state_dir, id);
        if !path.exists() {
            return Err(LoopError::NotFound(id.to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All saved states, newest-updated first. Unparseable files are
    /// skipped.
    pub fn list_all(state_dir: &Path) -> Vec<Self> {
        let Ok(entries) = std::fs::read_dir(state_dir) else {
            return Vec::new();
        };
        let mut states: Vec<Self> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let content = std::fs::read_to_string(e.path()).ok()?;
                serde_json::from_str(&content).ok()
            })
            .collect();
        states.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        states
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
