// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace operations.

use crate::state::*;
use crate::{WorkspaceError, FINDING_CONTENT_LIMIT};
use dl_core::{now_iso, LoopId, SubagentId};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A workspace bound to its on-disk directory.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    pub state: WorkspaceState,
}

impl Workspace {
    fn default_base_dir() -> PathBuf {
        dl_core::paths::data_dir().join("loops")
    }

    fn dir_for(loop_id: &LoopId, base_dir: Option<&Path>) -> PathBuf {
        base_dir.map(Path::to_path_buf).unwrap_or_else(Self::default_base_dir).join(loop_id.as_str())
    }

    /// Create a fresh workspace bound to `loop_id`.
    pub fn create(
        loop_id: LoopId,
        task: &str,
        promise: &str,
        base_dir: Option<&Path>,
    ) -> Result<Self, WorkspaceError> {
        let path = Self::dir_for(&loop_id, base_dir);
        let state = WorkspaceState {
            loop_id,
            created_at: now_iso(),
            updated_at: now_iso(),
            iteration: 0,
            main_task: task.to_string(),
            main_promise: promise.to_string(),
            plan: None,
            subagents: Default::default(),
            findings: Vec::new(),
            handoffs: Vec::new(),
            total_subagent_iterations: 0,
            last_error: None,
        };

        let workspace = Self { path, state };
        workspace.ensure_dirs()?;
        workspace.save()?;
        Ok(workspace)
    }

    /// Load an existing workspace.
    pub fn load(loop_id: &LoopId, base_dir: Option<&Path>) -> Result<Self, WorkspaceError> {
        let path = Self::dir_for(loop_id, base_dir);
        let state_file = path.join("workspace.json");
        if !state_file.exists() {
            return Err(WorkspaceError::Missing(loop_id.to_string()));
        }
        let content = std::fs::read_to_string(&state_file)?;
        let state: WorkspaceState = serde_json::from_str(&content)?;
        let workspace = Self { path, state };
        workspace.ensure_dirs()?;
        Ok(workspace)
    }

    pub fn exists(loop_id: &LoopId, base_dir: Option<&Path>) -> bool {
        Self::dir_for(loop_id, base_dir).join("workspace.json").exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dirs(&self) -> Result<(), WorkspaceError> {
        for sub in ["findings", "handoffs", "artifacts"] {
            std::fs::create_dir_all(self.path.join(sub))?;
        }
        Ok(())
    }

    /// Persist state. Whole-file write, last writer wins.
    pub fn save(&self) -> Result<(), WorkspaceError> {
        let body = serde_json::to_vec_pretty(&self.state)?;
        std::fs::write(self.path.join("workspace.json"), body)?;
        Ok(())
    }

    fn touch_and_save(&mut self) -> Result<(), WorkspaceError> {
        self.state.updated_at = now_iso();
        self.save()
    }

    /// Remove the workspace directory. Only explicit cleanup destroys state.
    pub fn destroy(self) -> Result<(), WorkspaceError> {
        if self.path.exists() {
            std::fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }

    // === Plan management ===

    pub fn set_plan(&mut self, phases: Vec<String>, strategy: &str) -> Result<(), WorkspaceError> {
        self.state.plan = Some(OrchestratorPlan {
            current_phase: phases.first().cloned().unwrap_or_default(),
            current_phase_index: 0,
            phases,
            strategy: strategy.to_string(),
        });
        self.touch_and_save()
    }

    /// Advance to the next phase. Returns false when there is none.
    pub fn advance_phase(&mut self) -> Result<bool, WorkspaceError> {
        let Some(plan) = self.state.plan.as_mut() else {
            return Ok(false);
        };
        if plan.current_phase_index + 1 >= plan.phases.len() {
            return Ok(false);
        }
        plan.current_phase_index += 1;
        plan.current_phase = plan.phases[plan.current_phase_index].clone();
        self.touch_and_save()?;
        Ok(true)
    }

    // === Subagent management ===

    pub fn register_subagent(
        &mut self,
        id: SubagentId,
        kind: SubagentKind,
        objective: &str,
    ) -> Result<SubagentRecord, WorkspaceError> {
        let record = SubagentRecord {
            id: id.clone(),
            kind,
            objective: objective.to_string(),
            status: SubagentStatus::Pending,
            loop_id: None,
            started_at: None,
            finished_at: None,
            promise_result: None,
            output_summary: String::new(),
            error: None,
        };
        self.state.subagents.insert(id, record.clone());
        self.touch_and_save()?;
        Ok(record)
    }

    /// Apply a partial update. Start and finish timestamps are applied by
    /// the status transition, not by callers.
    pub fn update_subagent(
        &mut self,
        id: &SubagentId,
        update: SubagentUpdate,
    ) -> Result<(), WorkspaceError> {
        let Some(record) = self.state.subagents.get_mut(id) else {
            return Ok(());
        };

        if let Some(status) = update.status {
            record.status = status;
            match status {
                SubagentStatus::Running => record.started_at = Some(now_iso()),
                SubagentStatus::Completed | SubagentStatus::Failed | SubagentStatus::Cancelled => {
                    record.finished_at = Some(now_iso())
                }
                SubagentStatus::Pending => {}
            }
        }
        if let Some(loop_id) = update.loop_id {
            record.loop_id = Some(loop_id);
        }
        if let Some(promise_result) = update.promise_result {
            record.promise_result = Some(promise_result);
        }
        if let Some(summary) = update.output_summary {
            record.output_summary = summary;
        }
        if let Some(error) = update.error {
            record.error = Some(error);
        }

        self.touch_and_save()
    }

    pub fn subagent(&self, id: &SubagentId) -> Option<&SubagentRecord> {
        self.state.subagents.get(id)
    }

    pub fn active_subagents(&self) -> Vec<&SubagentRecord> {
        self.state
            .subagents
            .values()
            .filter(|s| s.status == SubagentStatus::Running)
            .collect()
    }

    pub fn completed_subagents(&self) -> Vec<&SubagentRecord> {
        self.state
            .subagents
            .values()
            .filter(|s| s.status == SubagentStatus::Completed)
            .collect()
    }

    // === Findings ===

    /// Append a finding. The body is bounded; the full text also lands in
    /// `findings/<author>.txt` for later reading.
    pub fn add_finding(&mut self, mut finding: Finding) -> Result<(), WorkspaceError> {
        let transcript = self.path.join("findings").join(format!("{}.txt", finding.from_agent));
        let mut file =
            std::fs::OpenOptions::new().create(true).append(true).open(transcript)?;
        writeln!(file, "\n{}", "=".repeat(60))?;
        writeln!(file, "Type: {}", finding.kind)?;
        writeln!(file, "Time: {}", finding.timestamp)?;
        writeln!(file, "Files: {}", finding.files.join(", "))?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "{}", finding.content)?;

        if finding.content.chars().count() > FINDING_CONTENT_LIMIT {
            finding.content =
                finding.content.chars().take(FINDING_CONTENT_LIMIT).collect();
        }
        self.state.findings.push(finding);
        self.touch_and_save()
    }

    /// Findings, optionally filtered by type.
    pub fn findings(&self, kind: Option<SubagentKind>) -> Vec<&Finding> {
        self.state
            .findings
            .iter()
            .filter(|f| kind.map_or(true, |k| f.kind == k))
            .collect()
    }

    pub fn findings_from(&self, agent: &SubagentId) -> Vec<&Finding> {
        self.state.findings.iter().filter(|f| &f.from_agent == agent).collect()
    }

    /// Bounded summary of all findings, for prompt context.
    pub fn findings_summary(&self) -> String {
        if self.state.findings.is_empty() {
            return "No findings yet.".to_string();
        }

        let mut lines = vec!["FINDINGS SUMMARY:".to_string(), "=".repeat(40)];
        for finding in &self.state.findings {
            lines.push(format!("\n[{}] ({}):", finding.from_agent, finding.kind));
            let content: String = finding.content.chars().take(500).collect();
            if finding.content.chars().count() > 500 {
                lines.push(format!("{content}..."));
            } else {
                lines.push(content);
            }
            if !finding.files.is_empty() {
                let files: Vec<_> = finding.files.iter().take(5).cloned().collect();
                lines.push(format!("  Files: {}", files.join(", ")));
            }
        }
        lines.join("\n")
    }

    // === Handoffs ===

    pub fn add_handoff(&mut self, handoff: Handoff) -> Result<(), WorkspaceError> {
        let file = self.path.join("handoffs").join(format!("{}.json", handoff.id));
        std::fs::write(file, serde_json::to_vec_pretty(&handoff)?)?;
        self.state.handoffs.push(handoff);
        self.touch_and_save()
    }

    /// Handoffs addressed to one subagent.
    pub fn handoffs_for(&self, agent: &SubagentId) -> Vec<&Handoff> {
        self.state.handoffs.iter().filter(|h| &h.to_agent == agent).collect()
    }

    /// Flip a handoff's acknowledged flag. One-way.
    pub fn acknowledge_handoff(&mut self, id: &str) -> Result<(), WorkspaceError> {
        if let Some(handoff) = self.state.handoffs.iter_mut().find(|h| h.id == id) {
            handoff.acknowledged = true;
            self.touch_and_save()?;
        }
        Ok(())
    }

    // === Artifacts ===

    pub fn save_artifact(&self, name: &str, content: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let path = self.path.join("artifacts").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn artifact(&self, name: &str) -> Option<Vec<u8>> {
        std::fs::read(self.path.join("artifacts").join(name)).ok()
    }

    pub fn list_artifacts(&self) -> Vec<String> {
        let dir = self.path.join("artifacts");
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // === Iterations ===

    pub fn start_iteration(&mut self) -> Result<u32, WorkspaceError> {
        self.state.iteration += 1;
        self.touch_and_save()?;
        Ok(self.state.iteration)
    }

    pub fn record_subagent_iteration(&mut self) -> Result<(), WorkspaceError> {
        self.state.total_subagent_iterations += 1;
        self.touch_and_save()
    }

    // === Context building ===

    /// Compose the text a subagent should see: unacknowledged handoffs
    /// addressed to it, then the findings summary.
    pub fn build_context_for_subagent(&self, agent: &SubagentId) -> String {
        let mut lines: Vec<String> = Vec::new();

        let pending: Vec<&Handoff> =
            self.handoffs_for(agent).into_iter().filter(|h| !h.acknowledged).collect();
        if !pending.is_empty() {
            lines.push("HANDOFFS TO YOU:".to_string());
            lines.push("=".repeat(40));
            for handoff in pending {
                lines.push(format!("From {}:", handoff.from_agent));
                lines.push(handoff.message.clone());
                if !handoff.context_files.is_empty() {
                    lines.push(format!("Reference files: {}", handoff.context_files.join(", ")));
                }
                lines.push(String::new());
            }
        }

        let summary = self.findings_summary();
        if summary != "No findings yet." {
            lines.push(String::new());
            lines.push(summary);
        }

        if lines.is_empty() {
            String::new()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
