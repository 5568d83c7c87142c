// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate checking and the approval flow.

use crate::{Gate, GateAction, GateError, SupervisionConfig};
use dl_core::clock::{now_iso, today_stamp};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

/// Free-form context attached to a gate request. Known keys: `path`,
/// `command`, `description`.
pub type GateContext = serde_json::Map<String, serde_json::Value>;

/// A request to pass through a gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRequest {
    pub gate: Gate,
    pub action: GateAction,
    pub context: GateContext,
    pub timestamp: String,
    /// Which tool is asking.
    pub source: String,
}

/// Who (or what) settled an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approver {
    Auto,
    User,
    Timeout,
    None,
}

/// Result of a gate check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub allowed: bool,
    /// What action was taken.
    pub action: GateAction,
    pub reason: String,
    pub approved_by: Approver,
}

/// Per-run counters checked against the autonomy limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounters {
    pub iterations: u64,
    pub file_changes: u64,
    pub lines_changed: u64,
}

/// Evaluates gate requests against a supervision config and appends every
/// decision to the daily audit log.
pub struct GateChecker {
    config: SupervisionConfig,
    log_dir: PathBuf,
    interactive: bool,
}

impl GateChecker {
    pub fn new(config: SupervisionConfig) -> Self {
        Self {
            config,
            log_dir: dl_core::paths::data_dir().join("gates"),
            interactive: true,
        }
    }

    /// Checker for the config effective in `project_path`.
    pub fn for_project(project_path: &Path) -> Self {
        Self::new(SupervisionConfig::load_project(project_path))
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Non-interactive checkers never prompt; `approve` gates deny.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    /// Check whether an action may proceed. Exactly one audit row is
    /// appended per call.
    pub fn check(&self, gate: Gate, context: GateContext, source: &str) -> GateResult {
        // Sensitive paths route through the sensitive_file gate regardless
        // of the nominal gate.
        let effective_action = match context.get("path").and_then(|v| v.as_str()) {
            Some(path) if self.config.is_sensitive_path(path) => {
                self.config.gate_action(Gate::SensitiveFile)
            }
            _ => self.config.gate_action(gate),
        };

        let request = GateRequest {
            gate,
            action: effective_action,
            context,
            timestamp: now_iso(),
            source: source.to_string(),
        };

        let result = match effective_action {
            GateAction::Allow => GateResult {
                allowed: true,
                action: GateAction::Allow,
                reason: "Gate configured to allow".to_string(),
                approved_by: Approver::Auto,
            },
            GateAction::Notify => {
                notify_user(&request);
                GateResult {
                    allowed: true,
                    action: GateAction::Notify,
                    reason: "User notified, proceeding".to_string(),
                    approved_by: Approver::Auto,
                }
            }
            GateAction::Deny => GateResult {
                allowed: false,
                action: GateAction::Deny,
                reason: "Gate configured to deny".to_string(),
                approved_by: Approver::Auto,
            },
            GateAction::Approve => {
                if self.interactive && std::io::stdin().is_terminal() {
                    let approved = prompt_for_approval(&request);
                    GateResult {
                        allowed: approved,
                        action: GateAction::Approve,
                        reason: if approved { "User approved" } else { "User denied" }.to_string(),
                        approved_by: if approved { Approver::User } else { Approver::None },
                    }
                } else {
                    GateResult {
                        allowed: false,
                        action: GateAction::Approve,
                        reason: "Approval required but running non-interactively".to_string(),
                        approved_by: Approver::None,
                    }
                }
            }
        };

        if let Err(e) = self.log_event(&request, &result) {
            tracing::warn!(error = %e, "failed to append gate audit log");
        }

        result
    }

    fn log_event(&self, request: &GateRequest, result: &GateResult) -> Result<(), GateError> {
        std::fs::create_dir_all(&self.log_dir)?;
        let event = serde_json::json!({
            "timestamp": request.timestamp,
            "gate": request.gate,
            "action": request.action,
            "context": request.context,
            "source": request.source,
            "result": {
                "allowed": result.allowed,
                "action": result.action,
                "reason": result.reason,
                "approved_by": result.approved_by,
            },
        });

        let path = self.log_dir.join(format!("gates-{}.jsonl", today_stamp()));
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{event}")?;
        Ok(())
    }

    /// Audit events from the last `days` daily logs, newest first.
    pub fn history(
        &self,
        gate: Option<Gate>,
        days: u32,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, GateError> {
        let mut events = Vec::new();
        let today = chrono::Local::now().date_naive();

        for offset in 0..days {
            let Some(date) = today.checked_sub_days(chrono::Days::new(offset as u64)) else {
                break;
            };
            let path = self.log_dir.join(format!("gates-{}.jsonl", date.format("%Y-%m-%d")));
            let Ok(file) = std::fs::File::open(&path) else { continue };
            let mut day_events = Vec::new();
            for line in std::io::BufReader::new(file).lines() {
                let Ok(line) = line else { continue };
                let Ok(event) = serde_json::from_str::<serde_json::Value>(&line) else { continue };
                let matches = match gate {
                    Some(g) => event.get("gate").and_then(|v| v.as_str()) == Some(g.as_str()),
                    None => true,
                };
                if matches {
                    day_events.push(event);
                }
            }
            // Lines are appended chronologically; reverse so ties survive
            // the stable sort newest-first.
            day_events.reverse();
            events.extend(day_events);
        }

        events.sort_by(|a, b| {
            let ts = |e: &serde_json::Value| {
                e.get("timestamp").and_then(|v| v.as_str()).unwrap_or("").to_string()
            };
            ts(b).cmp(&ts(a))
        });
        events.truncate(limit);
        Ok(events)
    }
}

/// Stderr notification, non-blocking.
fn notify_user(request: &GateRequest) {
    eprintln!("\x1b[33m[gates]\x1b[0m {}", format_gate_message(request, true));
}

/// Blocking y/N prompt on stderr, answer read from stdin.
fn prompt_for_approval(request: &GateRequest) -> bool {
    eprintln!("\n\x1b[33m[gates]\x1b[0m {}", format_gate_message(request, false));
    eprint!("\x1b[33m[gates]\x1b[0m Allow this action? [y/N] ");
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        eprintln!();
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// One-line human description of a request.
fn format_gate_message(request: &GateRequest, is_notification: bool) -> String {
    let mut parts = vec![format!("Gate: {}", request.gate)];

    if request.source != "unknown" && !request.source.is_empty() {
        parts.push(format!("Source: {}", request.source));
    }

    if let Some(path) = request.context.get("path").and_then(|v| v.as_str()) {
        parts.push(format!("Path: {path}"));
    }
    if let Some(command) = request.context.get("command").and_then(|v| v.as_str()) {
        let shown = if command.chars().count() > 60 {
            format!("{}...", dl_core::id::short(command, 57))
        } else {
            command.to_string()
        };
        parts.push(format!("Command: {shown}"));
    }
    if let Some(description) = request.context.get("description").and_then(|v| v.as_str()) {
        parts.push(format!("Action: {description}"));
    }

    let prefix = if is_notification { "Notification" } else { "Approval required" };
    format!("{prefix} - {}", parts.join(" | "))
}

/// Check per-run counters against the configured caps.
///
/// Returns a deny reason when a cap is exceeded; callers check before
/// continuing, nothing is auto-enforced here.
pub fn check_autonomy_limits(config: &SupervisionConfig, counters: RunCounters) -> Option<String> {
    let limits = &config.autonomy;

    if counters.iterations > limits.max_iterations {
        return Some(format!(
            "Exceeded max iterations ({}/{})",
            counters.iterations, limits.max_iterations
        ));
    }
    if counters.file_changes > limits.max_file_changes {
        return Some(format!(
            "Exceeded max file changes ({}/{})",
            counters.file_changes, limits.max_file_changes
        ));
    }
    if counters.lines_changed > limits.max_lines_changed {
        return Some(format!(
            "Exceeded max lines changed ({}/{})",
            counters.lines_changed, limits.max_lines_changed
        ));
    }
    None
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
