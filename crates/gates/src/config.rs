// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervision configuration: levels, gates, actions, autonomy limits.

use crate::GateError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supervision levels, most to least autonomous. The numeric index grows as
/// the posture tightens, which is what "stricter" means for overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionLevel {
    /// AI runs freely, only catastrophic actions gated.
    Autonomous,
    /// AI runs, human gets notifications, can intervene.
    Supervised,
    /// AI proposes, human approves major actions.
    Collaborative,
    /// Human drives, AI suggests and helps.
    Assisted,
    /// AI only responds to direct commands.
    Manual,
}

impl SupervisionLevel {
    pub const ALL: [SupervisionLevel; 5] = [
        SupervisionLevel::Autonomous,
        SupervisionLevel::Supervised,
        SupervisionLevel::Collaborative,
        SupervisionLevel::Assisted,
        SupervisionLevel::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisionLevel::Autonomous => "autonomous",
            SupervisionLevel::Supervised => "supervised",
            SupervisionLevel::Collaborative => "collaborative",
            SupervisionLevel::Assisted => "assisted",
            SupervisionLevel::Manual => "manual",
        }
    }

    /// Position in the autonomy ordering; higher is stricter.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for SupervisionLevel {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| GateError::UnknownLevel(s.to_string()))
    }
}

impl std::fmt::Display for SupervisionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fixed set of decision points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    FileDelete,
    FileCreate,
    FileModify,
    GitCommit,
    GitPush,
    GitForcePush,
    LoopStart,
    AgentSpawn,
    ShellCommand,
    SensitiveFile,
}

impl Gate {
    pub const ALL: [Gate; 10] = [
        Gate::FileDelete,
        Gate::FileCreate,
        Gate::FileModify,
        Gate::GitCommit,
        Gate::GitPush,
        Gate::GitForcePush,
        Gate::LoopStart,
        Gate::AgentSpawn,
        Gate::ShellCommand,
        Gate::SensitiveFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::FileDelete => "file_delete",
            Gate::FileCreate => "file_create",
            Gate::FileModify => "file_modify",
            Gate::GitCommit => "git_commit",
            Gate::GitPush => "git_push",
            Gate::GitForcePush => "git_force_push",
            Gate::LoopStart => "loop_start",
            Gate::AgentSpawn => "agent_spawn",
            Gate::ShellCommand => "shell_command",
            Gate::SensitiveFile => "sensitive_file",
        }
    }
}

impl FromStr for Gate {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| GateError::UnknownGate(s.to_string()))
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a gate does when consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    /// Proceed without asking.
    Allow,
    /// Notify but don't block.
    Notify,
    /// Require explicit approval.
    Approve,
    /// Always deny.
    Deny,
}

impl GateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateAction::Allow => "allow",
            GateAction::Notify => "notify",
            GateAction::Approve => "approve",
            GateAction::Deny => "deny",
        }
    }
}

impl FromStr for GateAction {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(GateAction::Allow),
            "notify" => Ok(GateAction::Notify),
            "approve" => Ok(GateAction::Approve),
            "deny" => Ok(GateAction::Deny),
            other => Err(GateError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for GateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default gate action for a supervision level.
pub fn default_action(level: SupervisionLevel, gate: Gate) -> GateAction {
    use Gate::*;
    use GateAction::*;
    use SupervisionLevel::*;

    match level {
        Autonomous => match gate {
            FileDelete | GitPush => Notify,
            GitForcePush | SensitiveFile => Approve,
            _ => Allow,
        },
        Supervised => match gate {
            FileDelete | GitPush | SensitiveFile => Approve,
            GitForcePush => Deny,
            _ => Notify,
        },
        Collaborative => match gate {
            FileModify => Notify,
            GitForcePush => Deny,
            _ => Approve,
        },
        // Assisted and manual approve everything except force-push,
        // which stays denied.
        Assisted | Manual => match gate {
            GitForcePush => Deny,
            _ => Approve,
        },
    }
}

/// Caps on unattended work, checked by the autonomy sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyLimits {
    pub max_iterations: u64,
    pub max_file_changes: u64,
    pub max_lines_changed: u64,
    pub sensitive_paths: Vec<String>,
}

impl Default for AutonomyLimits {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_file_changes: 100,
            max_lines_changed: 1000,
            sensitive_paths: vec![
                "*.env".to_string(),
                "*.env.*".to_string(),
                ".env*".to_string(),
                "**/secrets/**".to_string(),
                "**/credentials/**".to_string(),
                "**/.ssh/**".to_string(),
                "**/id_rsa*".to_string(),
                "**/*.pem".to_string(),
                "**/*.key".to_string(),
            ],
        }
    }
}

/// The effective supervision posture.
///
/// `gates` holds only explicitly configured actions; anything unset falls
/// back to the level defaults. `overrides` come from the project-local file
/// and win over both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    pub level: SupervisionLevel,
    pub gates: BTreeMap<Gate, GateAction>,
    pub autonomy: AutonomyLimits,
    pub overrides: BTreeMap<Gate, GateAction>,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            level: SupervisionLevel::Supervised,
            gates: BTreeMap::new(),
            autonomy: AutonomyLimits::default(),
            overrides: BTreeMap::new(),
        }
    }
}

impl SupervisionConfig {
    pub fn for_level(level: SupervisionLevel) -> Self {
        Self { level, ..Self::default() }
    }

    /// The action a gate resolves to: override, then explicit config, then
    /// the level default.
    pub fn gate_action(&self, gate: Gate) -> GateAction {
        if let Some(action) = self.overrides.get(&gate) {
            return *action;
        }
        if let Some(action) = self.gates.get(&gate) {
            return *action;
        }
        default_action(self.level, gate)
    }

    /// True when `path` matches any configured sensitive glob, on the full
    /// path or on the file name alone.
    pub fn is_sensitive_path(&self, path: &str) -> bool {
        let name = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
        self.autonomy.sensitive_paths.iter().any(|raw| match glob::Pattern::new(raw) {
            Ok(pattern) => pattern.matches(path) || pattern.matches(name),
            Err(_) => false,
        })
    }

    /// Path of the user-global config file.
    pub fn user_config_path() -> PathBuf {
        dl_core::paths::config_dir().join("supervision.yaml")
    }

    /// Load the user-global config; missing or unparseable files fall back
    /// to defaults.
    pub fn load_user() -> Self {
        Self::load_from(&Self::user_config_path()).unwrap_or_default()
    }

    /// Parse a config file: YAML first, JSON as fallback.
    pub fn load_from(path: &Path) -> Result<Self, GateError> {
        let content = std::fs::read_to_string(path)?;
        parse_config(&content).map_err(|reason| GateError::BadConfig {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Persist to the user-global config file as YAML.
    pub fn save_user(&self) -> Result<(), GateError> {
        self.save_to(&Self::user_config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), GateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self).map_err(|e| GateError::BadConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply a project-local override file (`.daedalos/supervision.yaml` or
    /// `.json` under `project_path`).
    ///
    /// The project may set per-gate overrides and may raise the level, never
    /// lower it: the effective level index only grows.
    pub fn apply_project(&mut self, project_path: &Path) {
        let dir = project_path.join(".daedalos");
        let candidate = ["supervision.yaml", "supervision.json"]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists());
        let Some(path) = candidate else { return };

        let Ok(content) = std::fs::read_to_string(&path) else { return };
        let Ok(project) = parse_config(&content) else {
            tracing::warn!(path = %path.display(), "ignoring unparseable project supervision config");
            return;
        };

        // Project gate settings land in overrides so they win over the
        // user's explicit gates.
        for (gate, action) in project.gates {
            self.overrides.insert(gate, action);
        }
        for (gate, action) in project.overrides {
            self.overrides.insert(gate, action);
        }

        if project.level.index() > self.level.index() {
            self.level = project.level;
        }
    }

    /// User config plus project overrides for the given directory.
    pub fn load_project(project_path: &Path) -> Self {
        let mut config = Self::load_user();
        config.apply_project(project_path);
        config
    }
}

fn parse_config(content: &str) -> Result<SupervisionConfig, String> {
    match serde_yaml::from_str(content) {
        Ok(config) => Ok(config),
        Err(yaml_err) => serde_json::from_str(content)
            .map_err(|json_err| format!("yaml: {yaml_err}; json: {json_err}")),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
