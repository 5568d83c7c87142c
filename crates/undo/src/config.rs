// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Undo daemon configuration.

use crate::UndoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the undo daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    pub watch_paths: Vec<PathBuf>,
    pub debounce_ms: u64,
    /// Files larger than this are recorded without a content backup.
    pub max_file_size: u64,
    pub backup_retention_hours: u64,
    /// Path fragments and basename globs never recorded.
    pub exclude_patterns: Vec<String>,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            watch_paths: vec![PathBuf::from(".")],
            debounce_ms: 500,
            max_file_size: 10 * 1024 * 1024,
            backup_retention_hours: 24 * 7,
            exclude_patterns: [
                ".git",
                "node_modules",
                "__pycache__",
                ".pytest_cache",
                "target",
                "build",
                "dist",
                ".DS_Store",
                ".undo",
                "*.pyc",
                "*.pyo",
                ".env",
                ".venv",
                "venv",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl UndoConfig {
    pub fn config_path() -> PathBuf {
        dl_core::paths::config_dir().join("undo").join("undod.yaml")
    }

    pub fn data_dir() -> PathBuf {
        dl_core::paths::data_dir().join("undo")
    }

    pub fn socket_path() -> PathBuf {
        dl_core::paths::runtime_dir().join("undod.sock")
    }

    /// Load from the user config file; missing file yields defaults.
    pub fn load() -> Result<Self, UndoError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, UndoError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_yaml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => serde_json::from_str(&content).map_err(|json_err| {
                UndoError::Config(format!(
                    "{}: yaml: {yaml_err}; json: {json_err}",
                    path.display()
                ))
            }),
        }
    }

    /// Whether a path is excluded from recording.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

        self.exclude_patterns.iter().any(|pattern| {
            if pattern.contains('*') {
                glob::Pattern::new(pattern).map(|p| p.matches(&name)).unwrap_or(false)
            } else {
                path.components().any(|c| c.as_os_str().to_string_lossy() == *pattern)
                    || path_str.contains(pattern.as_str())
            }
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
