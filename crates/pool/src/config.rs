// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: YAML with a JSON fallback parse.

use crate::PoolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One configured child server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    /// Argv vector; the first element is the program.
    pub command: Vec<String>,

    /// Extra environment merged over the daemon's.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// File extensions this server handles (language pool only).
    #[serde(default)]
    pub extensions: Vec<String>,

    #[serde(default = "default_memory_estimate")]
    pub memory_estimate_mb: u64,

    #[serde(default)]
    pub requires_auth: bool,

    /// Environment variables that must be present when `requires_auth`.
    #[serde(default)]
    pub auth_env_vars: Vec<String>,
}

fn default_memory_estimate() -> u64 {
    300
}

/// Pool daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_servers: usize,
    pub memory_limit_mb: u64,
    pub idle_timeout_minutes: u64,
    /// Warm every configured server at daemon start.
    pub warmup_on_start: bool,
    pub request_timeout_secs: u64,
    pub servers: BTreeMap<String, ServerSpec>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_servers: 10,
            memory_limit_mb: 2048,
            idle_timeout_minutes: 30,
            warmup_on_start: false,
            request_timeout_secs: 30,
            servers: BTreeMap::new(),
        }
    }
}

impl PoolConfig {
    /// Load from a config file. A missing file yields defaults; an
    /// unparseable one is an error (both YAML and JSON rejected it).
    pub fn load(path: &Path) -> Result<Self, PoolError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_yaml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => serde_json::from_str(&content).map_err(|json_err| {
                PoolError::Config(format!(
                    "{}: yaml: {yaml_err}; json: {json_err}",
                    path.display()
                ))
            }),
        }
    }

    pub fn server(&self, name: &str) -> Option<&ServerSpec> {
        self.servers.get(name)
    }

    /// Language name for a file extension (language pool).
    pub fn language_for_extension(&self, extension: &str) -> Option<&str> {
        self.servers
            .iter()
            .find(|(_, spec)| spec.extensions.iter().any(|e| e == extension))
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
