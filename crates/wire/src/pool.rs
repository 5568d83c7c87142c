// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests and responses for the process-pool daemons (tool hub and
//! language-server pool). Both daemons accept the same request set; the
//! pool profile additionally serves `query`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Request from a client to a pool daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolRequest {
    /// Daemon and per-server status.
    Status,

    /// All tools advertised by running servers.
    ListTools,

    /// All resources advertised by running servers.
    ListResources,

    /// Invoke a tool, optionally pinned to a named server.
    CallTool {
        tool: String,
        #[serde(default)]
        arguments: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<String>,
    },

    /// Start a configured server.
    StartServer { server: String },

    /// Stop a running server.
    StopServer { server: String },

    /// Stop and start a server, resetting its restart counter.
    RestartServer { server: String },

    /// Pre-start servers. For the language pool a name is
    /// `language` or `language:project-root`.
    Warm { servers: Vec<String> },

    /// Recent stderr lines captured from a server.
    Logs {
        server: String,
        #[serde(default = "default_log_lines")]
        lines: usize,
    },

    /// Language-server query (pool profile only).
    Query { command: QueryCommand, file: PathBuf, line: u32, col: u32 },

    /// Re-read the config file.
    Reload,

    /// Stop the daemon.
    Stop,
}

fn default_log_lines() -> usize {
    50
}

/// Language-server query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryCommand {
    Hover,
    Definition,
    References,
    Completion,
}

impl QueryCommand {
    /// The `textDocument/*` method this query maps to.
    pub fn method(&self) -> &'static str {
        match self {
            QueryCommand::Hover => "textDocument/hover",
            QueryCommand::Definition => "textDocument/definition",
            QueryCommand::References => "textDocument/references",
            QueryCommand::Completion => "textDocument/completion",
        }
    }
}

/// Response from a pool daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolResponse {
    Ok,
    Error { message: String },
    Status(PoolStatus),
    Tools { tools: Vec<ToolEntry> },
    Resources { resources: Vec<ResourceEntry> },
    ToolResult { result: serde_json::Value },
    QueryResult { result: serde_json::Value },
    Warmed { results: BTreeMap<String, bool> },
    Logs { lines: Vec<String> },
    ShuttingDown,
}

/// Daemon status summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolStatus {
    pub profile: String,
    pub servers: Vec<ServerEntry>,
    pub max_servers: usize,
    pub memory_limit_mb: u64,
}

/// Per-server status row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEntry {
    pub name: String,
    pub status: String,
    pub pid: Option<u32>,
    pub uptime_seconds: u64,
    pub idle_seconds: u64,
    pub memory_mb: u64,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
    pub health_failures: u32,
    pub restart_count: u32,
}

/// A tool advertised by a running server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolEntry {
    pub server: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A resource advertised by a running server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceEntry {
    pub server: String,
    pub uri: String,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
