// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests and responses for the undo daemon.

use dl_core::TimelineEntry;
use serde::{Deserialize, Serialize};

/// Request from a client to the undo daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UndoRequest {
    Status,

    /// Recent timeline rows, newest first.
    Timeline {
        #[serde(default = "default_timeline_limit")]
        limit: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
    },

    /// Restore the last `count` changes that carry backups.
    UndoLast {
        #[serde(default = "default_undo_count")]
        count: usize,
    },

    /// Restore one timeline entry by ID.
    Restore { entry_id: String },

    /// Create a named checkpoint capturing recent entries.
    Checkpoint {
        name: String,
        #[serde(default)]
        description: String,
    },

    /// Stop the daemon.
    Stop,
}

fn default_timeline_limit() -> usize {
    20
}

fn default_undo_count() -> usize {
    1
}

/// Response from the undo daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UndoResponse {
    Error { message: String },
    Status(UndoStats),
    Timeline { entries: Vec<TimelineEntry> },
    Restored { restored: usize, requested: usize },
    RestoredFile { file: String },
    CheckpointCreated { id: String },
    ShuttingDown,
}

/// Daemon status counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UndoStats {
    pub running: bool,
    pub watch_paths: Vec<String>,
    pub changes_recorded: u64,
    pub files_backed_up: u64,
    /// Read failures swallowed while recording (observability, not correctness).
    pub backup_errors: u64,
    pub started_at: String,
}

#[cfg(test)]
#[path = "undo_tests.rs"]
mod tests;
