// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeline record types shared by the backup store, the undo daemon, and
//! the wire protocol.

use serde::{Deserialize, Serialize};

/// What kind of filesystem change a timeline entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Edit,
    Create,
    Delete,
    Rename,
    /// Named marker row; carries no file content.
    Checkpoint,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Edit => "edit",
            ChangeKind::Create => "create",
            ChangeKind::Delete => "delete",
            ChangeKind::Rename => "rename",
            ChangeKind::Checkpoint => "checkpoint",
        }
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(ChangeKind::Edit),
            "create" => Ok(ChangeKind::Create),
            "delete" => Ok(ChangeKind::Delete),
            "rename" => Ok(ChangeKind::Rename),
            "checkpoint" => Ok(ChangeKind::Checkpoint),
            other => Err(format!("unknown change kind: {other}")),
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single row in the undo timeline. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    /// ISO-8601 timestamp; rows sort by this, descending.
    pub timestamp: String,
    pub change_type: ChangeKind,
    /// Absolute path of the changed file; empty for checkpoint rows.
    pub file_path: String,
    pub description: String,
    /// 16-char SHA-256 prefix into the backup store, when content was saved.
    pub backup_hash: Option<String>,
    pub file_size: u64,
    pub project_path: String,
}
