// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite timeline: `entries` and `checkpoints` tables.

use crate::StoreError;
use dl_core::{ChangeKind, TimelineEntry};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// A row in the `checkpoints` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRow {
    pub id: String,
    pub name: String,
    pub timestamp: String,
    pub description: String,
    /// Timeline entry IDs captured at creation, stored as a JSON array.
    pub entry_ids: Vec<String>,
}

/// The timeline database.
#[derive(Debug)]
pub struct TimelineDb {
    conn: Connection,
}

impl TimelineDb {
    /// Open (creating tables if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                change_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                description TEXT,
                backup_hash TEXT,
                file_size INTEGER,
                project_path TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_timestamp ON entries(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_file_path ON entries(file_path);
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                description TEXT,
                entry_ids TEXT
            );",
        )?;
        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                change_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                description TEXT,
                backup_hash TEXT,
                file_size INTEGER,
                project_path TEXT
            );
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                description TEXT,
                entry_ids TEXT
            );",
        )?;
        Ok(db)
    }

    /// Append an entry. The timeline is append-only; IDs never collide in
    /// practice, but `INSERT OR REPLACE` keeps re-recording idempotent.
    pub fn add_entry(&self, entry: &TimelineEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO entries
             (id, timestamp, change_type, file_path, description, backup_hash, file_size, project_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.timestamp,
                entry.change_type.as_str(),
                entry.file_path,
                entry.description,
                entry.backup_hash,
                entry.file_size,
                entry.project_path,
            ],
        )?;
        Ok(())
    }

    /// Recent entries, newest first, optionally filtered to one file path.
    pub fn entries(
        &self,
        limit: usize,
        file_path: Option<&str>,
    ) -> Result<Vec<TimelineEntry>, StoreError> {
        let mut rows = Vec::new();
        match file_path {
            Some(file) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, timestamp, change_type, file_path, description,
                            backup_hash, file_size, project_path
                     FROM entries WHERE file_path = ?1
                     ORDER BY timestamp DESC LIMIT ?2",
                )?;
                let mapped = stmt.query_map(params![file, limit as i64], row_to_entry)?;
                for entry in mapped {
                    rows.push(entry?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, timestamp, change_type, file_path, description,
                            backup_hash, file_size, project_path
                     FROM entries ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let mapped = stmt.query_map(params![limit as i64], row_to_entry)?;
                for entry in mapped {
                    rows.push(entry?);
                }
            }
        }
        Ok(rows)
    }

    /// Look up one entry by ID.
    pub fn entry(&self, id: &str) -> Result<Option<TimelineEntry>, StoreError> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, timestamp, change_type, file_path, description,
                        backup_hash, file_size, project_path
                 FROM entries WHERE id = ?1",
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Insert a checkpoint row.
    pub fn add_checkpoint(&self, row: &CheckpointRow) -> Result<(), StoreError> {
        let entry_ids =
            serde_json::to_string(&row.entry_ids).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            "INSERT INTO checkpoints (id, name, timestamp, description, entry_ids)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![row.id, row.name, row.timestamp, row.description, entry_ids],
        )?;
        Ok(())
    }

    /// Look up a checkpoint by name or ID; newest wins on name collisions.
    pub fn checkpoint(&self, name_or_id: &str) -> Result<Option<CheckpointRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, timestamp, description, entry_ids FROM checkpoints
                 WHERE id = ?1 OR name = ?1
                 ORDER BY timestamp DESC LIMIT 1",
                params![name_or_id],
                |row| {
                    let entry_ids: String = row.get(4)?;
                    Ok(CheckpointRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        timestamp: row.get(2)?,
                        description: row.get(3)?,
                        entry_ids: serde_json::from_str(&entry_ids).unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Delete entries older than `cutoff` (ISO timestamp). Returns how many
    /// rows were removed. Checkpoint rows are kept.
    pub fn prune_entries(&self, cutoff: &str) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM entries WHERE timestamp < ?1 AND change_type != 'checkpoint'",
            params![cutoff],
        )?;
        Ok(removed)
    }

    /// All backup hashes still referenced by timeline rows.
    pub fn live_hashes(&self) -> Result<std::collections::HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT backup_hash FROM entries WHERE backup_hash IS NOT NULL")?;
        let mapped = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut live = std::collections::HashSet::new();
        for hash in mapped {
            live.insert(hash?);
        }
        Ok(live)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimelineEntry> {
    let kind: String = row.get(2)?;
    Ok(TimelineEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        // Rows are only ever written by this crate; an unknown kind would
        // mean a downgrade, treat it as a plain edit.
        change_type: kind.parse::<ChangeKind>().unwrap_or(ChangeKind::Edit),
        file_path: row.get(3)?,
        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        backup_hash: row.get(5)?,
        file_size: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as u64,
        project_path: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
