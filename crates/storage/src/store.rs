// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The combined undo store: timeline database + blob store.

use crate::{BackupStore, CheckpointRow, StoreError, TimelineDb};
use dl_core::{now_iso, ChangeKind, EntryId, TimelineEntry};
use std::path::{Path, PathBuf};

/// Files larger than this are recorded without content backup (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// How many recent entries a named checkpoint captures.
const CHECKPOINT_SPAN: usize = 100;

/// Result of a retention prune.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub entries_removed: usize,
    pub blobs_removed: usize,
}

/// Timeline + blob store rooted at one directory.
#[derive(Debug)]
pub struct UndoStore {
    db: TimelineDb,
    backups: BackupStore,
    max_file_size: u64,
}

impl UndoStore {
    /// Open the store under `root`, creating `timeline.db` and `backups/`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|_| StoreError::BadRoot(root.to_path_buf()))?;
        Ok(Self {
            db: TimelineDb::open(&root.join("timeline.db"))?,
            backups: BackupStore::open(root.join("backups"))?,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Record one file change.
    ///
    /// Returns `Ok(None)` when the file could not be inspected (races with
    /// deletion, permissions): the event is dropped, not an error. Database
    /// failures do raise.
    pub fn record_change(
        &self,
        path: &Path,
        kind: ChangeKind,
    ) -> Result<Option<TimelineEntry>, StoreError> {
        let (file_size, readable) = match std::fs::metadata(path) {
            Ok(meta) => (meta.len(), true),
            Err(_) if kind == ChangeKind::Delete => (0, false),
            Err(_) => return Ok(None),
        };

        // Content is backed up for files that still exist and fit the cap;
        // oversized files still get a timeline row, just without a hash.
        let backup_hash = if readable && kind != ChangeKind::Delete && file_size <= self.max_file_size
        {
            self.backups.store_file(path)
        } else {
            None
        };

        let entry = TimelineEntry {
            id: EntryId::generate().to_string(),
            timestamp: now_iso(),
            change_type: kind,
            file_path: path.display().to_string(),
            description: describe(kind),
            backup_hash,
            file_size,
            project_path: path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        };
        self.db.add_entry(&entry)?;
        Ok(Some(entry))
    }

    /// Recent entries, newest first.
    pub fn entries(
        &self,
        limit: usize,
        file: Option<&str>,
    ) -> Result<Vec<TimelineEntry>, StoreError> {
        self.db.entries(limit, file)
    }

    pub fn entry(&self, id: &str) -> Result<Option<TimelineEntry>, StoreError> {
        self.db.entry(id)
    }

    /// Restore one entry's recorded content back to its path.
    pub fn restore_entry(&self, id: &str) -> Result<PathBuf, StoreError> {
        let entry = self.db.entry(id)?.ok_or_else(|| StoreError::EntryNotFound(id.to_string()))?;
        let hash = entry.backup_hash.ok_or_else(|| StoreError::NoBackup(id.to_string()))?;
        let dest = PathBuf::from(&entry.file_path);
        self.backups.restore(&hash, &dest)?;
        Ok(dest)
    }

    /// Restore the most recent `count` non-checkpoint entries that carry
    /// backups. Returns how many files were written back.
    pub fn undo_last(&self, count: usize) -> Result<usize, StoreError> {
        let mut restored = 0;
        for entry in self.db.entries(count, None)? {
            if entry.change_type == ChangeKind::Checkpoint {
                continue;
            }
            if let Some(hash) = &entry.backup_hash {
                let dest = PathBuf::from(&entry.file_path);
                if self.backups.restore(hash, &dest).is_ok() {
                    restored += 1;
                }
            }
        }
        Ok(restored)
    }

    /// Create a named checkpoint capturing the current head of the timeline,
    /// plus a `checkpoint`-type timeline row.
    pub fn add_checkpoint(&self, name: &str, description: &str) -> Result<String, StoreError> {
        let captured: Vec<String> =
            self.db.entries(CHECKPOINT_SPAN, None)?.into_iter().map(|e| e.id).collect();
        let id = BackupStore::content_hash(format!("{name}{}", now_iso()).as_bytes())
            [..12]
            .to_string();

        self.db.add_checkpoint(&CheckpointRow {
            id: id.clone(),
            name: name.to_string(),
            timestamp: now_iso(),
            description: description.to_string(),
            entry_ids: captured,
        })?;

        self.db.add_entry(&TimelineEntry {
            id: id.clone(),
            timestamp: now_iso(),
            change_type: ChangeKind::Checkpoint,
            file_path: String::new(),
            description: format!("Checkpoint: {name}"),
            backup_hash: None,
            file_size: 0,
            project_path: String::new(),
        })?;

        Ok(id)
    }

    pub fn checkpoint(&self, name_or_id: &str) -> Result<Option<CheckpointRow>, StoreError> {
        self.db.checkpoint(name_or_id)
    }

    /// Drop entries older than `retention`, then any blob no surviving row
    /// references. Blob hashes outlive the entries pointing at them until
    /// this runs.
    pub fn prune(&self, retention: chrono::Duration) -> Result<PruneStats, StoreError> {
        let cutoff = (chrono::Utc::now() - retention)
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        let entries_removed = self.db.prune_entries(&cutoff)?;
        let live = self.db.live_hashes()?;
        let blobs_removed = self.backups.retain(&live)?;
        tracing::debug!(entries_removed, blobs_removed, "pruned undo store");
        Ok(PruneStats { entries_removed, blobs_removed })
    }
}

fn describe(kind: ChangeKind) -> String {
    match kind {
        ChangeKind::Edit => "File edited".to_string(),
        ChangeKind::Create => "File created".to_string(),
        ChangeKind::Delete => "File deleted".to_string(),
        ChangeKind::Rename => "File renamed".to_string(),
        ChangeKind::Checkpoint => "Checkpoint".to_string(),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
