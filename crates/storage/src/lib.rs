// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup store: content-addressed blobs plus an append-only SQLite
//! timeline of file changes, with named checkpoints and retention pruning.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/timeline.db      entries + checkpoints tables
//! <root>/backups/<hash>   raw bytes, named by 16-char SHA-256 prefix
//! ```

mod backups;
mod store;
mod timeline;

pub use backups::BackupStore;
pub use store::{PruneStats, UndoStore, DEFAULT_MAX_FILE_SIZE};
pub use timeline::{CheckpointRow, TimelineDb};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the backup store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeline entry not found: {0}")]
    EntryNotFound(String),

    #[error("entry {0} has no backup")]
    NoBackup(String),

    #[error("backup blob missing from store: {0}")]
    MissingBlob(String),

    #[error("could not create store directory {0}")]
    BadRoot(PathBuf),
}
