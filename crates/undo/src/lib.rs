// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The undo daemon: watches for file changes, records debounced backups
//! into the undo store, and serves the undo timeline over a Unix socket.
//!
//! "Every change is cheap to undo."

pub mod config;
pub mod daemon;
pub mod debounce;
pub mod watcher;

pub use config::UndoConfig;
pub use daemon::{run_daemon, UndoDaemon};
pub use debounce::Debouncer;

use thiserror::Error;

/// Errors from the undo daemon.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("store error: {0}")]
    Store(#[from] dl_storage::StoreError),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("daemon already running (pid file locked at {0})")]
    AlreadyRunning(std::path::PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
