// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watching.
//!
//! `notify` delivers events on its own thread; a bridge forwards them into
//! the daemon's single-threaded runtime over a tokio channel.

use crate::config::UndoConfig;
use crate::UndoError;
use dl_core::ChangeKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One observed, not-yet-debounced change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Map a notify event to the timeline's change kinds. Directory-level and
/// metadata-only events are dropped.
pub fn classify(event: &Event) -> Option<ChangeKind> {
    match &event.kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Remove(_) => Some(ChangeKind::Delete),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Rename),
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeKind::Edit),
        _ => None,
    }
}

/// Start watching the configured paths. Returns the watcher (which must be
/// kept alive) and the channel of raw changes.
pub fn start_watcher(
    config: &UndoConfig,
) -> Result<(notify::RecommendedWatcher, mpsc::Receiver<RawChange>), UndoError> {
    let (tx, rx) = mpsc::channel::<RawChange>(1024);

    let exclude = config.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let Ok(event) = result else { return };
        let Some(kind) = classify(&event) else { return };
        // A rename reports (from, to); the surviving path is the last one.
        let Some(path) = event.paths.last() else { return };
        if path.is_dir() || exclude.is_excluded(path) {
            return;
        }
        // blocking_send: we are on the notify thread, not the runtime.
        let _ = tx.blocking_send(RawChange { path: path.clone(), kind });
    })?;

    for path in &config.watch_paths {
        if path.exists() {
            watcher.watch(path, RecursiveMode::Recursive)?;
            tracing::info!(path = %path.display(), "watching");
        } else {
            tracing::warn!(path = %path.display(), "watch path does not exist, skipping");
        }
    }

    Ok((watcher, rx))
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
