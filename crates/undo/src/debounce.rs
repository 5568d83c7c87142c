// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event debouncing.
//!
//! Rapid saves produce bursts of filesystem events; only the settled state
//! is worth a timeline entry. An event arriving within the window resets
//! the path's timer, so a path flushes once it has been quiet for the full
//! window. Timeline ordering follows debounce completion, not OS event
//! arrival.

use dl_core::ChangeKind;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Coalesces per-path change events.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
}

#[derive(Debug)]
struct Pending {
    kind: ChangeKind,
    last_seen: Instant,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: HashMap::new() }
    }

    /// Record an observation, resetting the path's timer.
    pub fn observe(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        let entry = self.pending.entry(path).or_insert(Pending { kind, last_seen: now });
        entry.last_seen = now;
        // A create followed by edits within the window is still a create;
        // anything followed by a delete is a delete.
        entry.kind = match (entry.kind, kind) {
            (_, ChangeKind::Delete) => ChangeKind::Delete,
            (ChangeKind::Create, ChangeKind::Edit) => ChangeKind::Create,
            (_, new_kind) => new_kind,
        };
    }

    /// Drain every path that has been quiet for the full window.
    pub fn ready(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let window = self.window;
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.last_seen) >= window)
            .map(|(path, _)| path.clone())
            .collect();

        due.into_iter()
            .filter_map(|path| self.pending.remove(&path).map(|p| (path, p.kind)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod tests;
