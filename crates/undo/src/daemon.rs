// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The undo daemon proper: debounce loop, socket server, lifecycle.

use crate::config::UndoConfig;
use crate::debounce::Debouncer;
use crate::watcher::{start_watcher, RawChange};
use crate::UndoError;
use dl_core::now_iso;
use dl_storage::UndoStore;
use dl_wire::{UndoRequest, UndoResponse, UndoStats};
use fs2::FileExt;
use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

const DEBOUNCE_TICK: Duration = Duration::from_millis(100);
const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
struct Stats {
    changes_recorded: u64,
    files_backed_up: u64,
    backup_errors: u64,
}

/// Shared daemon state.
pub struct UndoDaemon {
    config: UndoConfig,
    store: Mutex<UndoStore>,
    stats: Mutex<Stats>,
    started_at: String,
    shutdown: Notify,
}

impl UndoDaemon {
    pub fn new(config: UndoConfig, store: UndoStore) -> Self {
        let store = store.with_max_file_size(config.max_file_size);
        Self {
            config,
            store: Mutex::new(store),
            stats: Mutex::new(Stats::default()),
            started_at: now_iso(),
            shutdown: Notify::new(),
        }
    }

    /// Record one debounced change. Read failures are swallowed with a
    /// count bump and a stderr warning: observability must not block edits.
    fn record(&self, change: &RawChange) {
        match self.store.lock().record_change(&change.path, change.kind) {
            Ok(Some(entry)) => {
                let mut stats = self.stats.lock();
                stats.changes_recorded += 1;
                if entry.backup_hash.is_some() {
                    stats.files_backed_up += 1;
                }
            }
            Ok(None) => {
                // Unreadable file; the event is dropped silently.
            }
            Err(e) => {
                self.stats.lock().backup_errors += 1;
                eprintln!("undod: failed to record {}: {e}", change.path.display());
                warn!(path = %change.path.display(), error = %e, "record failed");
            }
        }
    }

    fn handle_request(&self, request: UndoRequest) -> UndoResponse {
        match request {
            UndoRequest::Status => {
                let stats = self.stats.lock();
                UndoResponse::Status(UndoStats {
                    running: true,
                    watch_paths: self
                        .config
                        .watch_paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect(),
                    changes_recorded: stats.changes_recorded,
                    files_backed_up: stats.files_backed_up,
                    backup_errors: stats.backup_errors,
                    started_at: self.started_at.clone(),
                })
            }

            UndoRequest::Timeline { limit, file } => {
                match self.store.lock().entries(limit, file.as_deref()) {
                    Ok(entries) => UndoResponse::Timeline { entries },
                    Err(e) => error_response(e),
                }
            }

            UndoRequest::UndoLast { count } => match self.store.lock().undo_last(count) {
                Ok(restored) => UndoResponse::Restored { restored, requested: count },
                Err(e) => error_response(e),
            },

            UndoRequest::Restore { entry_id } => {
                match self.store.lock().restore_entry(&entry_id) {
                    Ok(path) => UndoResponse::RestoredFile { file: path.display().to_string() },
                    Err(e) => error_response(e),
                }
            }

            UndoRequest::Checkpoint { name, description } => {
                match self.store.lock().add_checkpoint(&name, &description) {
                    Ok(id) => UndoResponse::CheckpointCreated { id },
                    Err(e) => error_response(e),
                }
            }

            UndoRequest::Stop => {
                info!("stop requested over socket");
                self.shutdown.notify_one();
                UndoResponse::ShuttingDown
            }
        }
    }
}

fn error_response(e: dl_storage::StoreError) -> UndoResponse {
    UndoResponse::Error { message: e.to_string() }
}

struct PidLock {
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    file: std::fs::File,
    path: PathBuf,
}

impl PidLock {
    fn acquire(path: &PathBuf) -> Result<Self, UndoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file =
            std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|_| UndoError::AlreadyRunning(path.clone()))?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { file, path: path.clone() })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Run the undo daemon to completion.
pub async fn run_daemon(config: UndoConfig) -> Result<(), UndoError> {
    let data_dir = UndoConfig::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let _pid_lock = PidLock::acquire(&data_dir.join("daemon.pid"))?;

    let store = UndoStore::open(&data_dir)?;
    let daemon = Arc::new(UndoDaemon::new(config.clone(), store));

    // Session marker so "what changed since I sat down" has an anchor.
    if let Err(e) = daemon.store.lock().add_checkpoint("session-start", "Watch session started") {
        warn!(error = %e, "failed to create session checkpoint");
    }

    // The watcher must outlive the daemon loop.
    let (_watcher, raw_rx) = start_watcher(&config)?;

    let socket_path = UndoConfig::socket_path();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path.display(), "undo daemon started");

    let debounce_task = tokio::spawn(debounce_loop(Arc::clone(&daemon), raw_rx));

    let prune_daemon = Arc::clone(&daemon);
    let retention = chrono::Duration::hours(config.backup_retention_hours as i64);
    let prune_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match prune_daemon.store.lock().prune(retention) {
                Ok(stats) if stats.entries_removed > 0 || stats.blobs_removed > 0 => {
                    info!(
                        entries = stats.entries_removed,
                        blobs = stats.blobs_removed,
                        "retention prune"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "retention prune failed"),
            }
        }
    });

    let accept_daemon = Arc::clone(&daemon);
    let accept_task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let daemon = Arc::clone(&accept_daemon);
                    tokio::spawn(async move {
                        handle_connection(stream, &daemon).await;
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            }
        }
    });

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = daemon.shutdown.notified() => info!("shutdown requested"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    accept_task.abort();
    debounce_task.abort();
    prune_task.abort();

    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }
    info!("undo daemon stopped");
    Ok(())
}

/// Drain raw changes through the debouncer into the store.
async fn debounce_loop(daemon: Arc<UndoDaemon>, mut raw_rx: mpsc::Receiver<RawChange>) {
    let mut debouncer = Debouncer::new(Duration::from_millis(daemon.config.debounce_ms));
    let mut ticker = tokio::time::interval(DEBOUNCE_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            raw = raw_rx.recv() => {
                match raw {
                    Some(change) => {
                        debouncer.observe(change.path, change.kind, Instant::now());
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                for (path, kind) in debouncer.ready(Instant::now()) {
                    daemon.record(&RawChange { path, kind });
                }
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, daemon: &UndoDaemon) {
    let request: UndoRequest = match dl_wire::read_json(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            let response = UndoResponse::Error { message: format!("invalid request: {e}") };
            let _ = dl_wire::write_json(&mut stream, &response).await;
            return;
        }
    };

    debug!(request = ?request, "received request");
    let response = daemon.handle_request(request);
    if let Err(e) = dl_wire::write_json(&mut stream, &response).await {
        debug!(error = %e, "failed to write response");
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
