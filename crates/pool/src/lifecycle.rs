// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: PID file, socket, background tasks, shutdown.

use crate::config::PoolConfig;
use crate::listener::{run_listener, ListenCtx};
use crate::profile::{HealthPolicy, PoolProfile};
use crate::supervisor::{Supervisor, HEALTH_CHECK_INTERVAL, IDLE_SWEEP_INTERVAL};
use crate::PoolError;
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Everything the daemon writes on disk.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
}

impl DaemonPaths {
    pub fn for_profile(profile: &PoolProfile) -> Self {
        let data_dir = profile.data_dir();
        Self {
            socket_path: profile.socket_path(),
            pid_path: data_dir.join("daemon.pid"),
            log_path: data_dir.join("daemon.log"),
            data_dir,
        }
    }
}

/// Holds the PID-file lock for the daemon's lifetime.
struct PidLock {
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Take the lock, tolerating a stale PID file from a dead process (the
    /// flock dies with its owner).
    fn acquire(path: &PathBuf) -> Result<Self, PoolError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file =
            std::fs::OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        file.try_lock_exclusive().map_err(|_| PoolError::AlreadyRunning(path.clone()))?;
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

/// Run a pool daemon to completion.
///
/// Binds the socket, spawns the health/idle tasks, optionally warms
/// configured servers, then serves until a `stop` request or SIGTERM.
pub async fn run_daemon(profile: PoolProfile) -> Result<(), PoolError> {
    let paths = DaemonPaths::for_profile(&profile);
    std::fs::create_dir_all(&paths.data_dir)?;

    let _pid_lock = PidLock::acquire(&paths.pid_path)?;

    // A stale socket from a crashed daemon would block the bind.
    if paths.socket_path.exists() {
        let _ = std::fs::remove_file(&paths.socket_path);
    }
    if let Some(parent) = paths.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&paths.socket_path)?;

    let config = PoolConfig::load(&profile.config_path())?;
    let supervisor = Arc::new(Supervisor::new(profile.clone(), config));
    let shutdown = Arc::new(Notify::new());

    info!(profile = profile.name, socket = %paths.socket_path.display(), "daemon starting");

    // Warm-up before serving, so `status` right after start is honest.
    let warmup = supervisor.warmup_names();
    if !warmup.is_empty() {
        let results = supervisor.warm(&warmup).await;
        for (name, ok) in results {
            if !ok {
                warn!(server = %name, "warmup failed");
            }
        }
    }

    // Background supervision tasks.
    let health_supervisor = Arc::clone(&supervisor);
    let health_interval = match profile.health {
        HealthPolicy::Probe => HEALTH_CHECK_INTERVAL,
        HealthPolicy::LivenessAndIdle => IDLE_SWEEP_INTERVAL,
    };
    let health_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(health_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // immediate first tick is a no-op
        loop {
            ticker.tick().await;
            health_supervisor.health_sweep().await;
        }
    });

    let idle_supervisor = Arc::clone(&supervisor);
    let idle_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            idle_supervisor.idle_sweep().await;
        }
    });

    let ctx = Arc::new(ListenCtx {
        supervisor: Arc::clone(&supervisor),
        shutdown: Arc::clone(&shutdown),
    });
    let listener_task = tokio::spawn(run_listener(listener, ctx));

    // Serve until asked to stop.
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    listener_task.abort();
    health_task.abort();
    idle_task.abort();

    supervisor.stop_all().await;

    if paths.socket_path.exists() {
        let _ = std::fs::remove_file(&paths.socket_path);
    }

    info!("daemon stopped");
    Ok(())
}

/// Install the daemon's tracing subscriber: env-filtered, appending to the
/// daemon log file.
pub fn init_logging(paths: &DaemonPaths) {
    let Some(dir) = paths.log_path.parent() else { return };
    let Some(file_name) = paths.log_path.file_name() else { return };
    let _ = std::fs::create_dir_all(dir);

    let appender = tracing_appender::rolling::never(dir, file_name);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(appender)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
