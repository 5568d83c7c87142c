// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-child state and IO plumbing.
//!
//! Each child gets three tasks: a stdin writer fed by an mpsc channel (so
//! writes are serialised), a stdout reader that demultiplexes responses by
//! JSON-RPC id into parked oneshot slots, and a stderr collector feeding a
//! bounded ring. The supervisor owns the handle map; these tasks touch only
//! the in-flight request map, counters, and the ring.

use crate::config::ServerSpec;
use crate::transport::{rpc_notification, rpc_request, Framing};
use crate::PoolError;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Lines of stderr kept per server.
const STDERR_RING_CAPACITY: usize = 100;

/// Grace period at each step of the stop escalation.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a child server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Error,
    Unhealthy,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Error => "error",
            ServerStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Mutable per-server state behind one lock. Never held across an await.
#[derive(Debug)]
pub struct ServerShared {
    pub status: ServerStatus,
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<Value>>,
    stderr_ring: VecDeque<String>,
    pub tools: Vec<Value>,
    pub resources: Vec<Value>,
    pub prompts: Vec<Value>,
    pub last_query: Instant,
    pub last_health_check: Option<Instant>,
    pub health_failures: u32,
    pub restart_count: u32,
    pub memory_mb: u64,
    /// Files already sent in a `textDocument/didOpen` (language pool).
    pub opened_files: HashSet<String>,
}

impl ServerShared {
    fn new(memory_estimate_mb: u64) -> Self {
        Self {
            status: ServerStatus::Starting,
            next_id: 0,
            pending: HashMap::new(),
            stderr_ring: VecDeque::with_capacity(STDERR_RING_CAPACITY),
            tools: Vec::new(),
            resources: Vec::new(),
            prompts: Vec::new(),
            last_query: Instant::now(),
            last_health_check: None,
            health_failures: 0,
            restart_count: 0,
            memory_mb: memory_estimate_mb,
            opened_files: HashSet::new(),
        }
    }

    fn push_log(&mut self, line: String) {
        if self.stderr_ring.len() == STDERR_RING_CAPACITY {
            self.stderr_ring.pop_front();
        }
        self.stderr_ring.push_back(line);
    }

    pub fn recent_logs(&self, lines: usize) -> Vec<String> {
        let skip = self.stderr_ring.len().saturating_sub(lines);
        self.stderr_ring.iter().skip(skip).cloned().collect()
    }
}

/// A supervised child server.
#[derive(Debug)]
pub struct ServerHandle {
    pub name: String,
    pub spec: ServerSpec,
    pub framing: Framing,
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub shared: Mutex<ServerShared>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
    child: tokio::sync::Mutex<Option<Child>>,
    io_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ServerHandle {
    /// Fork the child with piped stdio and start its IO tasks. The protocol
    /// handshake is the supervisor's job; on return the server is
    /// `starting`.
    pub fn spawn(
        name: &str,
        spec: &ServerSpec,
        framing: Framing,
        cwd: Option<&std::path::Path>,
    ) -> Result<Arc<Self>, PoolError> {
        let Some((program, args)) = spec.command.split_first() else {
            return Err(PoolError::ChildNotStarted(
                name.to_string(),
                "empty command".to_string(),
            ));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Backstop: if the daemon drops the handle without the stop
            // path, the runtime still reaps the child.
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| PoolError::ChildNotStarted(name.to_string(), e.to_string()))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(64);

        let handle = Arc::new(Self {
            name: name.to_string(),
            spec: spec.clone(),
            framing,
            pid,
            started_at: Instant::now(),
            shared: Mutex::new(ServerShared::new(spec.memory_estimate_mb)),
            stdin_tx,
            child: tokio::sync::Mutex::new(Some(child)),
            io_tasks: Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();
        if let Some(stdin) = stdin {
            tasks.push(tokio::spawn(writer_task(stdin, stdin_rx)));
        }
        if let Some(stdout) = stdout {
            tasks.push(tokio::spawn(reader_task(Arc::clone(&handle), stdout)));
        }
        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(stderr_task(Arc::clone(&handle), stderr)));
        }
        *handle.io_tasks.lock() = tasks;

        Ok(handle)
    }

    pub fn status(&self) -> ServerStatus {
        self.shared.lock().status
    }

    pub fn set_status(&self, status: ServerStatus) {
        self.shared.lock().status = status;
    }

    pub fn touch(&self) {
        self.shared.lock().last_query = Instant::now();
    }

    /// Send a request and park until the matching response arrives or the
    /// deadline passes. A timed-out slot is released; a late response is
    /// discarded by the reader.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, PoolError> {
        let (id, rx) = {
            let mut shared = self.shared.lock();
            shared.next_id += 1;
            let id = shared.next_id;
            let (tx, rx) = oneshot::channel();
            shared.pending.insert(id, tx);
            (id, rx)
        };

        let message = rpc_request(id, method, params);
        if self.stdin_tx.send(self.framing.encode(&message)).await.is_err() {
            self.shared.lock().pending.remove(&id);
            return Err(PoolError::ChildGone(self.name.clone()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped: the reader died with the request in flight.
            Ok(Err(_)) => Err(PoolError::ChildGone(self.name.clone())),
            Err(_) => {
                self.shared.lock().pending.remove(&id);
                Err(PoolError::RequestTimeout {
                    server: self.name.clone(),
                    method: method.to_string(),
                })
            }
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), PoolError> {
        let message = rpc_notification(method, params);
        self.stdin_tx
            .send(self.framing.encode(&message))
            .await
            .map_err(|_| PoolError::ChildGone(self.name.clone()))
    }

    /// True when the child process has exited.
    pub async fn has_exited(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    /// Refine the memory figure from the child's RSS when possible.
    pub async fn refresh_memory(&self) {
        #[cfg(target_os = "linux")]
        if let Some(pid) = self.pid {
            if let Some(rss_mb) = read_rss_mb(pid).await {
                self.shared.lock().memory_mb = rss_mb;
            }
        }
    }

    /// Stop escalation: `shutdown` request (bounded), `exit` notification,
    /// SIGTERM, SIGKILL. Always reaps the child and releases the IO tasks.
    pub async fn stop(&self) {
        let _ = self.request("shutdown", None, STOP_GRACE).await;
        let _ = self.notify("exit", None).await;

        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                if let Some(pid) = child.id() {
                    let _ = nix::sys::signal::kill(
                        nix::unistd::Pid::from_raw(pid as i32),
                        nix::sys::signal::Signal::SIGTERM,
                    );
                }
                if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                    let _ = child.kill().await;
                    let _ = child.wait().await;
                }
            }
        }
        *guard = None;
        drop(guard);

        for task in self.io_tasks.lock().drain(..) {
            task.abort();
        }
        self.set_status(ServerStatus::Stopped);
    }

    pub fn recent_logs(&self, lines: usize) -> Vec<String> {
        self.shared.lock().recent_logs(lines)
    }
}

/// Serialises all writes to one child's stdin.
async fn writer_task(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = rx.recv().await {
        if stdin.write_all(&bytes).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

/// Demultiplexes framed responses by id. Responses without a matching slot
/// (late arrivals after a timeout) are discarded; notifications from the
/// child are logged and dropped.
async fn reader_task(handle: Arc<ServerHandle>, stdout: tokio::process::ChildStdout) {
    let mut reader = BufReader::new(stdout);
    loop {
        match handle.framing.read_message(&mut reader).await {
            Ok(Some(message)) => {
                let id = message.get("id").and_then(Value::as_u64);
                match id {
                    Some(id) => {
                        let slot = handle.shared.lock().pending.remove(&id);
                        match slot {
                            Some(tx) => {
                                let _ = tx.send(message);
                            }
                            None => {
                                tracing::debug!(
                                    server = %handle.name,
                                    id,
                                    "discarding late or unsolicited response"
                                );
                            }
                        }
                    }
                    None => {
                        tracing::debug!(
                            server = %handle.name,
                            method = message.get("method").and_then(|v| v.as_str()).unwrap_or(""),
                            "notification from child"
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %handle.name, error = %e, "protocol error on child stdout");
                break;
            }
        }
    }

    // Stream gone: fail everything parked and flag the server unless a stop
    // already settled it.
    let mut shared = handle.shared.lock();
    shared.pending.clear();
    if matches!(shared.status, ServerStatus::Running | ServerStatus::Starting) {
        shared.status = ServerStatus::Error;
    }
}

/// Stderr is observed, never interpreted.
async fn stderr_task(handle: Arc<ServerHandle>, stderr: tokio::process::ChildStderr) {
    use tokio::io::AsyncBufReadExt;
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        handle.shared.lock().push_log(line);
    }
}

#[cfg(target_os = "linux")]
async fn read_rss_mb(pid: u32) -> Option<u64> {
    let status = tokio::fs::read_to_string(format!("/proc/{pid}/status")).await.ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024)
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
