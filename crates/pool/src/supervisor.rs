// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: sole owner and writer of the server map.
//!
//! Routing, health checking, and eviction all go through here. Locks are
//! short; victims of an eviction are collected under the lock and stopped
//! after it is released.

use crate::config::{PoolConfig, ServerSpec};
use crate::profile::{HealthPolicy, InitProtocol, PoolProfile};
use crate::server::{ServerHandle, ServerStatus};
use crate::PoolError;
use dl_wire::{PoolStatus, QueryCommand, ResourceEntry, ServerEntry, ToolEntry};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Probe interval for the hub profile.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Idle sweep interval for the language pool.
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEALTH_FAILURES: u32 = 3;
const MAX_RESTART_ATTEMPTS: u32 = 3;

/// Project-root markers for the language pool.
const PROJECT_MARKERS: [&str; 8] = [
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "go.mod",
    "Package.swift",
    "build.gradle",
    "pom.xml",
    ".git",
];

pub struct Supervisor {
    profile: PoolProfile,
    config: Mutex<PoolConfig>,
    servers: Mutex<HashMap<String, Arc<ServerHandle>>>,
}

impl Supervisor {
    pub fn new(profile: PoolProfile, config: PoolConfig) -> Self {
        Self { profile, config: Mutex::new(config), servers: Mutex::new(HashMap::new()) }
    }

    pub fn profile(&self) -> &PoolProfile {
        &self.profile
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.lock().request_timeout_secs)
    }

    fn handle(&self, key: &str) -> Option<Arc<ServerHandle>> {
        self.servers.lock().get(key).cloned()
    }

    fn running_handles(&self) -> Vec<Arc<ServerHandle>> {
        self.servers
            .lock()
            .values()
            .filter(|h| h.status() == ServerStatus::Running)
            .cloned()
            .collect()
    }

    /// Resolve a client-facing server name to (config entry, working dir,
    /// canonical map key). For the pool a name is `language` or
    /// `language:project-root`.
    fn resolve_key(&self, name: &str) -> Result<(String, Option<PathBuf>, String), PoolError> {
        match self.profile.init {
            InitProtocol::Mcp => Ok((name.to_string(), None, name.to_string())),
            InitProtocol::Lsp => {
                let (language, project) = match name.split_once(':') {
                    Some((language, project)) => (language.to_string(), PathBuf::from(project)),
                    None => (
                        name.to_string(),
                        std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                    ),
                };
                let key = format!("{language}:{}", project.display());
                Ok((language, Some(project), key))
            }
        }
    }

    /// Start (or confirm) a server. On handshake failure the child is torn
    /// down and stays absent from the map.
    pub async fn start_server(&self, name: &str) -> Result<(), PoolError> {
        let (config_name, cwd, key) = self.resolve_key(name)?;

        if let Some(existing) = self.handle(&key) {
            if existing.status() == ServerStatus::Running {
                return Ok(());
            }
            // A dead or unhealthy entry is replaced below.
            self.remove_and_stop(&key).await;
        }

        let spec = self
            .config
            .lock()
            .server(&config_name)
            .cloned()
            .ok_or_else(|| PoolError::UnknownServer(config_name.clone()))?;

        if spec.requires_auth {
            for var in &spec.auth_env_vars {
                if std::env::var_os(var).is_none() {
                    tracing::warn!(server = %key, var = %var, "auth variable missing");
                }
            }
        }

        self.make_room_for(spec.memory_estimate_mb).await;

        let handle = ServerHandle::spawn(&key, &spec, self.profile.framing, cwd.as_deref())?;
        self.servers.lock().insert(key.clone(), Arc::clone(&handle));

        match self.initialize(&handle, cwd.as_deref()).await {
            Ok(()) => {
                handle.set_status(ServerStatus::Running);
                tracing::info!(server = %key, pid = handle.pid, "server started");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(server = %key, error = %e, "initialize failed, tearing down");
                self.remove_and_stop(&key).await;
                Err(PoolError::ChildNotStarted(key, e.to_string()))
            }
        }
    }

    /// Protocol handshake after spawn.
    async fn initialize(
        &self,
        handle: &Arc<ServerHandle>,
        cwd: Option<&Path>,
    ) -> Result<(), PoolError> {
        let timeout = self.request_timeout();
        match self.profile.init {
            InitProtocol::Mcp => {
                let response = handle
                    .request(
                        "initialize",
                        Some(json!({
                            "protocolVersion": "0.1.0",
                            "capabilities": {},
                            "clientInfo": {"name": "daedalos-hub", "version": "0.1.0"},
                        })),
                        timeout,
                    )
                    .await?;
                let result = expect_result(handle, response)?;

                handle.notify("notifications/initialized", None).await?;

                // Capability-gated discovery.
                let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
                if capabilities.get("tools").is_some() {
                    let response = handle.request("tools/list", None, timeout).await?;
                    let result = expect_result(handle, response)?;
                    handle.shared.lock().tools =
                        as_array(result.get("tools"));
                }
                if capabilities.get("resources").is_some() {
                    let response = handle.request("resources/list", None, timeout).await?;
                    let result = expect_result(handle, response)?;
                    handle.shared.lock().resources =
                        as_array(result.get("resources"));
                }
                if capabilities.get("prompts").is_some() {
                    let response = handle.request("prompts/list", None, timeout).await?;
                    let result = expect_result(handle, response)?;
                    handle.shared.lock().prompts =
                        as_array(result.get("prompts"));
                }
                Ok(())
            }
            InitProtocol::Lsp => {
                let root = cwd.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
                let response = handle
                    .request(
                        "initialize",
                        Some(json!({
                            "processId": std::process::id(),
                            "rootUri": format!("file://{}", root.display()),
                            "capabilities": {
                                "textDocument": {
                                    "hover": {"contentFormat": ["markdown", "plaintext"]},
                                    "completion": {"completionItem": {"snippetSupport": true}},
                                    "definition": {},
                                    "references": {},
                                }
                            },
                        })),
                        timeout,
                    )
                    .await?;
                expect_result(handle, response)?;
                handle.notify("initialized", Some(json!({}))).await?;
                Ok(())
            }
        }
    }

    /// Stop a server and remove it from the map.
    pub async fn stop_server(&self, name: &str) -> Result<(), PoolError> {
        let (_, _, key) = self.resolve_key(name)?;
        if self.handle(&key).is_none() {
            return Err(PoolError::UnknownServer(key));
        }
        self.remove_and_stop(&key).await;
        tracing::info!(server = %key, "server stopped");
        Ok(())
    }

    async fn remove_and_stop(&self, key: &str) {
        let handle = self.servers.lock().remove(key);
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// User-initiated restart: the restart counter resets.
    pub async fn restart_server(&self, name: &str) -> Result<(), PoolError> {
        let (_, _, key) = self.resolve_key(name)?;
        self.remove_and_stop(&key).await;
        self.start_server(&key).await
    }

    /// Supervision restart after health failures: the counter carries over
    /// and increments.
    async fn restart_for_health(&self, key: &str, previous_restarts: u32) {
        self.remove_and_stop(key).await;
        match self.start_server(key).await {
            Ok(()) => {
                if let Some(handle) = self.handle(key) {
                    handle.shared.lock().restart_count = previous_restarts + 1;
                }
                tracing::info!(server = %key, attempt = previous_restarts + 1, "server restarted");
            }
            Err(e) => {
                tracing::warn!(server = %key, error = %e, "health restart failed");
            }
        }
    }

    /// Pre-start a set of servers. Per-name success map.
    pub async fn warm(&self, names: &[String]) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for name in names {
            let outcome = self.start_server(name).await;
            if let Err(e) = &outcome {
                tracing::warn!(server = %name, error = %e, "warm failed");
            }
            results.insert(name.clone(), outcome.is_ok());
        }
        results
    }

    /// Evict oldest-idle servers until a new child with `estimate_mb` fits
    /// under both the count and memory caps.
    async fn make_room_for(&self, estimate_mb: u64) {
        for handle in self.running_handles() {
            handle.refresh_memory().await;
        }

        loop {
            let victim = {
                let servers = self.servers.lock();
                let config = self.config.lock();
                // Admission is conservative: a server costs at least its
                // configured estimate, more once observed RSS exceeds it.
                let total_memory: u64 = servers
                    .values()
                    .map(|h| h.shared.lock().memory_mb.max(h.spec.memory_estimate_mb))
                    .sum();
                let over_count = servers.len() >= config.max_servers;
                let over_memory =
                    !servers.is_empty() && total_memory + estimate_mb > config.memory_limit_mb;
                if !over_count && !over_memory {
                    return;
                }
                servers
                    .values()
                    .min_by_key(|h| h.shared.lock().last_query)
                    .map(|h| h.name.clone())
            };

            match victim {
                Some(key) => {
                    tracing::info!(server = %key, "evicting to make room");
                    self.remove_and_stop(&key).await;
                }
                None => return,
            }
        }
    }

    /// Route a tool call: explicit server, else first provider of the tool.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> Result<Value, PoolError> {
        let handle = match server {
            Some(name) => self
                .handle(name)
                .ok_or_else(|| PoolError::UnknownServer(name.to_string()))?,
            None => self
                .running_handles()
                .into_iter()
                .find(|h| {
                    h.shared
                        .lock()
                        .tools
                        .iter()
                        .any(|t| t.get("name").and_then(Value::as_str) == Some(tool))
                })
                .ok_or_else(|| PoolError::NoToolProvider(tool.to_string()))?,
        };

        handle.touch();
        let response = handle
            .request(
                "tools/call",
                Some(json!({"name": tool, "arguments": arguments})),
                self.request_timeout(),
            )
            .await?;
        let result = expect_result(&handle, response)?;
        Ok(result)
    }

    /// Language-server query (pool profile only).
    pub async fn query(
        &self,
        command: QueryCommand,
        file: &Path,
        line: u32,
        col: u32,
    ) -> Result<Value, PoolError> {
        if self.profile.init != InitProtocol::Lsp {
            return Err(PoolError::QueryUnsupported(self.profile.name.to_string()));
        }

        let extension = file.extension().and_then(|e| e.to_str()).unwrap_or("");
        let language = self
            .config
            .lock()
            .language_for_extension(extension)
            .map(str::to_string)
            .ok_or_else(|| PoolError::UnknownLanguage(file.display().to_string()))?;

        let project = find_project_root(file);
        let key = format!("{language}:{}", project.display());

        if self.handle(&key).map(|h| h.status()) != Some(ServerStatus::Running) {
            self.start_server(&key).await?;
        }
        let handle = self.handle(&key).ok_or_else(|| PoolError::ChildGone(key.clone()))?;
        handle.touch();

        self.open_document(&handle, &language, file).await?;

        let uri = format!("file://{}", file.display());
        let mut params = json!({
            "textDocument": {"uri": uri},
            "position": {"line": line.saturating_sub(1), "character": col.saturating_sub(1)},
        });
        if command == QueryCommand::References {
            params["context"] = json!({"includeDeclaration": true});
        }

        let response = handle.request(command.method(), Some(params), self.request_timeout()).await?;
        let result = expect_result(&handle, response)?;
        Ok(result)
    }

    /// `textDocument/didOpen`, once per (server, file).
    async fn open_document(
        &self,
        handle: &Arc<ServerHandle>,
        language: &str,
        file: &Path,
    ) -> Result<(), PoolError> {
        let uri = format!("file://{}", file.display());
        let already_open = !handle.shared.lock().opened_files.insert(uri.clone());
        if already_open {
            return Ok(());
        }

        let text = tokio::fs::read_to_string(file).await.unwrap_or_default();
        handle
            .notify(
                "textDocument/didOpen",
                Some(json!({
                    "textDocument": {
                        "uri": uri,
                        "languageId": language,
                        "version": 1,
                        "text": text,
                    }
                })),
            )
            .await
    }

    /// One pass of the profile's health policy.
    pub async fn health_sweep(&self) {
        match self.profile.health {
            HealthPolicy::Probe => self.probe_sweep().await,
            HealthPolicy::LivenessAndIdle => self.liveness_sweep().await,
        }
    }

    async fn probe_sweep(&self) {
        let candidates: Vec<Arc<ServerHandle>> = self
            .servers
            .lock()
            .values()
            .filter(|h| matches!(h.status(), ServerStatus::Running | ServerStatus::Unhealthy))
            .cloned()
            .collect();

        for handle in candidates {
            let healthy = matches!(
                handle.request("tools/list", None, HEALTH_PROBE_TIMEOUT).await,
                Ok(ref response) if response.get("error").is_none()
            );

            let restart = {
                let mut shared = handle.shared.lock();
                shared.last_health_check = Some(std::time::Instant::now());
                if healthy {
                    shared.health_failures = 0;
                    if shared.status == ServerStatus::Unhealthy {
                        shared.status = ServerStatus::Running;
                        tracing::info!(server = %handle.name, "server recovered");
                    }
                    None
                } else {
                    shared.health_failures += 1;
                    if shared.health_failures >= MAX_HEALTH_FAILURES {
                        shared.status = ServerStatus::Unhealthy;
                        tracing::warn!(
                            server = %handle.name,
                            failures = shared.health_failures,
                            "server unhealthy"
                        );
                        (shared.restart_count < MAX_RESTART_ATTEMPTS)
                            .then_some(shared.restart_count)
                    } else {
                        None
                    }
                }
            };

            if let Some(previous) = restart {
                self.restart_for_health(&handle.name, previous).await;
            }
        }
    }

    async fn liveness_sweep(&self) {
        let handles: Vec<Arc<ServerHandle>> =
            self.servers.lock().values().cloned().collect();
        for handle in handles {
            if handle.status() == ServerStatus::Running && handle.has_exited().await {
                tracing::warn!(server = %handle.name, "child exited unexpectedly");
                handle.set_status(ServerStatus::Error);
            }
        }
    }

    /// Evict servers idle past the configured timeout.
    pub async fn idle_sweep(&self) {
        let timeout = Duration::from_secs(self.config.lock().idle_timeout_minutes * 60);
        let idle: Vec<String> = self
            .servers
            .lock()
            .values()
            .filter(|h| h.shared.lock().last_query.elapsed() > timeout)
            .map(|h| h.name.clone())
            .collect();

        for key in idle {
            tracing::info!(server = %key, "evicting idle server");
            self.remove_and_stop(&key).await;
        }
    }

    /// Daemon + per-server status.
    pub async fn status(&self) -> PoolStatus {
        for handle in self.running_handles() {
            handle.refresh_memory().await;
        }

        let config = self.config.lock().clone();
        let mut servers: Vec<ServerEntry> = self
            .servers
            .lock()
            .values()
            .map(|h| {
                let shared = h.shared.lock();
                ServerEntry {
                    name: h.name.clone(),
                    status: shared.status.as_str().to_string(),
                    pid: h.pid,
                    uptime_seconds: h.started_at.elapsed().as_secs(),
                    idle_seconds: shared.last_query.elapsed().as_secs(),
                    memory_mb: shared.memory_mb,
                    tools: shared.tools.len(),
                    resources: shared.resources.len(),
                    prompts: shared.prompts.len(),
                    health_failures: shared.health_failures,
                    restart_count: shared.restart_count,
                }
            })
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));

        PoolStatus {
            profile: self.profile.name.to_string(),
            servers,
            max_servers: config.max_servers,
            memory_limit_mb: config.memory_limit_mb,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolEntry> {
        let mut tools = Vec::new();
        for handle in self.running_handles() {
            let shared = handle.shared.lock();
            for tool in &shared.tools {
                tools.push(ToolEntry {
                    server: handle.name.clone(),
                    name: tool.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                    description: tool
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                });
            }
        }
        tools
    }

    pub fn list_resources(&self) -> Vec<ResourceEntry> {
        let mut resources = Vec::new();
        for handle in self.running_handles() {
            let shared = handle.shared.lock();
            for resource in &shared.resources {
                resources.push(ResourceEntry {
                    server: handle.name.clone(),
                    uri: resource.get("uri").and_then(Value::as_str).unwrap_or("").to_string(),
                    name: resource.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                });
            }
        }
        resources
    }

    pub fn logs(&self, name: &str, lines: usize) -> Result<Vec<String>, PoolError> {
        let (_, _, key) = self.resolve_key(name)?;
        let handle = self.handle(&key).ok_or(PoolError::UnknownServer(key))?;
        Ok(handle.recent_logs(lines))
    }

    /// Re-read the config file.
    pub fn reload(&self) -> Result<(), PoolError> {
        let config = PoolConfig::load(&self.profile.config_path())?;
        *self.config.lock() = config;
        tracing::info!("configuration reloaded");
        Ok(())
    }

    /// Names of servers to warm at daemon start.
    pub fn warmup_names(&self) -> Vec<String> {
        let config = self.config.lock();
        if !config.warmup_on_start {
            return Vec::new();
        }
        match self.profile.init {
            InitProtocol::Mcp => config.servers.keys().cloned().collect(),
            // The pool warms on demand; there is no meaningful project to
            // warm against at boot.
            InitProtocol::Lsp => Vec::new(),
        }
    }

    /// Stop everything, reaping every child.
    pub async fn stop_all(&self) {
        let keys: Vec<String> = self.servers.lock().keys().cloned().collect();
        for key in keys {
            self.remove_and_stop(&key).await;
        }
    }
}

fn as_array(value: Option<&Value>) -> Vec<Value> {
    value.and_then(Value::as_array).cloned().unwrap_or_default()
}

/// Unwrap a JSON-RPC response into its result, surfacing child errors.
fn expect_result(handle: &Arc<ServerHandle>, response: Value) -> Result<Value, PoolError> {
    if let Some(error) = response.get("error") {
        return Err(PoolError::Protocol {
            server: handle.name.clone(),
            reason: error.to_string(),
        });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

/// Walk up from a file to the nearest directory carrying a project marker.
fn find_project_root(file: &Path) -> PathBuf {
    let start = if file.is_file() { file.parent() } else { Some(file) };
    let mut current = start.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    loop {
        if PROJECT_MARKERS.iter().any(|marker| current.join(marker).exists()) {
            return current;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
