// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client and daemon process helpers.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One-shot request to a daemon socket.
pub async fn request<Req, Resp>(socket: &Path, req: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    dl_wire::request(socket, req).await.map_err(|e| {
        if e.is_not_running() {
            anyhow!("daemon is not running (no socket at {})", socket.display())
        } else {
            anyhow!(e)
        }
    })
}

/// Locate a sibling daemon binary next to the current executable, falling
/// back to `$PATH`.
pub fn find_daemon_binary(name: &str) -> Result<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    // Fall back to PATH resolution by name.
    Ok(PathBuf::from(name))
}

/// Spawn a daemon detached and wait briefly for its socket to appear.
pub async fn spawn_daemon(binary_name: &str, socket: &Path, args: &[String]) -> Result<()> {
    if socket.exists() {
        // A live socket means a live daemon; a stale one is cleaned up by
        // the daemon itself on start.
        bail!("daemon appears to be running already (socket at {})", socket.display());
    }

    let binary = find_daemon_binary(binary_name)?;
    let child = std::process::Command::new(&binary)
        .args(args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn {}", binary.display()))?;

    println!("started {binary_name} (pid {})", child.id());

    // Give it a moment to bind.
    for _ in 0..30 {
        if socket.exists() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    bail!("{binary_name} did not create its socket; check the daemon log")
}
