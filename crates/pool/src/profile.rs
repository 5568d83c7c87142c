// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool profiles: the hub and the language pool are the same daemon with
//! different framing, initialization handshake, and health policy.

use crate::transport::Framing;
use std::path::PathBuf;

/// How a profile keeps its children honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthPolicy {
    /// Periodic cheap request (`tools/list`); consecutive failures mark the
    /// server unhealthy and trigger a restart.
    Probe,
    /// Liveness only: child exit and write failures mark `error`; an idle
    /// sweep evicts servers past the idle timeout. Language servers expose
    /// no portable cheap probe.
    LivenessAndIdle,
}

/// Which initialize handshake a child expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitProtocol {
    /// `initialize` + `notifications/initialized`, then capability-gated
    /// `tools/list` / `resources/list` / `prompts/list`.
    Mcp,
    /// LSP `initialize` with a rootUri, then the `initialized` notification.
    Lsp,
}

/// Everything that distinguishes the two daemons.
#[derive(Debug, Clone)]
pub struct PoolProfile {
    /// Short name used in paths and logs: "hub" or "lsp-pool".
    pub name: &'static str,
    pub framing: Framing,
    pub init: InitProtocol,
    pub health: HealthPolicy,
}

impl PoolProfile {
    /// The tool-server hub.
    pub fn hub() -> Self {
        Self {
            name: "hub",
            framing: Framing::LineDelimited,
            init: InitProtocol::Mcp,
            health: HealthPolicy::Probe,
        }
    }

    /// The language-server pool.
    pub fn lsp_pool() -> Self {
        Self {
            name: "lsp-pool",
            framing: Framing::Lsp,
            init: InitProtocol::Lsp,
            health: HealthPolicy::LivenessAndIdle,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        dl_core::paths::runtime_dir().join(format!("{}.sock", self.name))
    }

    pub fn data_dir(&self) -> PathBuf {
        dl_core::paths::data_dir().join(self.name)
    }

    pub fn config_path(&self) -> PathBuf {
        dl_core::paths::config_dir().join(self.name).join("config.yaml")
    }
}
