// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process-pool daemon.
//!
//! One parameterised design serves two roles: a hub of tool servers
//! speaking line-delimited JSON-RPC (MCP conventions) and a pool of warm
//! language servers speaking LSP-framed JSON-RPC. A daemon is a
//! single-threaded cooperative scheduler: the accept loop, one
//! writer/reader/stderr task triple per child, a health-check task, and an
//! idle-eviction task all interleave on one runtime thread.

pub mod config;
pub mod lifecycle;
pub mod listener;
pub mod profile;
pub mod server;
pub mod supervisor;
pub mod transport;

pub use config::{PoolConfig, ServerSpec};
pub use lifecycle::{run_daemon, DaemonPaths};
pub use profile::{HealthPolicy, InitProtocol, PoolProfile};
pub use server::{ServerHandle, ServerStatus};
pub use supervisor::Supervisor;
pub use transport::Framing;

use thiserror::Error;

/// Errors from the pool daemon.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("server {0} failed to start: {1}")]
    ChildNotStarted(String, String),

    #[error("server {0} is not running")]
    ChildGone(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("no server provides tool: {0}")]
    NoToolProvider(String),

    #[error("request {method} to {server} timed out")]
    RequestTimeout { server: String, method: String },

    #[error("protocol error from {server}: {reason}")]
    Protocol { server: String, reason: String },

    #[error("no language configured for file: {0}")]
    UnknownLanguage(String),

    #[error("queries are not supported by the {0} daemon")]
    QueryUnsupported(String),

    #[error("daemon already running (pid file locked at {0})")]
    AlreadyRunning(std::path::PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
