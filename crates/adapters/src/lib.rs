// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External-world integrations for the loop engine: blocking subprocess
//! execution, agent adapters around AI coding CLIs, checkpoint backends,
//! and desktop notifications.
//!
//! Everything here is synchronous; the loop engine runs in the CLI process
//! and blocks on subprocesses with explicit timeouts.

pub mod agent;
pub mod checkpoint;
pub mod notify;
pub mod subprocess;

pub use agent::{
    available_agents, detect_agent, get_agent, AgentAdapter, AgentError, AgentResult,
};
pub use checkpoint::{
    auto_backend, backend_for, detect_backend, BackendKind, Checkpoint, CheckpointBackend,
    CheckpointError,
};
pub use notify::{DesktopNotifier, Notifier};
pub use subprocess::{run_argv, run_shell, CommandOutput};

#[cfg(any(test, feature = "test-support"))]
pub use agent::FakeAgent;
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotifier;
