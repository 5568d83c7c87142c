// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervision gates: decide whether a risky action may proceed under the
//! user's configured autonomy posture, and record every decision.

mod checker;
mod config;

pub use checker::{
    check_autonomy_limits, Approver, GateChecker, GateContext, GateRequest, GateResult,
    RunCounters,
};
pub use config::{
    default_action, AutonomyLimits, Gate, GateAction, SupervisionConfig, SupervisionLevel,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from gate configuration and audit logging.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config at {path}: {reason}")]
    BadConfig { path: PathBuf, reason: String },

    #[error("unknown gate: {0}")]
    UnknownGate(String),

    #[error("unknown gate action: {0}")]
    UnknownAction(String),

    #[error("unknown supervision level: {0}")]
    UnknownLevel(String),
}
