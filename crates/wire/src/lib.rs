// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing IPC protocol for the Daedalos daemons.
//!
//! Wire format: one JSON request per connection; the client half-closes its
//! write side, the daemon replies with one JSON response and closes. There
//! are no multiplexed sessions over a single client connection.

mod framing;
mod pool;
mod undo;


pub use framing::{read_json, request, write_json, WireError, MAX_MESSAGE_BYTES};
pub use pool::{
    PoolRequest, PoolResponse, PoolStatus, QueryCommand, ResourceEntry, ServerEntry, ToolEntry,
};
pub use undo::{UndoRequest, UndoResponse, UndoStats};
