// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child IO tests against real subprocesses. An echo child (`cat`) sends
//! our own framed request straight back, which exercises the writer task,
//! the framing, and the id-correlated response routing end to end.

use super::*;
use crate::config::ServerSpec;

fn spec(command: &[&str]) -> ServerSpec {
    ServerSpec {
        command: command.iter().map(|s| s.to_string()).collect(),
        env: Default::default(),
        extensions: vec![],
        memory_estimate_mb: 50,
        requires_auth: false,
        auth_env_vars: vec![],
    }
}

/// Echoes every line, exits after echoing a shutdown request. Keeps stop
/// paths fast in tests.
const ECHO_SCRIPT: &str =
    r#"while read -r line; do echo "$line"; case "$line" in *'"shutdown"'*) exit 0;; esac; done"#;

fn echo_spec() -> ServerSpec {
    spec(&["sh", "-c", ECHO_SCRIPT])
}

#[tokio::test]
async fn request_round_trips_through_an_echo_child() {
    let handle = ServerHandle::spawn("echo", &echo_spec(), Framing::LineDelimited, None).unwrap();

    let response =
        handle.request("tools/list", None, Duration::from_secs(5)).await.unwrap();

    // The echo child reflects our own request as the "response".
    assert_eq!(response["method"], "tools/list");
    assert_eq!(response["id"], 1);

    handle.stop().await;
    assert_eq!(handle.status(), ServerStatus::Stopped);
}

#[tokio::test]
async fn responses_demultiplex_by_id() {
    let handle = ServerHandle::spawn("echo", &echo_spec(), Framing::LineDelimited, None).unwrap();

    let first = handle.request("alpha", None, Duration::from_secs(5)).await.unwrap();
    let second = handle.request("beta", None, Duration::from_secs(5)).await.unwrap();

    assert_eq!(first["id"], 1);
    assert_eq!(first["method"], "alpha");
    assert_eq!(second["id"], 2);
    assert_eq!(second["method"], "beta");

    handle.stop().await;
}

#[tokio::test]
async fn lsp_framed_request_round_trips() {
    // cat echoes the framed bytes verbatim, header included.
    let handle = ServerHandle::spawn("cat", &spec(&["cat"]), Framing::Lsp, None).unwrap();

    let response =
        handle.request("textDocument/hover", None, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response["method"], "textDocument/hover");
    // kill_on_drop reaps the cat child.
}

#[tokio::test]
async fn unresponsive_child_times_out_and_releases_the_slot() {
    let handle =
        ServerHandle::spawn("mute", &spec(&["sleep", "30"]), Framing::LineDelimited, None)
            .unwrap();

    let err = handle.request("ping", None, Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, PoolError::RequestTimeout { .. }));
    // The timed-out slot was removed; a fresh id is allocated next time.
    assert!(handle.shared.lock().pending.is_empty());
}

#[tokio::test]
async fn spawn_failure_is_child_not_started() {
    let err = ServerHandle::spawn(
        "ghost",
        &spec(&["/definitely/not/a/binary"]),
        Framing::LineDelimited,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, PoolError::ChildNotStarted(_, _)));
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let err = ServerHandle::spawn("empty", &spec(&[]), Framing::LineDelimited, None).unwrap_err();
    assert!(matches!(err, PoolError::ChildNotStarted(_, _)));
}

#[tokio::test]
async fn stderr_lands_in_the_bounded_ring() {
    let script = r#"echo one >&2; echo two >&2; while read -r line; do echo "$line"; case "$line" in *'"shutdown"'*) exit 0;; esac; done"#;
    let handle =
        ServerHandle::spawn("noisy", &spec(&["sh", "-c", script]), Framing::LineDelimited, None)
            .unwrap();

    // Give the stderr collector a moment.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let logs = handle.recent_logs(10);
    assert_eq!(logs, vec!["one".to_string(), "two".to_string()]);
    assert_eq!(handle.recent_logs(1), vec!["two".to_string()]);

    handle.stop().await;
}

#[tokio::test]
async fn ring_keeps_only_the_last_hundred_lines() {
    let mut shared = ServerShared::new(50);
    for i in 0..150 {
        shared.push_log(format!("line-{i}"));
    }
    let logs = shared.recent_logs(200);
    assert_eq!(logs.len(), 100);
    assert_eq!(logs.first().map(String::as_str), Some("line-50"));
    assert_eq!(logs.last().map(String::as_str), Some("line-149"));
}

#[tokio::test]
async fn dead_child_fails_in_flight_requests() {
    // Child exits immediately without answering.
    let handle =
        ServerHandle::spawn("dead", &spec(&["true"]), Framing::LineDelimited, None).unwrap();

    let err = handle.request("ping", None, Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, PoolError::ChildGone(_) | PoolError::RequestTimeout { .. }));

    // Reader noticed the EOF and flagged the server.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.status(), ServerStatus::Error);
}
