// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor tests using echo children (`sh` scripts) as servers: they
//! reflect every framed request, which satisfies the MCP handshake.

use super::*;
use crate::config::ServerSpec;

const ECHO_SCRIPT: &str =
    r#"while read -r line; do echo "$line"; case "$line" in *'"shutdown"'*) exit 0;; esac; done"#;

fn echo_spec(memory_estimate_mb: u64) -> ServerSpec {
    ServerSpec {
        command: vec!["sh".into(), "-c".into(), ECHO_SCRIPT.into()],
        env: Default::default(),
        extensions: vec![],
        memory_estimate_mb,
        requires_auth: false,
        auth_env_vars: vec![],
    }
}

fn hub_with(servers: &[(&str, u64)], max_servers: usize, memory_limit_mb: u64) -> Supervisor {
    let mut config = PoolConfig {
        max_servers,
        memory_limit_mb,
        ..Default::default()
    };
    for (name, memory) in servers {
        config.servers.insert(name.to_string(), echo_spec(*memory));
    }
    Supervisor::new(PoolProfile::hub(), config)
}

#[tokio::test]
async fn start_server_runs_the_handshake() {
    let supervisor = hub_with(&[("alpha", 100)], 10, 2048);

    supervisor.start_server("alpha").await.unwrap();

    let status = supervisor.status().await;
    assert_eq!(status.profile, "hub");
    assert_eq!(status.servers.len(), 1);
    assert_eq!(status.servers[0].name, "alpha");
    assert_eq!(status.servers[0].status, "running");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn starting_a_running_server_is_idempotent() {
    let supervisor = hub_with(&[("alpha", 100)], 10, 2048);

    supervisor.start_server("alpha").await.unwrap();
    supervisor.start_server("alpha").await.unwrap();

    assert_eq!(supervisor.status().await.servers.len(), 1);
    supervisor.stop_all().await;
}

#[tokio::test]
async fn unknown_server_is_rejected() {
    let supervisor = hub_with(&[], 10, 2048);
    assert!(matches!(
        supervisor.start_server("ghost").await,
        Err(PoolError::UnknownServer(_))
    ));
    assert!(matches!(
        supervisor.stop_server("ghost").await,
        Err(PoolError::UnknownServer(_))
    ));
}

#[tokio::test]
async fn failed_spawn_leaves_the_pool_empty() {
    let mut config = PoolConfig::default();
    config.servers.insert(
        "broken".into(),
        ServerSpec {
            command: vec!["/definitely/not/a/binary".into()],
            env: Default::default(),
            extensions: vec![],
            memory_estimate_mb: 100,
            requires_auth: false,
            auth_env_vars: vec![],
        },
    );
    let supervisor = Supervisor::new(PoolProfile::hub(), config);

    assert!(matches!(
        supervisor.start_server("broken").await,
        Err(PoolError::ChildNotStarted(_, _))
    ));
    assert!(supervisor.status().await.servers.is_empty());
}

#[tokio::test]
async fn memory_cap_evicts_the_oldest_server() {
    // Two servers whose combined estimates exceed the cap: warming the
    // second must evict the first.
    let supervisor = hub_with(&[("older", 300), ("newer", 300)], 10, 500);

    supervisor.start_server("older").await.unwrap();
    // Make "older" clearly the least recently queried.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    supervisor.start_server("newer").await.unwrap();

    let status = supervisor.status().await;
    assert_eq!(status.servers.len(), 1, "exactly one server admitted");
    assert_eq!(status.servers[0].name, "newer");
    assert_eq!(status.servers[0].status, "running");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn count_cap_evicts_before_admitting() {
    let supervisor = hub_with(&[("a", 10), ("b", 10), ("c", 10)], 2, 2048);

    supervisor.start_server("a").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    supervisor.start_server("b").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    supervisor.start_server("c").await.unwrap();

    let status = supervisor.status().await;
    let names: Vec<&str> = status.servers.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(status.servers.len(), 2);
    assert!(!names.contains(&"a"), "oldest-idle server was evicted: {names:?}");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn warm_reports_per_server_outcomes() {
    let supervisor = hub_with(&[("good", 10)], 10, 2048);

    let results =
        supervisor.warm(&["good".to_string(), "missing".to_string()]).await;

    assert_eq!(results.get("good"), Some(&true));
    assert_eq!(results.get("missing"), Some(&false));
    supervisor.stop_all().await;
}

#[tokio::test]
async fn explicit_server_tool_call_round_trips() {
    let supervisor = hub_with(&[("alpha", 10)], 10, 2048);
    supervisor.start_server("alpha").await.unwrap();

    // The echo child reflects the request; its "result" is null, which the
    // router surfaces as a successful call.
    let result = supervisor
        .call_tool("read_file", serde_json::json!({"path": "/tmp/x"}), Some("alpha"))
        .await
        .unwrap();
    assert_eq!(result, serde_json::Value::Null);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn unrouteable_tool_is_reported() {
    let supervisor = hub_with(&[("alpha", 10)], 10, 2048);
    supervisor.start_server("alpha").await.unwrap();

    // Echo servers advertise no tools, so name-based routing finds nothing.
    assert!(matches!(
        supervisor.call_tool("nope", serde_json::Value::Null, None).await,
        Err(PoolError::NoToolProvider(_))
    ));
    supervisor.stop_all().await;
}

#[tokio::test]
async fn query_is_rejected_on_the_hub_profile() {
    let supervisor = hub_with(&[], 10, 2048);
    let err = supervisor
        .query(dl_wire::QueryCommand::Hover, std::path::Path::new("/tmp/a.rs"), 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::QueryUnsupported(_)));
}

#[tokio::test]
async fn query_without_language_mapping_is_rejected() {
    let profile = PoolProfile::lsp_pool();
    let supervisor = Supervisor::new(profile, PoolConfig::default());
    let err = supervisor
        .query(dl_wire::QueryCommand::Hover, std::path::Path::new("/tmp/a.zig"), 1, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::UnknownLanguage(_)));
}

#[tokio::test]
async fn logs_come_from_the_stderr_ring() {
    let mut config = PoolConfig::default();
    let script = format!("echo starting up >&2; {ECHO_SCRIPT}");
    config.servers.insert(
        "noisy".into(),
        ServerSpec {
            command: vec!["sh".into(), "-c".into(), script],
            env: Default::default(),
            extensions: vec![],
            memory_estimate_mb: 10,
            requires_auth: false,
            auth_env_vars: vec![],
        },
    );
    let supervisor = Supervisor::new(PoolProfile::hub(), config);
    supervisor.start_server("noisy").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let logs = supervisor.logs("noisy", 10).unwrap();
    assert_eq!(logs, vec!["starting up".to_string()]);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn idle_sweep_evicts_stale_servers() {
    let mut config = PoolConfig {
        idle_timeout_minutes: 0,
        ..Default::default()
    };
    config.servers.insert("alpha".into(), echo_spec(10));
    let supervisor = Supervisor::new(PoolProfile::hub(), config);

    supervisor.start_server("alpha").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    supervisor.idle_sweep().await;

    assert!(supervisor.status().await.servers.is_empty());
}

#[tokio::test]
async fn liveness_sweep_flags_dead_children() {
    // Hub framing with liveness policy isolates the sweep under test.
    let profile = PoolProfile {
        health: HealthPolicy::LivenessAndIdle,
        ..PoolProfile::hub()
    };
    let mut config = PoolConfig::default();
    // Answers the handshake, then exits.
    config.servers.insert(
        "brief".into(),
        ServerSpec {
            command: vec![
                "sh".into(),
                "-c".into(),
                r#"read -r line; echo "$line""#.into(),
            ],
            env: Default::default(),
            extensions: vec![],
            memory_estimate_mb: 10,
            requires_auth: false,
            auth_env_vars: vec![],
        },
    );
    let supervisor = Supervisor::new(profile, config);

    supervisor.start_server("brief").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    supervisor.health_sweep().await;

    let status = supervisor.status().await;
    assert_eq!(status.servers[0].status, "error");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn probe_failures_accumulate_toward_unhealthy() {
    let mut config = PoolConfig::default();
    // Answers the handshake, then goes mute while staying alive: probes
    // time out without the reader seeing an EOF.
    config.servers.insert(
        "flaky".into(),
        ServerSpec {
            command: vec![
                "sh".into(),
                "-c".into(),
                r#"read -r line; echo "$line"; exec sleep 30"#.into(),
            ],
            env: Default::default(),
            extensions: vec![],
            memory_estimate_mb: 10,
            requires_auth: false,
            auth_env_vars: vec![],
        },
    );
    let supervisor = Supervisor::new(PoolProfile::hub(), config);
    supervisor.start_server("flaky").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    supervisor.health_sweep().await;

    let status = supervisor.status().await;
    // One failed probe recorded; not yet unhealthy.
    let entry = &status.servers[0];
    assert_eq!(entry.health_failures, 1);
    assert_ne!(entry.status, "unhealthy");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn user_restart_resets_the_restart_counter() {
    let supervisor = hub_with(&[("alpha", 10)], 10, 2048);
    supervisor.start_server("alpha").await.unwrap();

    supervisor.restart_server("alpha").await.unwrap();

    let status = supervisor.status().await;
    assert_eq!(status.servers[0].status, "running");
    assert_eq!(status.servers[0].restart_count, 0);

    supervisor.stop_all().await;
}
