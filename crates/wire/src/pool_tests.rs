// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn requests_serialize_with_snake_case_tags() {
    let json = serde_json::to_value(PoolRequest::ListTools).unwrap();
    assert_eq!(json["type"], "list_tools");

    let json = serde_json::to_value(PoolRequest::StartServer { server: "fs".into() }).unwrap();
    assert_eq!(json["type"], "start_server");
    assert_eq!(json["server"], "fs");
}

#[test]
fn call_tool_defaults_apply() {
    let req: PoolRequest =
        serde_json::from_str(r#"{"type": "call_tool", "tool": "read_file"}"#).unwrap();
    match req {
        PoolRequest::CallTool { tool, arguments, server } => {
            assert_eq!(tool, "read_file");
            assert_eq!(arguments, serde_json::Value::Null);
            assert!(server.is_none());
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

#[test]
fn logs_defaults_to_fifty_lines() {
    let req: PoolRequest = serde_json::from_str(r#"{"type": "logs", "server": "fs"}"#).unwrap();
    assert_eq!(req, PoolRequest::Logs { server: "fs".into(), lines: 50 });
}

#[parameterized(
    hover = { QueryCommand::Hover, "textDocument/hover" },
    definition = { QueryCommand::Definition, "textDocument/definition" },
    references = { QueryCommand::References, "textDocument/references" },
    completion = { QueryCommand::Completion, "textDocument/completion" },
)]
fn query_commands_map_to_lsp_methods(cmd: QueryCommand, method: &str) {
    assert_eq!(cmd.method(), method);
}

#[test]
fn status_response_round_trips() {
    let status = PoolResponse::Status(PoolStatus {
        profile: "hub".into(),
        servers: vec![ServerEntry {
            name: "filesystem".into(),
            status: "running".into(),
            pid: Some(42),
            uptime_seconds: 10,
            idle_seconds: 1,
            memory_mb: 120,
            tools: 3,
            resources: 0,
            prompts: 0,
            health_failures: 0,
            restart_count: 0,
        }],
        max_servers: 10,
        memory_limit_mb: 2048,
    });

    let json = serde_json::to_string(&status).unwrap();
    let back: PoolResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back, status);
}
