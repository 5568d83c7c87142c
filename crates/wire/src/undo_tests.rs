// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn timeline_request_defaults() {
    let req: UndoRequest = serde_json::from_str(r#"{"type": "timeline"}"#).unwrap();
    assert_eq!(req, UndoRequest::Timeline { limit: 20, file: None });

    let req: UndoRequest = serde_json::from_str(r#"{"type": "undo_last"}"#).unwrap();
    assert_eq!(req, UndoRequest::UndoLast { count: 1 });
}

#[test]
fn checkpoint_description_defaults_to_empty() {
    let req: UndoRequest =
        serde_json::from_str(r#"{"type": "checkpoint", "name": "before-refactor"}"#).unwrap();
    assert_eq!(
        req,
        UndoRequest::Checkpoint { name: "before-refactor".into(), description: String::new() }
    );
}

#[test]
fn timeline_response_carries_entries() {
    use dl_core::{ChangeKind, TimelineEntry};

    let resp = UndoResponse::Timeline {
        entries: vec![TimelineEntry {
            id: "un-abc".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            change_type: ChangeKind::Edit,
            file_path: "/tmp/x".into(),
            description: "File edited".into(),
            backup_hash: Some("deadbeefdeadbeef".into()),
            file_size: 5,
            project_path: "/tmp".into(),
        }],
    };

    let json = serde_json::to_string(&resp).unwrap();
    assert!(json.contains("\"change_type\":\"edit\""));
    let back: UndoResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back, resp);
}
