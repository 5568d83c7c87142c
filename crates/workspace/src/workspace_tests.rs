// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::state::{Finding, Handoff, SubagentKind, SubagentStatus, SubagentUpdate};
use dl_core::{FindingId, HandoffId, LoopId, SubagentId};

fn make_workspace(dir: &std::path::Path) -> Workspace {
    Workspace::create(LoopId::generate(), "fix the tests", "cargo test", Some(dir)).unwrap()
}

fn finding(agent: &SubagentId, content: &str) -> Finding {
    Finding {
        id: FindingId::generate(),
        from_agent: agent.clone(),
        kind: SubagentKind::Explorer,
        content: content.to_string(),
        files: vec!["src/lib.rs".to_string()],
        timestamp: dl_core::now_iso(),
    }
}

#[test]
fn create_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let ws = make_workspace(dir.path());
    let loop_id = ws.state.loop_id.clone();

    assert!(Workspace::exists(&loop_id, Some(dir.path())));

    let loaded = Workspace::load(&loop_id, Some(dir.path())).unwrap();
    assert_eq!(loaded.state.main_task, "fix the tests");
    assert_eq!(loaded.state.iteration, 0);
}

#[test]
fn load_of_missing_workspace_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = Workspace::load(&LoopId::generate(), Some(dir.path())).unwrap_err();
    assert!(matches!(err, WorkspaceError::Missing(_)));
}

#[test]
fn destroy_removes_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ws = make_workspace(dir.path());
    let loop_id = ws.state.loop_id.clone();
    let path = ws.path().to_path_buf();

    ws.destroy().unwrap();

    assert!(!path.exists());
    assert!(!Workspace::exists(&loop_id, Some(dir.path())));
}

#[test]
fn phases_advance_until_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());

    ws.set_plan(vec!["research".into(), "implement".into(), "verify".into()], "bugfix").unwrap();
    assert_eq!(ws.state.plan.as_ref().unwrap().current_phase, "research");

    assert!(ws.advance_phase().unwrap());
    assert_eq!(ws.state.plan.as_ref().unwrap().current_phase, "implement");
    assert!(ws.advance_phase().unwrap());
    assert!(!ws.advance_phase().unwrap(), "no phase after the last");
    assert_eq!(ws.state.plan.as_ref().unwrap().current_phase, "verify");
}

#[test]
fn advance_without_plan_is_false() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    assert!(!ws.advance_phase().unwrap());
}

#[test]
fn subagent_status_transitions_stamp_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    let id = SubagentId::generate();

    ws.register_subagent(id.clone(), SubagentKind::Implementer, "implement it").unwrap();
    assert_eq!(ws.subagent(&id).unwrap().status, SubagentStatus::Pending);

    ws.update_subagent(
        &id,
        SubagentUpdate { status: Some(SubagentStatus::Running), ..Default::default() },
    )
    .unwrap();
    let record = ws.subagent(&id).unwrap();
    assert!(record.started_at.is_some());
    assert!(record.finished_at.is_none());

    ws.update_subagent(
        &id,
        SubagentUpdate {
            status: Some(SubagentStatus::Completed),
            promise_result: Some(true),
            output_summary: Some("done".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let record = ws.subagent(&id).unwrap();
    assert!(record.finished_at.is_some());
    assert_eq!(record.promise_result, Some(true));
    assert_eq!(record.output_summary, "done");
}

#[test]
fn update_of_unknown_subagent_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    ws.update_subagent(
        &SubagentId::generate(),
        SubagentUpdate { status: Some(SubagentStatus::Running), ..Default::default() },
    )
    .unwrap();
    assert!(ws.state.subagents.is_empty());
}

#[test]
fn findings_append_and_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    let explorer = SubagentId::generate();
    let tester = SubagentId::generate();

    ws.add_finding(finding(&explorer, "found the bug")).unwrap();
    let mut tester_finding = finding(&tester, "wrote a test");
    tester_finding.kind = SubagentKind::Tester;
    ws.add_finding(tester_finding).unwrap();

    assert_eq!(ws.findings(None).len(), 2);
    assert_eq!(ws.findings(Some(SubagentKind::Tester)).len(), 1);
    assert_eq!(ws.findings_from(&explorer).len(), 1);

    // The transcript file carries the full text.
    let transcript = ws.path().join("findings").join(format!("{explorer}.txt"));
    let content = std::fs::read_to_string(transcript).unwrap();
    assert!(content.contains("found the bug"));
}

#[test]
fn long_finding_content_is_bounded_in_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    let agent = SubagentId::generate();

    ws.add_finding(finding(&agent, &"x".repeat(FINDING_CONTENT_LIMIT * 2))).unwrap();

    let stored = &ws.findings(None)[0];
    assert_eq!(stored.content.chars().count(), FINDING_CONTENT_LIMIT);
}

#[test]
fn handoffs_target_and_acknowledge_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    let from = SubagentId::generate();
    let to = SubagentId::generate();

    let handoff = Handoff {
        id: HandoffId::generate(),
        from_agent: from.clone(),
        to_agent: to.clone(),
        message: "implement using the pattern in src/lib.rs".into(),
        context_files: vec!["src/lib.rs".into()],
        timestamp: dl_core::now_iso(),
        acknowledged: false,
    };
    let handoff_id = handoff.id.clone();
    ws.add_handoff(handoff).unwrap();

    assert_eq!(ws.handoffs_for(&to).len(), 1);
    assert!(ws.handoffs_for(&from).is_empty());

    ws.acknowledge_handoff(handoff_id.as_str()).unwrap();
    assert!(ws.handoffs_for(&to)[0].acknowledged);
}

#[test]
fn artifacts_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ws = make_workspace(dir.path());

    ws.save_artifact("synthesis.txt", b"research notes").unwrap();

    assert_eq!(ws.artifact("synthesis.txt").unwrap(), b"research notes");
    assert_eq!(ws.list_artifacts(), vec!["synthesis.txt".to_string()]);
    assert!(ws.artifact("missing.txt").is_none());
}

#[test]
fn context_includes_unacknowledged_handoffs_then_findings() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());
    let orchestrator = SubagentId::generate();
    let implementer = SubagentId::generate();

    ws.add_finding(finding(&orchestrator, "the bug is in parse()")).unwrap();
    ws.add_handoff(Handoff {
        id: HandoffId::generate(),
        from_agent: orchestrator.clone(),
        to_agent: implementer.clone(),
        message: "fix parse() first".into(),
        context_files: vec![],
        timestamp: dl_core::now_iso(),
        acknowledged: false,
    })
    .unwrap();

    let context = ws.build_context_for_subagent(&implementer);
    let handoff_pos = context.find("fix parse() first").unwrap();
    let findings_pos = context.find("FINDINGS SUMMARY").unwrap();
    assert!(handoff_pos < findings_pos, "handoffs come before findings");

    // Acknowledged handoffs drop out of the context.
    let id = ws.state.handoffs[0].id.clone();
    ws.acknowledge_handoff(id.as_str()).unwrap();
    let context = ws.build_context_for_subagent(&implementer);
    assert!(!context.contains("fix parse() first"));
}

#[test]
fn iteration_counters_advance() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = make_workspace(dir.path());

    assert_eq!(ws.start_iteration().unwrap(), 1);
    assert_eq!(ws.start_iteration().unwrap(), 2);

    ws.record_subagent_iteration().unwrap();
    assert_eq!(ws.state.total_subagent_iterations, 1);
}
