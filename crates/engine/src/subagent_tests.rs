// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dl_adapters::{AgentResult, FakeAgent};
use dl_workspace::SubagentStatus;

fn setup(dir: &Path) -> (Arc<Mutex<Workspace>>, SubagentId) {
    let workspace = Workspace::create(
        dl_core::LoopId::generate(),
        "fix the bug",
        "true",
        Some(dir),
    )
    .unwrap();
    let id = SubagentId::from_string("explorer-1");
    let workspace = Arc::new(Mutex::new(workspace));
    workspace
        .lock()
        .register_subagent(id.clone(), SubagentKind::Explorer, "map the failure")
        .unwrap();
    (workspace, id)
}

fn task(id: &SubagentId, kind: SubagentKind, promise: &str) -> SubagentTask {
    SubagentTask {
        id: id.clone(),
        kind,
        objective: "map the failure".into(),
        promise: promise.into(),
        context: String::new(),
        timeout: Duration::from_secs(5),
        max_iterations: 2,
    }
}

#[test]
fn templates_exist_for_every_kind() {
    for kind in SubagentKind::ALL {
        let tpl = template(kind);
        assert_eq!(tpl.kind, kind);
        assert!(!tpl.objective_prefix.is_empty());
        assert!(!tpl.boundaries.is_empty());
    }
}

#[test]
fn satisfied_promise_completes_without_agent_calls() {
    let dir = tempfile::tempdir().unwrap();
    let (workspace, id) = setup(dir.path());
    let agent = FakeAgent::succeeding();

    let runner = SubagentRunner::new(
        task(&id, SubagentKind::Explorer, "true"),
        Arc::clone(&workspace),
        dir.path(),
        Arc::new(agent.clone()),
    );
    let result = runner.run().unwrap();

    assert!(result.success);
    assert_eq!(result.iterations, 0);
    assert!(agent.calls().is_empty());
    assert_eq!(
        workspace.lock().subagent(&id).unwrap().status,
        SubagentStatus::Completed
    );
}

#[test]
fn failing_promise_exhausts_iterations_and_records_findings() {
    let dir = tempfile::tempdir().unwrap();
    let (workspace, id) = setup(dir.path());
    let agent = FakeAgent::with(|_, _| AgentResult {
        success: true,
        output: "looked at `src/parse.rs` and ./tests/parse_test.rs".into(),
        ..Default::default()
    });

    let runner = SubagentRunner::new(
        task(&id, SubagentKind::Explorer, "false"),
        Arc::clone(&workspace),
        dir.path(),
        Arc::new(agent),
    );
    let result = runner.run().unwrap();

    assert!(!result.success);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.findings.len(), 2);

    let ws = workspace.lock();
    assert_eq!(ws.state.findings.len(), 2);
    assert_eq!(ws.state.total_subagent_iterations, 2);
    let record = ws.subagent(&id).unwrap();
    assert_eq!(record.status, SubagentStatus::Failed);
    assert_eq!(record.promise_result, Some(false));
}

#[test]
fn subagent_prompt_carries_template_and_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let (workspace, id) = setup(dir.path());
    let agent = FakeAgent::succeeding();

    let mut t = task(&id, SubagentKind::Reviewer, "false");
    t.max_iterations = 1;
    t.context = "check the parser".into();
    let runner =
        SubagentRunner::new(t, Arc::clone(&workspace), dir.path(), Arc::new(agent.clone()));
    runner.run().unwrap();

    let prompt = &agent.calls()[0].prompt;
    assert!(prompt.contains("SUBAGENT: REVIEWER"));
    assert!(prompt.contains("Review and verify: map the failure"));
    assert!(prompt.contains("Do not modify files. Report issues only."));
    assert!(prompt.contains("CONTEXT FROM ORCHESTRATOR:\ncheck the parser"));
}

#[test]
fn file_paths_are_extracted_from_output() {
    let paths = extract_file_paths(
        "The bug is in ./src/main.rs and the test lives in `tests/a.rs`.\n\
         See https://example.com/x.rs for docs.",
    );
    assert!(paths.contains(&"./src/main.rs".to_string()));
    assert!(paths.contains(&"tests/a.rs".to_string()));
    assert!(!paths.iter().any(|p| p.contains("example.com")));
}

#[test]
fn parallel_runner_completes_all_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let (workspace, _) = setup(dir.path());

    let mut tasks = Vec::new();
    for i in 0..4 {
        let id = SubagentId::from_string(format!("explorer-{i}"));
        workspace
            .lock()
            .register_subagent(id.clone(), SubagentKind::Explorer, "explore")
            .unwrap();
        tasks.push(task(&id, SubagentKind::Explorer, "true"));
    }

    let runner = ParallelSubagentRunner::new(
        Arc::clone(&workspace),
        dir.path(),
        2,
        Arc::new(FakeAgent::succeeding()),
    );
    let results = runner.run_parallel(tasks);

    assert_eq!(results.len(), 4);
    assert!(results.values().all(|r| r.success));
}

#[test]
fn sequential_runner_stops_after_critical_failure() {
    let dir = tempfile::tempdir().unwrap();
    let (workspace, _) = setup(dir.path());

    let impl_id = SubagentId::from_string("implementer-1");
    let review_id = SubagentId::from_string("reviewer-1");
    for (id, kind) in [(&impl_id, SubagentKind::Implementer), (&review_id, SubagentKind::Reviewer)]
    {
        workspace.lock().register_subagent(id.clone(), kind, "work").unwrap();
    }

    let tasks = vec![
        task(&impl_id, SubagentKind::Implementer, "false"),
        task(&review_id, SubagentKind::Reviewer, "true"),
    ];

    let runner = ParallelSubagentRunner::new(
        Arc::clone(&workspace),
        dir.path(),
        1,
        Arc::new(FakeAgent::succeeding()),
    );
    let results = runner.run_sequential(tasks);

    // Implementer failed; the reviewer never ran.
    assert_eq!(results.len(), 1);
    assert!(!results[&impl_id].success);
}
