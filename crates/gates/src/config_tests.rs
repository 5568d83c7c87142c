// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn level_ordering_tightens() {
    assert!(SupervisionLevel::Autonomous.index() < SupervisionLevel::Supervised.index());
    assert!(SupervisionLevel::Assisted.index() < SupervisionLevel::Manual.index());
}

#[parameterized(
    autonomous_delete = { SupervisionLevel::Autonomous, Gate::FileDelete, GateAction::Notify },
    autonomous_create = { SupervisionLevel::Autonomous, Gate::FileCreate, GateAction::Allow },
    autonomous_force_push = { SupervisionLevel::Autonomous, Gate::GitForcePush, GateAction::Approve },
    supervised_delete = { SupervisionLevel::Supervised, Gate::FileDelete, GateAction::Approve },
    supervised_commit = { SupervisionLevel::Supervised, Gate::GitCommit, GateAction::Notify },
    supervised_force_push = { SupervisionLevel::Supervised, Gate::GitForcePush, GateAction::Deny },
    collaborative_modify = { SupervisionLevel::Collaborative, Gate::FileModify, GateAction::Notify },
    collaborative_shell = { SupervisionLevel::Collaborative, Gate::ShellCommand, GateAction::Approve },
    manual_loop_start = { SupervisionLevel::Manual, Gate::LoopStart, GateAction::Approve },
    manual_force_push = { SupervisionLevel::Manual, Gate::GitForcePush, GateAction::Deny },
)]
fn default_tables_match_levels(level: SupervisionLevel, gate: Gate, expected: GateAction) {
    assert_eq!(default_action(level, gate), expected);
}

#[test]
fn explicit_gate_beats_default_and_override_beats_both() {
    let mut config = SupervisionConfig::for_level(SupervisionLevel::Supervised);
    assert_eq!(config.gate_action(Gate::FileDelete), GateAction::Approve);

    config.gates.insert(Gate::FileDelete, GateAction::Allow);
    assert_eq!(config.gate_action(Gate::FileDelete), GateAction::Allow);

    config.overrides.insert(Gate::FileDelete, GateAction::Deny);
    assert_eq!(config.gate_action(Gate::FileDelete), GateAction::Deny);
}

#[parameterized(
    dotenv = { ".env", true },
    dotenv_local = { "/home/me/project/.env.local", true },
    pem = { "/etc/ssl/server.pem", true },
    ssh_key = { "/home/me/.ssh/id_rsa", true },
    source_file = { "/home/me/project/src/main.rs", false },
)]
fn sensitive_paths_match_defaults(path: &str, sensitive: bool) {
    let config = SupervisionConfig::default();
    assert_eq!(config.is_sensitive_path(path), sensitive, "{path}");
}

#[test]
fn yaml_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("supervision.yaml");

    let mut config = SupervisionConfig::for_level(SupervisionLevel::Collaborative);
    config.gates.insert(Gate::GitPush, GateAction::Deny);
    config.save_to(&path).unwrap();

    let loaded = SupervisionConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn json_config_is_accepted_as_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("supervision.json");
    std::fs::write(&path, r#"{"level": "manual", "gates": {"file_create": "deny"}}"#).unwrap();

    let loaded = SupervisionConfig::load_from(&path).unwrap();
    assert_eq!(loaded.level, SupervisionLevel::Manual);
    assert_eq!(loaded.gate_action(Gate::FileCreate), GateAction::Deny);
}

#[test]
fn project_config_can_tighten_but_not_loosen() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path();
    std::fs::create_dir_all(project.join(".daedalos")).unwrap();

    // Project tries to loosen to autonomous: level must not drop.
    std::fs::write(project.join(".daedalos/supervision.yaml"), "level: autonomous\n").unwrap();
    let mut config = SupervisionConfig::for_level(SupervisionLevel::Collaborative);
    config.apply_project(project);
    assert_eq!(config.level, SupervisionLevel::Collaborative);

    // Project tightens to manual: level rises.
    std::fs::write(project.join(".daedalos/supervision.yaml"), "level: manual\n").unwrap();
    let mut config = SupervisionConfig::for_level(SupervisionLevel::Collaborative);
    config.apply_project(project);
    assert_eq!(config.level, SupervisionLevel::Manual);
}

#[test]
fn project_gate_overrides_apply() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path();
    std::fs::create_dir_all(project.join(".daedalos")).unwrap();
    std::fs::write(
        project.join(".daedalos/supervision.yaml"),
        "level: supervised\ngates:\n  shell_command: deny\n",
    )
    .unwrap();

    let mut config = SupervisionConfig::for_level(SupervisionLevel::Supervised);
    config.apply_project(project);
    assert_eq!(config.gate_action(Gate::ShellCommand), GateAction::Deny);
}

#[test]
fn missing_project_config_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SupervisionConfig::default();
    let before = config.clone();
    config.apply_project(dir.path());
    assert_eq!(config, before);
}
