// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dl_core::{ChangeKind, TimelineEntry};

fn entry(id: &str, ts: &str, path: &str, hash: Option<&str>) -> TimelineEntry {
    TimelineEntry {
        id: id.to_string(),
        timestamp: ts.to_string(),
        change_type: ChangeKind::Edit,
        file_path: path.to_string(),
        description: "File edited".to_string(),
        backup_hash: hash.map(|h| h.to_string()),
        file_size: 1,
        project_path: "/tmp".to_string(),
    }
}

#[test]
fn entries_come_back_newest_first() {
    let db = TimelineDb::open_in_memory().unwrap();
    db.add_entry(&entry("a", "2026-01-01T00:00:01Z", "/tmp/x", None)).unwrap();
    db.add_entry(&entry("b", "2026-01-01T00:00:03Z", "/tmp/x", None)).unwrap();
    db.add_entry(&entry("c", "2026-01-01T00:00:02Z", "/tmp/y", None)).unwrap();

    let rows = db.entries(10, None).unwrap();
    let ids: Vec<_> = rows.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["b", "c", "a"]);
}

#[test]
fn file_filter_limits_rows() {
    let db = TimelineDb::open_in_memory().unwrap();
    db.add_entry(&entry("a", "2026-01-01T00:00:01Z", "/tmp/x", None)).unwrap();
    db.add_entry(&entry("b", "2026-01-01T00:00:02Z", "/tmp/y", None)).unwrap();

    let rows = db.entries(10, Some("/tmp/y")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "b");
}

#[test]
fn entry_lookup_round_trips() {
    let db = TimelineDb::open_in_memory().unwrap();
    let original = entry("a", "2026-01-01T00:00:01Z", "/tmp/x", Some("deadbeefdeadbeef"));
    db.add_entry(&original).unwrap();

    assert_eq!(db.entry("a").unwrap(), Some(original));
    assert_eq!(db.entry("missing").unwrap(), None);
}

#[test]
fn checkpoint_lookup_by_name_or_id() {
    let db = TimelineDb::open_in_memory().unwrap();
    let row = CheckpointRow {
        id: "ck1".to_string(),
        name: "before-refactor".to_string(),
        timestamp: "2026-01-01T00:00:01Z".to_string(),
        description: String::new(),
        entry_ids: vec!["a".to_string(), "b".to_string()],
    };
    db.add_checkpoint(&row).unwrap();

    assert_eq!(db.checkpoint("ck1").unwrap(), Some(row.clone()));
    assert_eq!(db.checkpoint("before-refactor").unwrap(), Some(row));
    assert_eq!(db.checkpoint("nope").unwrap(), None);
}

#[test]
fn prune_keeps_checkpoint_rows() {
    let db = TimelineDb::open_in_memory().unwrap();
    db.add_entry(&entry("old", "2020-01-01T00:00:00Z", "/tmp/x", None)).unwrap();
    let mut ck = entry("ck", "2020-01-01T00:00:00Z", "", None);
    ck.change_type = ChangeKind::Checkpoint;
    db.add_entry(&ck).unwrap();
    db.add_entry(&entry("new", "2030-01-01T00:00:00Z", "/tmp/x", None)).unwrap();

    let removed = db.prune_entries("2026-01-01T00:00:00Z").unwrap();
    assert_eq!(removed, 1);

    let ids: Vec<_> = db.entries(10, None).unwrap().into_iter().map(|e| e.id).collect();
    assert!(ids.contains(&"ck".to_string()));
    assert!(ids.contains(&"new".to_string()));
}

#[test]
fn live_hashes_collects_distinct_set() {
    let db = TimelineDb::open_in_memory().unwrap();
    db.add_entry(&entry("a", "2026-01-01T00:00:01Z", "/tmp/x", Some("h1"))).unwrap();
    db.add_entry(&entry("b", "2026-01-01T00:00:02Z", "/tmp/y", Some("h1"))).unwrap();
    db.add_entry(&entry("c", "2026-01-01T00:00:03Z", "/tmp/z", Some("h2"))).unwrap();
    db.add_entry(&entry("d", "2026-01-01T00:00:04Z", "/tmp/w", None)).unwrap();

    let live = db.live_hashes().unwrap();
    assert_eq!(live.len(), 2);
    assert!(live.contains("h1") && live.contains("h2"));
}
