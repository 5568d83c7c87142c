// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dl_core::ChangeKind;

fn open_store() -> (tempfile::TempDir, UndoStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = UndoStore::open(&dir.path().join("undo")).unwrap();
    (dir, store)
}

#[test]
fn record_then_restore_round_trips_bytes() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");
    std::fs::write(&file, "hello").unwrap();

    let entry = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();
    assert!(entry.backup_hash.is_some());

    // Mutate arbitrarily, then restore the recorded entry.
    std::fs::write(&file, "world").unwrap();
    let restored = store.restore_entry(&entry.id).unwrap();

    assert_eq!(restored, file);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
}

#[test]
fn two_contents_produce_two_blobs() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");

    std::fs::write(&file, "hello").unwrap();
    let first = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    std::fs::write(&file, "world").unwrap();
    let second = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    assert_ne!(first.backup_hash, second.backup_hash);

    // Restoring the first entry brings back the original content.
    store.restore_entry(&first.id).unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello");
}

#[test]
fn identical_checkpoints_share_a_hash() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");
    std::fs::write(&file, "same").unwrap();

    let a = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();
    let b = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    assert_eq!(a.backup_hash, b.backup_hash);
}

#[test]
fn oversized_file_recorded_without_hash() {
    let (dir, store) = open_store();
    let store = store.with_max_file_size(4);
    let file = dir.path().join("big");
    std::fs::write(&file, "more than four bytes").unwrap();

    let entry = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();
    assert!(entry.backup_hash.is_none());
    assert_eq!(entry.file_size, 20);
    assert!(matches!(store.restore_entry(&entry.id), Err(StoreError::NoBackup(_))));
}

#[test]
fn missing_file_is_dropped_silently() {
    let (dir, store) = open_store();
    let result = store.record_change(&dir.path().join("ghost"), ChangeKind::Edit).unwrap();
    assert!(result.is_none());
}

#[test]
fn delete_records_entry_without_backup() {
    let (dir, store) = open_store();
    let entry =
        store.record_change(&dir.path().join("gone"), ChangeKind::Delete).unwrap().unwrap();
    assert_eq!(entry.change_type, ChangeKind::Delete);
    assert!(entry.backup_hash.is_none());
    assert_eq!(entry.file_size, 0);
}

#[test]
fn named_checkpoint_captures_recent_entries() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");
    std::fs::write(&file, "v1").unwrap();
    let entry = store.record_change(&file, ChangeKind::Edit).unwrap().unwrap();

    let ck_id = store.add_checkpoint("before", "pre-change state").unwrap();

    let row = store.checkpoint("before").unwrap().unwrap();
    assert_eq!(row.id, ck_id);
    assert!(row.entry_ids.contains(&entry.id));

    // The checkpoint also appears as a timeline row.
    let head = store.entries(1, None).unwrap();
    assert_eq!(head[0].change_type, ChangeKind::Checkpoint);
}

#[test]
fn undo_last_skips_checkpoints_and_counts_restores() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");
    std::fs::write(&file, "v1").unwrap();
    store.record_change(&file, ChangeKind::Edit).unwrap();
    store.add_checkpoint("mark", "").unwrap();

    std::fs::write(&file, "v2").unwrap();
    let restored = store.undo_last(5).unwrap();

    assert_eq!(restored, 1);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "v1");
}

#[test]
fn prune_drops_expired_entries_and_orphan_blobs() {
    let (dir, store) = open_store();
    let file = dir.path().join("x");
    std::fs::write(&file, "hello").unwrap();
    store.record_change(&file, ChangeKind::Edit).unwrap();

    // Everything is fresh; a generous retention removes nothing.
    let stats = store.prune(chrono::Duration::days(7)).unwrap();
    assert_eq!(stats, PruneStats::default());

    // Zero retention removes the entry and its now-unreferenced blob.
    let stats = store.prune(chrono::Duration::zero()).unwrap();
    assert_eq!(stats.entries_removed, 1);
    assert_eq!(stats.blobs_removed, 1);
}
