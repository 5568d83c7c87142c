// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_notifier_records_calls() {
    let notifier = FakeNotifier::new();
    notifier.notify("Loop completed", "promise met after 3 iterations");

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "Loop completed");
    assert_eq!(calls[0].message, "promise met after 3 iterations");
}

#[test]
fn fake_notifier_clones_share_state() {
    let notifier = FakeNotifier::new();
    let clone = notifier.clone();
    clone.notify("a", "b");
    assert_eq!(notifier.calls().len(), 1);
}
