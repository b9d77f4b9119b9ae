// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::{AgentAdapter, MockAdapter};
use crate::terminal::ControlSignal;

fn hub() -> Arc<TerminalHub> {
    TerminalHub::new("t1", "s1", TerminalKind::Pty, None)
}

fn hub_with_adapter() -> (Arc<TerminalHub>, Arc<MockAdapter>) {
    let adapter = Arc::new(MockAdapter::new("s1").with_terminal());
    let hub = TerminalHub::new(
        "t1",
        "s1",
        TerminalKind::Pty,
        Some(Arc::clone(&adapter) as Arc<dyn AgentAdapter>),
    );
    (hub, adapter)
}

fn snapshot_update(rows: u16, cols: u16, lines: Vec<&str>) -> TerminalUpdate {
    TerminalUpdate::Snapshot {
        seq: 0,
        rows,
        cols,
        lines: lines.into_iter().map(String::from).collect(),
    }
}

#[tokio::test]
async fn late_joiner_is_primed_with_current_snapshot() {
    let hub = hub();
    hub.publish(snapshot_update(2, 2, vec!["hi", ""]));

    let mut rx = hub.subscribe(8);
    let first = rx.recv().await;
    match first {
        Some(TerminalUpdate::Snapshot { rows, cols, lines, seq }) => {
            assert_eq!((rows, cols), (2, 2));
            assert_eq!(lines, vec!["hi".to_owned(), String::new()]);
            assert_eq!(seq, 1);
        }
        other => unreachable!("expected snapshot prime, got {other:?}"),
    }
}

#[tokio::test]
async fn joiner_without_snapshot_gets_blank_shape() {
    let hub = hub();
    let mut rx = hub.subscribe(8);
    match rx.recv().await {
        Some(TerminalUpdate::Snapshot { rows, cols, lines, .. }) => {
            assert_eq!((rows, cols), (24, 80));
            assert_eq!(lines.len(), 24);
            assert!(lines.iter().all(String::is_empty));
        }
        other => unreachable!("expected blank prime, got {other:?}"),
    }
}

#[tokio::test]
async fn seq_is_monotonic_across_update_kinds() {
    let hub = hub();
    let s1 = hub.publish(snapshot_update(2, 2, vec!["ab", "cd"]));
    let s2 = hub.publish(TerminalUpdate::Bell { seq: 0 });
    let s3 = hub.publish(TerminalUpdate::Cursor { seq: 0, row: 1, col: 0, visible: true });
    assert_eq!((s1, s2, s3), (1, 2, 3));
    assert_eq!(hub.record().last_seq, 3);
}

#[tokio::test]
async fn diff_is_coalesced_into_prime_snapshot() {
    let hub = hub();
    hub.publish(snapshot_update(2, 5, vec!["aaaaa", "bbbbb"]));
    hub.publish(TerminalUpdate::Diff {
        seq: 0,
        x0: 1,
        y0: 0,
        x1: 3,
        y1: 0,
        lines: vec!["xyz".into()],
    });

    // A new subscriber sees one snapshot with the diff already applied.
    let mut rx = hub.subscribe(8);
    match rx.recv().await {
        Some(TerminalUpdate::Snapshot { lines, .. }) => {
            assert_eq!(lines[0], "axyza");
            assert_eq!(lines[1], "bbbbb");
        }
        other => unreachable!("expected coalesced prime, got {other:?}"),
    }
}

#[tokio::test]
async fn diff_out_of_bounds_is_clamped() {
    let hub = hub();
    hub.publish(snapshot_update(2, 2, vec!["hi", ""]));
    // Region (0,0)-(10,1) on a 2x2 screen.
    hub.publish(TerminalUpdate::Diff {
        seq: 0,
        x0: 0,
        y0: 0,
        x1: 10,
        y1: 1,
        lines: vec!["world".into()],
    });
    let snapshot = hub.snapshot();
    assert_eq!(snapshot.lines[0], "wo");
    assert_eq!(snapshot.lines[1], "");
}

#[tokio::test]
async fn live_subscriber_receives_updates_after_prime() {
    let hub = hub();
    hub.publish(snapshot_update(2, 2, vec!["hi", ""]));

    let mut rx = hub.subscribe(8);
    let _prime = rx.recv().await;

    hub.publish(TerminalUpdate::Diff {
        seq: 0,
        x0: 0,
        y0: 0,
        x1: 1,
        y1: 0,
        lines: vec!["yo".into()],
    });
    match rx.recv().await {
        Some(TerminalUpdate::Diff { seq, .. }) => assert_eq!(seq, 2),
        other => unreachable!("expected live diff, got {other:?}"),
    }
}

#[tokio::test]
async fn bell_and_cursor_are_not_stored() {
    let hub = hub();
    hub.publish(TerminalUpdate::Bell { seq: 0 });
    hub.publish(TerminalUpdate::Cursor { seq: 0, row: 3, col: 4, visible: false });
    assert!(hub.record().last_snapshot.is_none());
}

#[tokio::test]
async fn saturated_subscriber_drops_only_for_itself() {
    let hub = hub();
    let _slow = hub.subscribe(1); // prime fills the queue
    let mut fast = hub.subscribe(16);
    let _prime = fast.recv().await;

    for _ in 0..4 {
        hub.publish(TerminalUpdate::Bell { seq: 0 });
    }

    let mut received = 0;
    while let Ok(update) = fast.try_recv() {
        assert!(matches!(update, TerminalUpdate::Bell { .. }));
        received += 1;
    }
    assert_eq!(received, 4);
    assert_eq!(hub.dropped_count(), 4);
}

#[tokio::test]
async fn input_forwards_to_adapter_surface() -> anyhow::Result<()> {
    let (hub, adapter) = hub_with_adapter();
    hub.handle_input(TerminalInput::Text { text: "ls\n".into() }, false).await?;
    hub.handle_input(TerminalInput::Control { signal: ControlSignal::Eof }, false).await?;
    assert_eq!(adapter.terminal_inputs().len(), 2);
    Ok(())
}

#[tokio::test]
async fn raw_input_requires_opt_in() {
    let (hub, _adapter) = hub_with_adapter();
    let raw = TerminalInput::Raw { bytes: vec![0x1b, 0x5b] };
    assert_eq!(hub.handle_input(raw.clone(), false).await, Err(MeshError::Forbidden));
    assert!(hub.handle_input(raw, true).await.is_ok());
}

#[tokio::test]
async fn input_without_surface_is_unsupported() {
    let hub = hub();
    let result = hub.handle_input(TerminalInput::Text { text: "x".into() }, false).await;
    assert_eq!(result, Err(MeshError::TerminalNotSupported));
}

#[tokio::test]
async fn subscriber_count_tracks_disconnects() {
    let hub = hub();
    let rx = hub.subscribe(4);
    assert_eq!(hub.subscriber_count(), 1);
    drop(rx);
    assert_eq!(hub.subscriber_count(), 0);
}
