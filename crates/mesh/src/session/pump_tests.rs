// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::MockAdapter;
use crate::broadcast::{EventBroadcaster, EventFilter};
use crate::event::EventPayload;
use crate::session::SessionConfig;
use std::sync::Arc;

fn record_with_broadcaster() -> (Arc<SessionRecord>, Arc<EventBroadcaster>) {
    let broadcaster = Arc::new(EventBroadcaster::new(64, 64));
    let record = SessionRecord::new(
        "s1",
        SessionConfig::new("mock"),
        Arc::new(MockAdapter::new("s1")),
        Arc::clone(&broadcaster),
        None,
    );
    (record, broadcaster)
}

#[tokio::test]
async fn pump_applies_and_forwards_events() {
    let (record, broadcaster) = record_with_broadcaster();
    let mut sub = broadcaster.subscribe(EventFilter::Session("s1".into()), 16);
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    let _ = tx.send(AgentEvent::now("s1", EventPayload::Output { content: "hi".into() })).await;
    drop(tx);

    let exit = event_pump(&record, &mut rx).await;
    assert!(matches!(exit, PumpExit::ChannelClosed));

    // The event reached the broadcaster with a seq assigned...
    let forwarded = sub.rx.recv().await;
    assert!(matches!(forwarded, Some(ref e) if e.seq > 0 && e.kind() == "output"));
    // ...and was folded into the record.
    assert_eq!(record.status().await.last_output, "hi");
}

#[tokio::test]
async fn cancellation_drains_queued_events() {
    let (record, _broadcaster) = record_with_broadcaster();
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);

    let _ = tx.send(AgentEvent::now("s1", EventPayload::Output { content: "tail".into() })).await;
    record.cancel.cancel();

    let exit = event_pump(&record, &mut rx).await;
    assert!(matches!(exit, PumpExit::Cancelled));
    assert_eq!(record.status().await.last_output, "tail");
    drop(tx);
}

#[tokio::test]
async fn adapter_status_change_moves_the_machine_when_legal() {
    let (record, _broadcaster) = record_with_broadcaster();
    let _ = record.transition(SessionPhase::Starting, "t").await;
    let _ = record.transition(SessionPhase::Running, "t").await;

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let _ = tx
        .send(AgentEvent::now(
            "s1",
            EventPayload::StatusChange {
                old: "running".into(),
                new: "paused".into(),
                reason: "provider paused itself".into(),
            },
        ))
        .await;
    drop(tx);

    let _ = event_pump(&record, &mut rx).await;
    assert_eq!(record.phase().await, SessionPhase::Paused);
}

#[tokio::test]
async fn illegal_adapter_status_change_is_ignored() {
    let (record, _broadcaster) = record_with_broadcaster();

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let _ = tx
        .send(AgentEvent::now(
            "s1",
            EventPayload::StatusChange {
                old: "created".into(),
                new: "stopped".into(),
                reason: String::new(),
            },
        ))
        .await;
    drop(tx);

    let _ = event_pump(&record, &mut rx).await;
    assert_eq!(record.phase().await, SessionPhase::Created);
}
