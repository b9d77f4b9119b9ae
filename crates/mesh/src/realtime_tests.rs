// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    sessions_state = { "sessions.state" },
    terminals_state = { "terminals.state" },
    activity = { "sessions.activity:s1" },
    output = { "terminals.output:t9" },
)]
fn parse_roundtrips(name: &str) {
    let topic = match Topic::parse(name) {
        Some(t) => t,
        None => unreachable!("{name} should parse"),
    };
    assert_eq!(topic.name(), name);
}

#[parameterized(
    unknown = { "sessions" },
    empty_activity = { "sessions.activity:" },
    empty_output = { "terminals.output:" },
    garbage = { "!!" },
)]
fn invalid_topics_fail(name: &str) {
    assert!(Topic::parse(name).is_none());
}

#[test]
fn client_frames_deserialize() -> anyhow::Result<()> {
    let frame: ClientFrame =
        serde_json::from_str(r#"{"type":"subscribe","topics":["sessions.state"]}"#)?;
    assert!(matches!(frame, ClientFrame::Subscribe { ref topics } if topics.len() == 1));

    let frame: ClientFrame = serde_json::from_str(r#"{"type":"ping"}"#)?;
    assert!(matches!(frame, ClientFrame::Ping {}));
    Ok(())
}

#[test]
fn server_frames_carry_topic_and_payload() -> anyhow::Result<()> {
    let frame = ServerFrame::Event {
        topic: "sessions.state".into(),
        payload: serde_json::json!({"x": 1}),
    };
    let json = serde_json::to_value(&frame)?;
    assert_eq!(json["type"], "event");
    assert_eq!(json["topic"], "sessions.state");

    let err = serde_json::to_value(ServerFrame::error(None, "bad topic"))?;
    assert_eq!(err["type"], "error");
    assert!(err.get("topic").is_none());
    Ok(())
}
