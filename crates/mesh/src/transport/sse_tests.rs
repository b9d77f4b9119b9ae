// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::HeaderValue;

#[test]
fn last_event_id_prefers_the_header() {
    let mut headers = HeaderMap::new();
    headers.insert("last-event-id", HeaderValue::from_static("41"));
    let query = SseQuery { last_event_id: Some("7".into()) };
    assert_eq!(last_event_id(&headers, &query), Some(41));
}

#[test]
fn last_event_id_falls_back_to_query() {
    let headers = HeaderMap::new();
    let query = SseQuery { last_event_id: Some("7".into()) };
    assert_eq!(last_event_id(&headers, &query), Some(7));
}

#[test]
fn unparseable_last_event_id_is_ignored() {
    let mut headers = HeaderMap::new();
    headers.insert("last-event-id", HeaderValue::from_static("not-a-number"));
    let query = SseQuery { last_event_id: None };
    assert_eq!(last_event_id(&headers, &query), None);
}

#[test]
fn metadata_values_are_sanitized() -> anyhow::Result<()> {
    let sanitizer = crate::sanitize::Sanitizer::new()?;
    let event = AgentEvent::now(
        "s1",
        EventPayload::Metadata {
            key: "note".into(),
            value: serde_json::json!("<b>hi</b> Bearer abc123"),
        },
    );
    let cleaned = sanitize(&sanitizer, event);
    match cleaned.payload {
        EventPayload::Metadata { value, .. } => {
            assert_eq!(value, serde_json::json!("hi [redacted]"));
        }
        other => unreachable!("expected metadata, got {other:?}"),
    }
    Ok(())
}

#[test]
fn non_string_metadata_passes_through() -> anyhow::Result<()> {
    let sanitizer = crate::sanitize::Sanitizer::new()?;
    let event = AgentEvent::now(
        "s1",
        EventPayload::Metadata { key: "n".into(), value: serde_json::json!(42) },
    );
    let cleaned = sanitize(&sanitizer, event);
    match cleaned.payload {
        EventPayload::Metadata { value, .. } => assert_eq!(value, serde_json::json!(42)),
        other => unreachable!("expected metadata, got {other:?}"),
    }
    Ok(())
}
