// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn headers_with(cookie: Option<&str>, header: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = cookie {
        if let Ok(v) = HeaderValue::from_str(&format!("{CSRF_COOKIE}={cookie}")) {
            headers.insert(COOKIE, v);
        }
    }
    if let Some(header) = header {
        if let Ok(v) = HeaderValue::from_str(header) {
            headers.insert(CSRF_HEADER, v);
        }
    }
    headers
}

#[test]
fn constant_time_eq_behaves() {
    assert!(constant_time_eq("abc", "abc"));
    assert!(!constant_time_eq("abc", "abd"));
    assert!(!constant_time_eq("abc", "abcd"));
}

#[test]
fn cookie_parsing_finds_the_token_among_others() {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&format!("theme=dark; {CSRF_COOKIE}=tok123; lang=en")) {
        headers.insert(COOKIE, v);
    }
    assert_eq!(cookie_token(&headers).as_deref(), Some("tok123"));
}

#[test]
fn matching_header_passes() {
    let headers = headers_with(Some("tok"), Some("tok"));
    assert!(validate_double_submit(&headers, None).is_ok());
}

#[test]
fn query_token_substitutes_for_header() {
    let headers = headers_with(Some("tok"), None);
    assert!(validate_double_submit(&headers, Some("tok")).is_ok());
}

#[test]
fn mismatch_and_absence_are_forbidden() {
    let headers = headers_with(Some("tok"), Some("other"));
    assert_eq!(validate_double_submit(&headers, None), Err(MeshError::Forbidden));

    let headers = headers_with(Some("tok"), None);
    assert_eq!(validate_double_submit(&headers, None), Err(MeshError::Forbidden));

    let headers = headers_with(None, Some("tok"));
    assert_eq!(validate_double_submit(&headers, None), Err(MeshError::Forbidden));
}
