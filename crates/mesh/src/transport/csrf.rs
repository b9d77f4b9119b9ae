// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CSRF double-submit enforcement.
//!
//! Safe methods pass through and are issued the cookie when missing.
//! State-changing methods must present the cookie value again in the
//! `X-CSRF-Token` header. WebSocket upgrades cannot set custom headers from
//! browsers, so upgrade handlers validate a `csrf_token` query parameter
//! against the same cookie via [`validate_double_submit`].

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::MeshError;
use crate::state::MeshState;

/// Cookie carrying the double-submit token.
pub const CSRF_COOKIE: &str = "orbitmesh-csrf-token";

/// Header that must echo the cookie on state-changing requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Constant-time string comparison to prevent timing side channels.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Extract the CSRF cookie value from request headers.
pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(COOKIE) {
        let Ok(cookies) = value.to_str() else { continue };
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if let Some(token) = pair.strip_prefix(CSRF_COOKIE) {
                if let Some(token) = token.strip_prefix('=') {
                    return Some(token.to_owned());
                }
            }
        }
    }
    None
}

/// Validate the double-submit pair for a request: the cookie must exist and
/// match either the `X-CSRF-Token` header or the provided query token.
pub fn validate_double_submit(
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<(), MeshError> {
    let cookie = cookie_token(headers).ok_or(MeshError::Forbidden)?;
    let submitted = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query_token)
        .ok_or(MeshError::Forbidden)?;
    if constant_time_eq(&cookie, submitted) {
        Ok(())
    } else {
        Err(MeshError::Forbidden)
    }
}

/// Axum middleware enforcing the double-submit contract.
pub async fn csrf_layer(
    State(state): State<Arc<MeshState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.config.csrf_disabled {
        return next.run(req).await;
    }

    let safe = matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if safe {
        let had_cookie = cookie_token(req.headers()).is_some();
        let mut response = next.run(req).await;
        if !had_cookie {
            issue_cookie(&mut response);
        }
        return response;
    }

    if let Err(code) = validate_double_submit(req.headers(), None) {
        return code.to_http_response("csrf token missing or mismatched").into_response();
    }
    next.run(req).await
}

/// Attach a fresh token cookie to the response.
fn issue_cookie(response: &mut Response) {
    let token = uuid::Uuid::new_v4().to_string();
    let cookie = format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

#[cfg(test)]
#[path = "csrf_tests.rs"]
mod tests;
