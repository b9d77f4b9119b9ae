// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dock bridge: request/response rendezvous between the HTTP layer and an
//! in-session MCP worker.
//!
//! Each session of kind `dock` owns one bridge: a bounded FIFO the worker
//! drains via long-poll, and a pending map correlating responses back to
//! the waiting HTTP caller by request id. Every request is delivered to at
//! most one `next` caller; every response resolves at most one waiter; a
//! timeout always removes its pending entry.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::MeshError;

/// FIFO capacity before `enqueue` fails with `QueueFull`.
pub const QUEUE_CAPACITY: usize = 32;

/// Default wait for a worker response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Kinds of work a dock worker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DockRequestKind {
    List,
    Dispatch,
    MultiEdit,
}

/// A request queued for the dock worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockRequest {
    pub id: String,
    pub kind: DockRequestKind,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A worker's answer, correlated by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Per-session bridge between HTTP callers and the dock worker.
pub struct DockBridge {
    queue_tx: mpsc::Sender<DockRequest>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<DockRequest>>,
    pending: Mutex<HashMap<String, oneshot::Sender<DockResponse>>>,
    timeout: Duration,
}

impl DockBridge {
    pub fn new(timeout: Duration) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Queue a request and wait for its response.
    ///
    /// Fails fast with `QueueFull` when the FIFO is saturated and with
    /// `Timeout` when the worker does not respond in time or the session is
    /// cancelled; both paths remove the pending entry.
    pub async fn enqueue(
        &self,
        cancel: &CancellationToken,
        request: DockRequest,
    ) -> Result<DockResponse, MeshError> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        // Removes the entry on every exit path, including this future being
        // dropped mid-wait; a successful respond() has already removed it,
        // making the cleanup a no-op.
        let _guard = PendingGuard { pending: &self.pending, id: &id };

        if self.queue_tx.try_send(request).is_err() {
            return Err(MeshError::QueueFull);
        }

        tokio::select! {
            response = rx => response.map_err(|_| MeshError::Timeout),
            _ = tokio::time::sleep(self.timeout) => Err(MeshError::Timeout),
            _ = cancel.cancelled() => Err(MeshError::Timeout),
        }
    }

    /// Block until a request is available or `cancel` fires.
    ///
    /// Requests are handed to exactly one caller.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<DockRequest> {
        let mut rx = self.queue_rx.lock().await;
        tokio::select! {
            request = rx.recv() => request,
            _ = cancel.cancelled() => None,
        }
    }

    /// Deliver a worker response to its waiter.
    pub fn respond(&self, response: DockResponse) -> Result<(), MeshError> {
        let Some(tx) = self.pending.lock().remove(&response.id) else {
            return Err(MeshError::RequestGone);
        };
        // The waiter may have timed out between removal and send; the entry
        // is already gone either way.
        let _ = tx.send(response);
        Ok(())
    }

    /// Number of requests awaiting responses.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for DockBridge {
    fn default() -> Self {
        Self::new(RESPONSE_TIMEOUT)
    }
}

struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<String, oneshot::Sender<DockResponse>>>,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

#[cfg(test)]
#[path = "dock_tests.rs"]
mod tests;
