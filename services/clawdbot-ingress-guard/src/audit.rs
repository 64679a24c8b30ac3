// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Security event logging.
//!
//! Verifiers and the rate limiter report every decision to a
//! [`SecurityEventSink`] handed to them at construction. Recording is
//! fire-and-forget: a sink must never block or fail the request path.

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
}

/// Which guard produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    RateLimit,
}

/// One security decision.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub kind: EventKind,
    pub source: EventSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn success(source: EventSource, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Success,
            source,
            code: None,
            identifier: None,
            message: message.into(),
            details: None,
            at,
        }
    }

    pub fn failure(
        source: EventSource,
        code: ErrorCode,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: EventKind::Failure,
            source,
            code: Some(code),
            identifier: None,
            message: message.into(),
            details: None,
            at,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_details(mut self, details: Option<serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

/// Destination for security events.
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Write an event through `tracing`: failures at warn, successes at debug.
pub fn emit(event: &SecurityEvent) {
    let code = event.code.map(|c| c.as_str());
    let details = event.details.as_ref().map(|d| d.to_string());
    match event.kind {
        EventKind::Failure => warn!(
            source = ?event.source,
            code,
            identifier = event.identifier.as_deref(),
            details = details.as_deref(),
            "{}",
            event.message
        ),
        EventKind::Success => debug!(
            source = ?event.source,
            identifier = event.identifier.as_deref(),
            "{}",
            event.message
        ),
    }
}

/// Synchronous sink writing straight to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl SecurityEventSink for TracingSink {
    fn record(&self, event: SecurityEvent) {
        emit(&event);
    }
}

/// Sink that hands events to a background task over a bounded channel.
///
/// When the channel is full or the consumer has stopped, the event is
/// written directly through `tracing` instead of being dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SecurityEvent>,
}

impl ChannelSink {
    /// Create the sink and spawn its consumer on the current runtime.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SecurityEvent>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                emit(&event);
            }
        });
        (Self { tx }, handle)
    }
}

impl SecurityEventSink for ChannelSink {
    fn record(&self, event: SecurityEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => emit(&event),
        }
    }
}

/// Sink that keeps events in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl SecurityEventSink for MemorySink {
    fn record(&self, event: SecurityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
