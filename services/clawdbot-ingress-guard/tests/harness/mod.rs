// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the ingress guard.
//!
//! Builds the full service router on a manual clock and in-memory store,
//! plus dashboard routes guarded the way an application would guard them.

#![allow(dead_code)]

pub mod attacks;
pub mod generators;
pub mod metrics;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    response::Response,
    routing::{get, post},
    Router,
};
use clawdbot_ingress_guard::{
    audit::MemorySink,
    clock::{Clock, ManualClock},
    config::Config,
    dispatch::{StaticWebhookSecrets, WebhookDispatcher},
    error::DispatchError,
    handlers::{router, AppState},
    identity::TrustedHeaderSession,
    limiter::{LimitType, RateLimiter},
    metrics::GuardMetrics,
    signature::{sign_payload, SIGNATURE_HEADER},
    source_ip::{IpAllowlist, StaticAllowlist},
    store::MemoryCounterStore,
    webhook::WebhookVerifier,
    with_rate_limit, RateLimitGuard, RateLimitOptions,
};
use std::sync::{Arc, Mutex};

pub const NOW_MS: i64 = 1_700_000_000_000;
pub const NOW_SECS: i64 = NOW_MS / 1000;
pub const TENANT: &str = "acme";
pub const SECRET: &str = "acme-webhook-secret";
pub const SESSION_HEADER: &str = "x-tenant-id";

/// Dispatcher that remembers what it was handed.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingDispatcher {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookDispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        tenant_id: &str,
        event: serde_json::Value,
    ) -> Result<(), DispatchError> {
        self.events
            .lock()
            .unwrap()
            .push((tenant_id.to_string(), event));
        Ok(())
    }
}

/// Fully wired service for one test.
pub struct TestApp {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryCounterStore>,
    pub limiter: Arc<RateLimiter>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub events: Arc<MemorySink>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Config::default(), IpAllowlist::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, IpAllowlist::default())
    }

    pub fn with_allowlist(allowlist: IpAllowlist) -> Self {
        Self::build(Config::default(), allowlist)
    }

    pub fn build(config: Config, allowlist: IpAllowlist) -> Self {
        let clock = Arc::new(ManualClock::at_millis(NOW_MS));
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let store = Arc::new(MemoryCounterStore::with_clock(shared_clock.clone()));
        let events = Arc::new(MemorySink::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let limiter = Arc::new(
            RateLimiter::new(config.rate_limit.clone(), store.clone(), store.clone())
                .with_clock(shared_clock.clone())
                .with_events(events.clone()),
        );
        let verifier = WebhookVerifier::new(
            config.webhook.timestamp_policy(),
            Arc::new(StaticAllowlist::new(allowlist)),
            shared_clock,
            events.clone(),
        );

        let state = Arc::new(AppState {
            limiter: limiter.clone(),
            verifier,
            secrets: Arc::new(StaticWebhookSecrets::new(None).with_tenant(TENANT, SECRET)),
            dispatcher: dispatcher.clone(),
            metrics: GuardMetrics::new().ok(),
            config,
        });

        let router = router(state).merge(dashboard_routes(limiter.clone()));

        Self {
            clock,
            store,
            limiter,
            dispatcher,
            events,
            router,
        }
    }

    pub async fn send(&self, request: Request) -> Response {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Dashboard API guarded per endpoint class.
fn dashboard_routes(limiter: Arc<RateLimiter>) -> Router {
    let sessions = Arc::new(TrustedHeaderSession::new(SESSION_HEADER));
    let read = RateLimitGuard::new(limiter.clone(), RateLimitOptions::new(LimitType::ApiRead))
        .with_sessions(sessions.clone());
    let write = RateLimitGuard::new(limiter.clone(), RateLimitOptions::new(LimitType::ApiWrite))
        .with_sessions(sessions);
    let auth = RateLimitGuard::new(limiter, RateLimitOptions::auth_by_email());

    Router::new()
        .route(
            "/api/conversations",
            with_rate_limit(get(|| async { "[]" }), read)
                .merge(with_rate_limit(post(|| async { "created" }), write)),
        )
        .route(
            "/auth/login",
            with_rate_limit(post(|body: String| async move { body }), auth),
        )
}

/// Webhook body carrying `timestamp`.
pub fn webhook_body(timestamp: serde_json::Value) -> String {
    serde_json::json!({
        "event": "conversation.message",
        "conversationId": "c-123",
        "timestamp": timestamp,
    })
    .to_string()
}

/// POST to the tenant's webhook route, signed with `secret` when given.
pub fn webhook_request(tenant: &str, body: &str, secret: Option<&str>, ip: &str) -> Request {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhooks/clawdbot/{tenant}"))
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip);
    if let Some(secret) = secret {
        builder = builder.header(SIGNATURE_HEADER, sign_payload(body.as_bytes(), secret).unwrap());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Signed webhook carrying no proxy header, as from a proxy that hides the sender.
pub fn unsourced_webhook_request(body: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/clawdbot/{TENANT}"))
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign_payload(body.as_bytes(), SECRET).unwrap())
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Webhook with a raw signature header value.
pub fn webhook_with_signature(body: &str, signature: &str, ip: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri(format!("/webhooks/clawdbot/{TENANT}"))
        .header("x-forwarded-for", ip)
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn api_get(ip: &str, tenant: Option<&str>) -> Request {
    let mut builder = Request::builder()
        .uri("/api/conversations")
        .header("x-forwarded-for", ip);
    if let Some(tenant) = tenant {
        builder = builder.header(SESSION_HEADER, tenant);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn api_post(ip: &str, tenant: Option<&str>) -> Request {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/conversations")
        .header("x-forwarded-for", ip);
    if let Some(tenant) = tenant {
        builder = builder.header(SESSION_HEADER, tenant);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn login(ip: &str, email: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(
            serde_json::json!({ "email": email, "password": "hunter2" }).to_string(),
        ))
        .unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap().to_string())
}
