// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the ingress guard service.
//!
//! The service terminates Clawdbot gateway webhooks and answers rate limit
//! probes from a fronting proxy.

use crate::config::Config;
use crate::dispatch::{WebhookDispatcher, WebhookSecrets};
use crate::error::{ErrorBody, ErrorCode, VerificationResult};
use crate::identity::request_ip;
use crate::limiter::{LimitType, RateLimitResult, RateLimiter};
use crate::metrics::GuardMetrics;
use crate::middleware::{with_rate_limit, RateLimitGuard, RateLimitOptions};
use crate::signature::SIGNATURE_HEADER;
use crate::timestamp::RawTimestamp;
use crate::webhook::{SignedRequest, WebhookVerifier};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared application state.
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub verifier: WebhookVerifier,
    pub secrets: Arc<dyn WebhookSecrets>,
    pub dispatcher: Arc<dyn WebhookDispatcher>,
    pub metrics: Option<GuardMetrics>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Rate limit probe request (for external validation).
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(rename = "type")]
    pub limit_type: LimitType,
    pub identifier: String,
}

/// Rate limit probe response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Acknowledgement for an accepted webhook.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "clawdbot-ingress-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Count one request for `(type, identifier)` and report the decision.
///
/// Called by Envoy or another reverse proxy before forwarding. Refusals are
/// returned with status 200 so the proxy can read the body.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckRequest>,
) -> Response {
    debug!(
        limit_type = %req.limit_type,
        identifier = %req.identifier,
        "Processing rate limit check"
    );

    let outcome = match state.limiter.evaluate(req.limit_type, &req.identifier).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Rate limit check failed");
            record_decision(&state, req.limit_type, "error");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::new(
                    ErrorCode::RateLimitUnavailable,
                    "Rate limiting is temporarily unavailable.",
                )),
            )
                .into_response();
        }
    };

    let response = match outcome {
        RateLimitResult::Allowed(d) => {
            record_decision(&state, req.limit_type, "allowed");
            CheckResponse {
                allowed: true,
                reason: None,
                limit: Some(d.limit),
                remaining: Some(d.remaining),
                reset_at: Some(d.reset_at),
                retry_after_secs: None,
            }
        }
        RateLimitResult::Limited(d) => {
            record_decision(&state, req.limit_type, "limited");
            info!(
                limit_type = %req.limit_type,
                identifier = %req.identifier,
                "Request rate limited"
            );
            CheckResponse {
                allowed: false,
                reason: Some(ErrorCode::RateLimitExceeded),
                limit: Some(d.limit),
                remaining: Some(d.remaining),
                reset_at: Some(d.reset_at),
                retry_after_secs: d.retry_after_secs,
            }
        }
        RateLimitResult::Blocked { until } => {
            record_decision(&state, req.limit_type, "blocked");
            CheckResponse {
                allowed: false,
                reason: Some(ErrorCode::Blocked),
                limit: None,
                remaining: None,
                reset_at: Some(until),
                retry_after_secs: None,
            }
        }
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Verify and dispatch one gateway webhook.
///
/// The body is taken as raw bytes so the signature is checked against
/// exactly what the gateway sent.
pub async fn clawdbot_webhook(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // No loopback substitute here: an unnamed client is a missing source IP.
    let source_ip = request_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr.ip()));
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let secret = state.secrets.secret_for(&tenant_id).unwrap_or_default();

    let event: Option<serde_json::Value> = serde_json::from_slice(&body).ok();
    let timestamp = event
        .as_ref()
        .and_then(|e| e.get("timestamp"))
        .and_then(RawTimestamp::from_json);

    let request = SignedRequest {
        payload: &body,
        signature,
        secret: &secret,
        timestamp,
        source_ip: source_ip.as_deref(),
    };

    let result = state.verifier.verify(&request, &tenant_id);
    if let Some(metrics) = &state.metrics {
        metrics.record_verification(result.code());
    }

    if let VerificationResult::Invalid(err) = &result {
        let status = match err.code() {
            ErrorCode::InvalidSourceIp => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };
        return (status, Json(ErrorBody::from(err))).into_response();
    }

    let event = event.unwrap_or(serde_json::Value::Null);
    match state.dispatcher.dispatch(&tenant_id, event).await {
        Ok(()) => (StatusCode::OK, Json(WebhookAck { received: true })).into_response(),
        Err(e) => {
            warn!(tenant_id = %tenant_id, error = %e, "Webhook dispatch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(
                    ErrorCode::DispatchFailed,
                    "Webhook could not be processed.",
                )),
            )
                .into_response()
        }
    }
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn record_decision(state: &AppState, limit_type: LimitType, outcome: &str) {
    if let Some(metrics) = &state.metrics {
        metrics.record_decision(limit_type, outcome);
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let webhook_guard = RateLimitGuard::new(state.limiter.clone(), RateLimitOptions::webhook())
        .with_metrics(state.metrics.clone());

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", post(check))
        .route(
            "/webhooks/clawdbot/:tenant_id",
            with_rate_limit(post(clawdbot_webhook), webhook_guard)
                .layer(DefaultBodyLimit::max(state.config.webhook.max_body_bytes)),
        );

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
