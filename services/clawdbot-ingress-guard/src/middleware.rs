// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Rate limiting as axum middleware.
//!
//! A [`RateLimitGuard`] wraps a single route with [`with_rate_limit`] or a
//! whole router with [`RateLimitGuard::apply`]. Per request it runs the skip
//! predicate, resolves the identifier, checks blocks and quota, and merges
//! the `X-RateLimit-*` headers onto whatever the handler returns.

use crate::error::{ErrorBody, ErrorCode};
use crate::identity::{resolve_identifier, EmailFromJsonBody, IdentifierResolver, SessionResolver};
use crate::limiter::{LimitType, RateLimitDecision, RateLimitResult, RateLimiter};
use crate::metrics::GuardMetrics;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
    Json, Router,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Predicate exempting a request from rate limiting.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// How a route is limited.
#[derive(Clone)]
pub struct RateLimitOptions {
    limit_type: LimitType,
    identifier: Option<Arc<dyn IdentifierResolver>>,
    skip: Option<SkipFn>,
    use_session: bool,
}

impl RateLimitOptions {
    /// Limit by session tenant, falling back to client IP.
    pub fn new(limit_type: LimitType) -> Self {
        Self {
            limit_type,
            identifier: None,
            skip: None,
            use_session: true,
        }
    }

    /// Login endpoints, keyed by the attempted identity.
    ///
    /// Requests where the resolver finds nothing are keyed by IP.
    pub fn auth(resolver: Arc<dyn IdentifierResolver>) -> Self {
        Self::new(LimitType::Auth).with_identifier(resolver)
    }

    /// Login endpoints keyed by the `email` field of a JSON body.
    pub fn auth_by_email() -> Self {
        Self::auth(Arc::new(EmailFromJsonBody::default()))
    }

    /// Gateway webhooks, keyed by client IP only.
    pub fn webhook() -> Self {
        Self {
            use_session: false,
            ..Self::new(LimitType::Webhook)
        }
    }

    pub fn with_identifier(mut self, resolver: Arc<dyn IdentifierResolver>) -> Self {
        self.identifier = Some(resolver);
        self
    }

    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }
}

impl std::fmt::Debug for RateLimitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitOptions")
            .field("limit_type", &self.limit_type)
            .field("identifier", &self.identifier.is_some())
            .field("skip", &self.skip.is_some())
            .field("use_session", &self.use_session)
            .finish()
    }
}

/// Middleware state: limiter, options and optional collaborators.
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    options: RateLimitOptions,
    sessions: Option<Arc<dyn SessionResolver>>,
    metrics: Option<GuardMetrics>,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, options: RateLimitOptions) -> Self {
        Self {
            limiter,
            options,
            sessions: None,
            metrics: None,
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionResolver>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_metrics(mut self, metrics: Option<GuardMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Apply the guard to every route of a router.
    pub fn apply<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, rate_limit))
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_decision(self.options.limit_type, outcome);
        }
    }
}

impl std::fmt::Debug for RateLimitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitGuard")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Wrap one route handler with a rate limit.
pub fn with_rate_limit<S>(route: MethodRouter<S>, guard: RateLimitGuard) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route.layer(middleware::from_fn_with_state(guard, rate_limit))
}

/// The middleware function behind [`with_rate_limit`] and [`RateLimitGuard::apply`].
pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(skip) = &guard.options.skip {
        if skip(&request) {
            return next.run(request).await;
        }
    }

    let sessions = if guard.options.use_session {
        guard.sessions.as_deref()
    } else {
        None
    };
    let identifier =
        resolve_identifier(&mut request, guard.options.identifier.as_deref(), sessions).await;
    let limit_type = guard.options.limit_type;

    match guard.limiter.evaluate(limit_type, &identifier).await {
        Ok(RateLimitResult::Allowed(decision)) => {
            guard.record("allowed");
            let response = next.run(request).await;
            with_headers(response, &decision)
        }
        Ok(RateLimitResult::Limited(decision)) => {
            guard.record("limited");
            info!(
                limit_type = %limit_type,
                identifier = %identifier,
                retry_after_secs = ?decision.retry_after_secs,
                "Request rate limited"
            );
            let body = ErrorBody::new(
                ErrorCode::RateLimitExceeded,
                "Too many requests. Please try again later.",
            )
            .with_retry_after(decision.retry_after_secs.unwrap_or(1));
            with_headers(
                (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response(),
                &decision,
            )
        }
        Ok(RateLimitResult::Blocked { until }) => {
            guard.record("blocked");
            info!(identifier = %identifier, until = %until, "Blocked identifier rejected");
            (
                StatusCode::FORBIDDEN,
                Json(ErrorBody::new(
                    ErrorCode::Blocked,
                    "Access temporarily blocked due to suspicious activity.",
                )),
            )
                .into_response()
        }
        Err(e) => {
            guard.record("error");
            error!(limit_type = %limit_type, error = %e, "Rate limit check failed");
            if guard.limiter.config().fail_open {
                debug!(identifier = %identifier, "Failing open");
                next.run(request).await
            } else {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ErrorBody::new(
                        ErrorCode::RateLimitUnavailable,
                        "Rate limiting is temporarily unavailable.",
                    )),
                )
                    .into_response()
            }
        }
    }
}

fn with_headers(mut response: Response, decision: &RateLimitDecision) -> Response {
    let headers = response.headers_mut();
    for (name, value) in decision.headers() {
        headers.insert(name, value);
    }
    response
}
