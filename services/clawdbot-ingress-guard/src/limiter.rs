// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter for dashboard and webhook endpoints.
//!
//! Each `(limit type, identifier)` pair owns one counter in the shared
//! [`CounterStore`]. Blocks set by abuse detection are checked first, so a
//! blocked identifier never consumes quota.

use crate::audit::{EventSource, SecurityEvent, SecurityEventSink, TracingSink};
use crate::clock::{Clock, SystemClock};
use crate::config::{LimitPolicy, RateLimitConfig};
use crate::error::{ErrorCode, StoreError};
use crate::store::{BlockList, CounterStore};
use axum::http::{HeaderName, HeaderValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Endpoint class selecting the quota policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitType {
    ApiRead,
    ApiWrite,
    Webhook,
    Auth,
}

impl LimitType {
    pub const ALL: [LimitType; 4] = [
        LimitType::ApiRead,
        LimitType::ApiWrite,
        LimitType::Webhook,
        LimitType::Auth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiRead => "api-read",
            Self::ApiWrite => "api-write",
            Self::Webhook => "webhook",
            Self::Auth => "auth",
        }
    }

    /// Environment variables overriding `(max_requests, window_secs)`.
    pub(crate) fn env_vars(&self) -> (&'static str, &'static str) {
        match self {
            Self::ApiRead => ("RATE_LIMIT_API_READ_MAX", "RATE_LIMIT_API_READ_WINDOW_SECS"),
            Self::ApiWrite => ("RATE_LIMIT_API_WRITE_MAX", "RATE_LIMIT_API_WRITE_WINDOW_SECS"),
            Self::Webhook => ("RATE_LIMIT_WEBHOOK_MAX", "RATE_LIMIT_WEBHOOK_WINDOW_SECS"),
            Self::Auth => ("RATE_LIMIT_AUTH_MAX", "RATE_LIMIT_AUTH_WINDOW_SECS"),
        }
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LimitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LimitType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown limit type: {s}"))
    }
}

/// Address of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub limit_type: LimitType,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(limit_type: LimitType, identifier: impl Into<String>) -> Self {
        Self {
            limit_type,
            identifier: identifier.into(),
        }
    }

    /// Key in the counter store.
    pub fn store_key(&self, prefix: &str) -> String {
        format!("{}{}:{}", prefix, self.limit_type, self.identifier)
    }
}

/// Quota state for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn from_count(
        policy: LimitPolicy,
        count: u64,
        resets_in: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let limit = policy.max_requests;
        let allowed = count <= u64::from(limit);
        let remaining = u64::from(limit).saturating_sub(count) as u32;
        let reset_at = now
            + chrono::Duration::from_std(resets_in).unwrap_or_else(|_| chrono::Duration::zero());
        let retry_after_secs = (!allowed).then(|| ceil_secs(resets_in).max(1));

        Self {
            allowed,
            limit,
            remaining,
            reset_at,
            retry_after_secs,
        }
    }

    /// `X-RateLimit-*` headers, plus `Retry-After` when refused.
    pub fn headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![
            (
                HeaderName::from_static(HEADER_LIMIT),
                HeaderValue::from(self.limit),
            ),
            (
                HeaderName::from_static(HEADER_REMAINING),
                HeaderValue::from(self.remaining),
            ),
            (
                HeaderName::from_static(HEADER_RESET),
                HeaderValue::from(self.reset_at.timestamp()),
            ),
        ];
        if let Some(retry_after) = self.retry_after_secs {
            headers.push((
                HeaderName::from_static(HEADER_RETRY_AFTER),
                HeaderValue::from(retry_after),
            ));
        }
        headers
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Result of a full rate limit evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed(RateLimitDecision),
    /// Request exceeded its quota
    Limited(RateLimitDecision),
    /// Identifier is blocked by abuse detection
    Blocked {
        /// When the block expires
        until: DateTime<Utc>,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    pub fn decision(&self) -> Option<&RateLimitDecision> {
        match self {
            RateLimitResult::Allowed(d) | RateLimitResult::Limited(d) => Some(d),
            RateLimitResult::Blocked { .. } => None,
        }
    }
}

/// Thread-safe rate limiter over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    /// Configuration
    config: RateLimitConfig,
    /// Shared window counters
    counters: Arc<dyn CounterStore>,
    /// Abuse-detection blocks
    blocks: Arc<dyn BlockList>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SecurityEventSink>,
}

impl RateLimiter {
    /// Create a rate limiter over the given stores.
    pub fn new(
        config: RateLimitConfig,
        counters: Arc<dyn CounterStore>,
        blocks: Arc<dyn BlockList>,
    ) -> Self {
        Self {
            config,
            counters,
            blocks,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn SecurityEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether abuse detection has blocked this identifier.
    pub async fn is_blocked(&self, identifier: &str) -> Result<bool, StoreError> {
        self.blocks.is_blocked(identifier).await
    }

    /// Count one request against the quota for `(limit_type, identifier)`.
    pub async fn check_rate_limit(
        &self,
        limit_type: LimitType,
        identifier: &str,
    ) -> Result<RateLimitDecision, StoreError> {
        let policy = self.config.policy(limit_type);
        let key = RateLimitKey::new(limit_type, identifier).store_key(&self.config.key_prefix);

        let counted = self.counters.increment(&key, policy.window()).await?;
        let decision = RateLimitDecision::from_count(
            policy,
            counted.count,
            counted.resets_in,
            self.clock.now(),
        );

        debug!(
            limit_type = %limit_type,
            identifier,
            count = counted.count,
            remaining = decision.remaining,
            allowed = decision.allowed,
            "Rate limit checked"
        );
        Ok(decision)
    }

    /// Block check followed by quota check.
    pub async fn evaluate(
        &self,
        limit_type: LimitType,
        identifier: &str,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now();
        if let Some(until) = self.blocks.blocked_until(identifier).await? {
            self.events.record(
                SecurityEvent::failure(
                    EventSource::RateLimit,
                    ErrorCode::Blocked,
                    format!("Blocked identifier rejected on {limit_type}"),
                    now,
                )
                .with_identifier(identifier),
            );
            return Ok(RateLimitResult::Blocked { until });
        }

        let decision = self.check_rate_limit(limit_type, identifier).await?;
        if decision.allowed {
            self.events.record(
                SecurityEvent::success(
                    EventSource::RateLimit,
                    format!("Request allowed on {limit_type}"),
                    now,
                )
                .with_identifier(identifier),
            );
            Ok(RateLimitResult::Allowed(decision))
        } else {
            self.events.record(
                SecurityEvent::failure(
                    EventSource::RateLimit,
                    ErrorCode::RateLimitExceeded,
                    format!("Rate limit exceeded on {limit_type}"),
                    now,
                )
                .with_identifier(identifier),
            );
            Ok(RateLimitResult::Limited(decision))
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
