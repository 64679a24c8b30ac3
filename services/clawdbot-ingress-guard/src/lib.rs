// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Clawdbot Ingress Guard
//!
//! Request-admission controls for the Clawdbot dashboard:
//!
//! - HMAC-SHA256 webhook signature verification with constant-time comparison
//! - Timestamp freshness checks against replay
//! - Optional source IP allowlist for gateway senders
//! - Fixed-window rate limiting per endpoint class over a shared counter store
//! - axum middleware applying limits and `X-RateLimit-*` headers to routes

pub mod audit;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod limiter;
pub mod metrics;
pub mod middleware;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod signature;
pub mod source_ip;
pub mod store;
pub mod timestamp;
pub mod webhook;

pub use config::Config;
pub use error::{ErrorCode, VerificationError, VerificationResult};
pub use limiter::{LimitType, RateLimitResult, RateLimiter};
pub use middleware::{with_rate_limit, RateLimitGuard, RateLimitOptions};
pub use webhook::{verify_webhook, SignedRequest, WebhookVerifier};
