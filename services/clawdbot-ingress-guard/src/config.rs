// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the ingress guard.
//!
//! Defaults give write and auth endpoints materially stricter ceilings than
//! reads. Every value can be overridden from the environment through
//! [`Config::from_env`].

use crate::error::ConfigError;
use crate::limiter::LimitType;
use crate::timestamp::{DEFAULT_CLOCK_SKEW_TOLERANCE_MS, DEFAULT_MAX_AGE_MS, TimestampPolicy};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the ingress guard service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Webhook verification configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Request ceiling for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicy {
    /// Requests allowed per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl LimitPolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Prefix for counter store keys (default: "ratelimit:")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Let requests through when the counter store fails (default: true)
    #[serde(default = "default_true")]
    pub fail_open: bool,

    /// Dashboard reads (default: 100 per minute)
    #[serde(default = "default_api_read")]
    pub api_read: LimitPolicy,

    /// Dashboard writes (default: 30 per minute)
    #[serde(default = "default_api_write")]
    pub api_write: LimitPolicy,

    /// Gateway webhooks (default: 300 per minute)
    #[serde(default = "default_webhook")]
    pub webhook: LimitPolicy,

    /// Login and credential endpoints (default: 5 per 15 minutes)
    #[serde(default = "default_auth")]
    pub auth: LimitPolicy,

    /// Interval for sweeping expired in-memory windows (default: 60)
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_interval_secs: u64,
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Maximum webhook age in milliseconds (default: 300000)
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: i64,

    /// Allowed clock skew into the future in milliseconds (default: 60000)
    #[serde(default = "default_clock_skew_ms")]
    pub clock_skew_tolerance_ms: i64,

    /// Seconds the IP allowlist is cached before the environment is re-read
    /// (default: 30, 0 re-reads on every request)
    #[serde(default = "default_allowlist_refresh_secs")]
    pub allowlist_refresh_secs: u64,

    /// Maximum accepted body size in bytes (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_key_prefix() -> String {
    "ratelimit:".to_string()
}

fn default_api_read() -> LimitPolicy {
    LimitPolicy::new(100, 60)
}

fn default_api_write() -> LimitPolicy {
    LimitPolicy::new(30, 60)
}

fn default_webhook() -> LimitPolicy {
    LimitPolicy::new(300, 60)
}

fn default_auth() -> LimitPolicy {
    LimitPolicy::new(5, 900)
}

fn default_cleanup_secs() -> u64 {
    60
}

fn default_max_age_ms() -> i64 {
    DEFAULT_MAX_AGE_MS
}

fn default_clock_skew_ms() -> i64 {
    DEFAULT_CLOCK_SKEW_TOLERANCE_MS
}

fn default_allowlist_refresh_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            rate_limit: RateLimitConfig::default(),
            webhook: WebhookConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            fail_open: default_true(),
            api_read: default_api_read(),
            api_write: default_api_write(),
            webhook: default_webhook(),
            auth: default_auth(),
            cleanup_interval_secs: default_cleanup_secs(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_age_ms: default_max_age_ms(),
            clock_skew_tolerance_ms: default_clock_skew_ms(),
            allowlist_refresh_secs: default_allowlist_refresh_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Policy for an endpoint class.
    pub fn policy(&self, limit_type: LimitType) -> LimitPolicy {
        match limit_type {
            LimitType::ApiRead => self.api_read,
            LimitType::ApiWrite => self.api_write,
            LimitType::Webhook => self.webhook,
            LimitType::Auth => self.auth,
        }
    }

    fn policy_mut(&mut self, limit_type: LimitType) -> &mut LimitPolicy {
        match limit_type {
            LimitType::ApiRead => &mut self.api_read,
            LimitType::ApiWrite => &mut self.api_write,
            LimitType::Webhook => &mut self.webhook,
            LimitType::Auth => &mut self.auth,
        }
    }

    /// Get the cleanup interval
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl WebhookConfig {
    pub fn timestamp_policy(&self) -> TimestampPolicy {
        TimestampPolicy::new(self.max_age_ms, self.clock_skew_tolerance_ms)
    }

    pub fn allowlist_refresh(&self) -> Duration {
        Duration::from_secs(self.allowlist_refresh_secs)
    }
}

impl Config {
    /// Defaults overlaid with values from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with values from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(prefix) = lookup("RATE_LIMIT_KEY_PREFIX") {
            config.rate_limit.key_prefix = prefix;
        }
        set_parsed(&lookup, "RATE_LIMIT_FAIL_OPEN", &mut config.rate_limit.fail_open)?;
        set_parsed(
            &lookup,
            "RATE_LIMIT_CLEANUP_SECS",
            &mut config.rate_limit.cleanup_interval_secs,
        )?;

        for limit_type in LimitType::ALL {
            let (max_var, window_var) = limit_type.env_vars();
            let policy = config.rate_limit.policy_mut(limit_type);
            set_parsed(&lookup, max_var, &mut policy.max_requests)?;
            set_parsed(&lookup, window_var, &mut policy.window_secs)?;
            // A zero-length window resets on every request and never throttles
            if policy.window_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    var: window_var,
                    value: "0".to_string(),
                });
            }
        }

        set_parsed(&lookup, "WEBHOOK_MAX_AGE_MS", &mut config.webhook.max_age_ms)?;
        set_parsed(
            &lookup,
            "WEBHOOK_CLOCK_SKEW_MS",
            &mut config.webhook.clock_skew_tolerance_ms,
        )?;
        set_parsed(
            &lookup,
            "CLAWDBOT_ALLOWLIST_REFRESH_SECS",
            &mut config.webhook.allowlist_refresh_secs,
        )?;
        set_parsed(
            &lookup,
            "WEBHOOK_MAX_BODY_BYTES",
            &mut config.webhook.max_body_bytes,
        )?;
        set_parsed(&lookup, "METRICS_ENABLED", &mut config.metrics.enabled)?;

        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.bind_addr.clone()))
    }
}

fn set_parsed<F, T>(lookup: &F, var: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw })?;
    }
    Ok(())
}
