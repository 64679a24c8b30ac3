// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for verification and throttling outcomes.
//!
//! - `clawdbot_webhook_verifications_total{outcome, code}`
//! - `clawdbot_rate_limit_decisions_total{limit_type, outcome}`

use crate::error::ErrorCode;
use crate::limiter::LimitType;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Registered guard metrics.
#[derive(Clone)]
pub struct GuardMetrics {
    registry: Registry,
    webhook_verifications: IntCounterVec,
    rate_limit_decisions: IntCounterVec,
}

impl GuardMetrics {
    /// Create and register metrics with a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let webhook_verifications = IntCounterVec::new(
            Opts::new(
                "clawdbot_webhook_verifications_total",
                "Webhook verification outcomes",
            ),
            &["outcome", "code"],
        )?;
        registry.register(Box::new(webhook_verifications.clone()))?;

        let rate_limit_decisions = IntCounterVec::new(
            Opts::new(
                "clawdbot_rate_limit_decisions_total",
                "Rate limit decisions by endpoint class",
            ),
            &["limit_type", "outcome"],
        )?;
        registry.register(Box::new(rate_limit_decisions.clone()))?;

        Ok(Self {
            registry,
            webhook_verifications,
            rate_limit_decisions,
        })
    }

    pub fn record_verification(&self, code: Option<ErrorCode>) {
        let (outcome, code) = match code {
            None => ("success", "none"),
            Some(code) => ("failure", code.as_str()),
        };
        self.webhook_verifications
            .with_label_values(&[outcome, code])
            .inc();
    }

    /// `outcome` is one of `allowed`, `limited`, `blocked`, `error`.
    pub fn record_decision(&self, limit_type: LimitType, outcome: &str) {
        self.rate_limit_decisions
            .with_label_values(&[limit_type.as_str(), outcome])
            .inc();
    }

    /// Text exposition of all registered metrics.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for GuardMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardMetrics").finish_non_exhaustive()
    }
}
