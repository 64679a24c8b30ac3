// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

use clawdbot_ingress_guard::config::RateLimitConfig;
use clawdbot_ingress_guard::limiter::LimitType;

/// Which guarded route the attack targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `GET /api/conversations`, keyed by session tenant or IP
    ApiRead,
    /// `POST /api/conversations`
    ApiWrite,
    /// `POST /auth/login`, keyed by attempted email
    Login,
}

impl Target {
    pub fn limit_type(&self) -> LimitType {
        match self {
            Target::ApiRead => LimitType::ApiRead,
            Target::ApiWrite => LimitType::ApiWrite,
            Target::Login => LimitType::Auth,
        }
    }
}

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of unique IPs to simulate
    pub unique_ips: usize,
    /// Number of unique login identities (login target only)
    pub unique_identities: usize,
    /// Tenant session attached to every request, if any
    pub tenant: Option<&'static str>,
    /// Route under attack
    pub target: Target,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            unique_identities: 1,
            tenant: None,
            target: Target::ApiRead,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single IP flood - basic scraping or DoS from one source.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            unique_ips: 1,
            ..Default::default()
        }
    }

    /// Distributed attack - many IPs, few requests each.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            unique_ips: 100,
            ..Default::default()
        }
    }

    /// Logged-in tenant rotating IPs to dodge per-IP limits.
    pub fn tenant_ip_rotation() -> Self {
        Self {
            total_requests: 150,
            unique_ips: 150,
            tenant: Some("acme"),
            ..Default::default()
        }
    }

    /// Write flood - mutation endpoint hammered from one source.
    pub fn write_flood() -> Self {
        Self {
            total_requests: 60,
            unique_ips: 1,
            target: Target::ApiWrite,
            ..Default::default()
        }
    }

    /// Credential stuffing - one account, attempts spread across many IPs.
    pub fn credential_stuffing() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 50,
            unique_identities: 1,
            target: Target::Login,
            ..Default::default()
        }
    }

    /// Password spray - one IP, one attempt per account.
    pub fn password_spray() -> Self {
        Self {
            total_requests: 40,
            unique_ips: 1,
            unique_identities: 40,
            target: Target::Login,
            ..Default::default()
        }
    }

    /// Number of distinct counters this pattern lands on.
    pub fn distinct_keys(&self) -> usize {
        match (self.target, self.tenant) {
            (Target::Login, _) => self.unique_identities,
            (_, Some(_)) => 1,
            (_, None) => self.unique_ips,
        }
    }

    /// Exact number of requests a fixed-window limiter admits within one window.
    pub fn expected_allowed(&self, limits: &RateLimitConfig) -> usize {
        let ceiling = limits.policy(self.target.limit_type()).max_requests as usize;
        let keys = self.distinct_keys().max(1);
        let per_key = self.total_requests / keys;
        let remainder = self.total_requests % keys;
        // The first `remainder` keys receive one extra request
        (0..keys)
            .map(|k| (per_key + usize::from(k < remainder)).min(ceiling))
            .sum()
    }
}
