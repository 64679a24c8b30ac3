// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Optional source-IP allowlist for webhook senders.
//!
//! The allowlist is a hardening layer on top of signature verification. It
//! is read through an [`AllowlistProvider`] so operators can rotate it
//! without a redeploy; [`EnvAllowlistProvider`] re-reads the environment
//! once per refresh interval.

use crate::error::{VerificationError, VerificationResult};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Comma-separated list of allowed sender IPs.
pub const ALLOWED_IPS_ENV: &str = "CLAWDBOT_ALLOWED_IPS";

/// `"true"` makes a missing or unlisted IP a failure.
pub const STRICT_IP_ENV: &str = "CLAWDBOT_STRICT_IP_VALIDATION";

const MAPPED_V4_PREFIX: &str = "::ffff:";

/// Canonical textual form of an IP for allowlist comparison.
///
/// IPv6-mapped IPv4 addresses (`::ffff:10.0.0.5`) collapse to their IPv4
/// form so dual-stack listeners compare equal to IPv4 allowlist entries.
pub fn normalize_ip(raw: &str) -> String {
    let trimmed = raw.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    match unbracketed.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(IpAddr::V4(v4)) => v4.to_string(),
        Err(_) => {
            let lower = unbracketed.to_ascii_lowercase();
            match lower.strip_prefix(MAPPED_V4_PREFIX) {
                Some(rest) => rest.to_string(),
                None => lower,
            }
        }
    }
}

/// Set of allowed sender addresses plus the strictness flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowlist {
    ips: HashSet<String>,
    strict: bool,
}

impl IpAllowlist {
    pub fn new<I, S>(ips: I, strict: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ips = ips
            .into_iter()
            .map(|ip| normalize_ip(ip.as_ref()))
            .filter(|ip| !ip.is_empty())
            .collect();
        Self { ips, strict }
    }

    /// Parse the raw values of the two environment variables.
    pub fn from_env_values(allowed_ips: Option<&str>, strict: Option<&str>) -> Self {
        let ips = allowed_ips.unwrap_or_default().split(',');
        let strict = strict
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::new(ips, strict)
    }

    /// Read the allowlist from the process environment.
    pub fn from_env() -> Self {
        let ips = std::env::var(ALLOWED_IPS_ENV).ok();
        let strict = std::env::var(STRICT_IP_ENV).ok();
        Self::from_env_values(ips.as_deref(), strict.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.ips.contains(&normalize_ip(ip))
    }
}

/// Check a sender IP against the allowlist.
///
/// Non-strict with an empty list is a no-op. Strict mode rejects a missing
/// IP, and with an empty list rejects every IP.
pub fn verify_source_ip(source_ip: Option<&str>, allowlist: &IpAllowlist) -> VerificationResult {
    if allowlist.is_empty() && !allowlist.is_strict() {
        return VerificationResult::Valid;
    }

    let source_ip = source_ip.map(str::trim).filter(|ip| !ip.is_empty());

    let Some(ip) = source_ip else {
        if allowlist.is_strict() {
            debug!("Source IP missing under strict validation");
            return VerificationError::InvalidSourceIp { source_ip: None }.into();
        }
        return VerificationResult::Valid;
    };

    let normalized = normalize_ip(ip);
    if allowlist.ips.contains(&normalized) {
        VerificationResult::Valid
    } else {
        debug!(source_ip = %normalized, "Source IP not in allowlist");
        VerificationError::InvalidSourceIp {
            source_ip: Some(normalized),
        }
        .into()
    }
}

/// Supplies the current allowlist.
pub trait AllowlistProvider: Send + Sync {
    fn allowlist(&self) -> Arc<IpAllowlist>;
}

/// Fixed allowlist.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowlist(Arc<IpAllowlist>);

impl StaticAllowlist {
    pub fn new(allowlist: IpAllowlist) -> Self {
        Self(Arc::new(allowlist))
    }
}

impl AllowlistProvider for StaticAllowlist {
    fn allowlist(&self) -> Arc<IpAllowlist> {
        Arc::clone(&self.0)
    }
}

/// Allowlist read from the environment, cached for `refresh`.
///
/// A zero refresh interval re-reads the environment on every call.
#[derive(Debug)]
pub struct EnvAllowlistProvider {
    refresh: Duration,
    cached: RwLock<Option<(Instant, Arc<IpAllowlist>)>>,
}

impl EnvAllowlistProvider {
    pub fn new(refresh: Duration) -> Self {
        Self {
            refresh,
            cached: RwLock::new(None),
        }
    }

    fn fresh_cached(&self) -> Option<Arc<IpAllowlist>> {
        let guard = self.cached.read().ok()?;
        let (loaded_at, allowlist) = guard.as_ref()?;
        (loaded_at.elapsed() < self.refresh).then(|| Arc::clone(allowlist))
    }
}

impl AllowlistProvider for EnvAllowlistProvider {
    fn allowlist(&self) -> Arc<IpAllowlist> {
        if let Some(allowlist) = self.fresh_cached() {
            return allowlist;
        }

        let allowlist = Arc::new(IpAllowlist::from_env());
        debug!(
            entries = allowlist.len(),
            strict = allowlist.is_strict(),
            "Reloaded webhook IP allowlist"
        );
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some((Instant::now(), Arc::clone(&allowlist)));
        }
        allowlist
    }
}
