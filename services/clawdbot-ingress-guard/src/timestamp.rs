// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Timestamp freshness checks for replay protection.
//!
//! A captured request and its signature stay replayable only while the
//! embedded timestamp is within `max_age_ms` of now.
//!
//! ## Unit detection
//!
//! Senders use Unix seconds or milliseconds. Values below `1e12` are read as
//! seconds, anything larger as milliseconds. This is ambiguous for
//! millisecond values before 2001-09-09 and for second values after year
//! 33658; both fall far outside any accepted freshness window, so they are
//! rejected as expired or future rather than misread as fresh.

use crate::clock::{Clock, SystemClock};
use crate::error::{preview, VerificationError, VerificationResult};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Values below this are Unix seconds.
pub const SECONDS_THRESHOLD: i64 = 1_000_000_000_000;

/// Default maximum age of a webhook (5 minutes).
pub const DEFAULT_MAX_AGE_MS: i64 = 300_000;

/// Default tolerance for sender clocks running ahead (1 minute).
pub const DEFAULT_CLOCK_SKEW_TOLERANCE_MS: i64 = 60_000;

/// Timestamp as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    /// Convert an arbitrary JSON value; `null` counts as absent.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => RawTimestamp::Integer(i),
                None => RawTimestamp::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            serde_json::Value::String(s) => Some(RawTimestamp::Text(s.clone())),
            other => Some(RawTimestamp::Text(other.to_string())),
        }
    }

    /// Unix milliseconds, or `None` if the value cannot be an instant.
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            RawTimestamp::Integer(n) => integer_millis(*n),
            RawTimestamp::Float(f) => float_millis(*f),
            RawTimestamp::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                if let Ok(n) = s.parse::<i64>() {
                    return integer_millis(n);
                }
                if let Ok(f) = s.parse::<f64>() {
                    return float_millis(f);
                }
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
                    .filter(|ms| *ms > 0)
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            RawTimestamp::Integer(n) => n.to_string(),
            RawTimestamp::Float(f) => f.to_string(),
            RawTimestamp::Text(s) => s.clone(),
        }
    }
}

impl From<i64> for RawTimestamp {
    fn from(value: i64) -> Self {
        RawTimestamp::Integer(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

fn integer_millis(n: i64) -> Option<i64> {
    if n <= 0 {
        None
    } else if n < SECONDS_THRESHOLD {
        n.checked_mul(1000)
    } else {
        Some(n)
    }
}

fn float_millis(f: f64) -> Option<i64> {
    if !f.is_finite() || f <= 0.0 {
        return None;
    }
    let millis = if f < SECONDS_THRESHOLD as f64 {
        f * 1000.0
    } else {
        f
    };
    if millis >= i64::MAX as f64 {
        None
    } else {
        Some(millis.round() as i64)
    }
}

/// Freshness window applied to incoming timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPolicy {
    pub max_age_ms: i64,
    pub clock_skew_tolerance_ms: i64,
    skip_validation: bool,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_MS, DEFAULT_CLOCK_SKEW_TOLERANCE_MS)
    }
}

impl TimestampPolicy {
    pub fn new(max_age_ms: i64, clock_skew_tolerance_ms: i64) -> Self {
        Self {
            max_age_ms,
            clock_skew_tolerance_ms,
            skip_validation: false,
        }
    }

    /// Disable the freshness check entirely. Test builds only.
    #[cfg(any(test, feature = "test-support"))]
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_validation
    }
}

/// Check a timestamp against the system clock.
pub fn verify_timestamp(
    timestamp: Option<&RawTimestamp>,
    policy: &TimestampPolicy,
) -> VerificationResult {
    verify_timestamp_at(timestamp, policy, SystemClock.now_ms())
}

/// Check a timestamp against an explicit "now" in Unix milliseconds.
pub fn verify_timestamp_at(
    timestamp: Option<&RawTimestamp>,
    policy: &TimestampPolicy,
    now_ms: i64,
) -> VerificationResult {
    if policy.skip_validation {
        return VerificationResult::Valid;
    }

    let Some(raw) = timestamp else {
        return VerificationError::MissingTimestamp.into();
    };

    let Some(ts_ms) = raw.to_millis() else {
        return VerificationError::InvalidTimestamp {
            received: preview(&raw.describe()),
        }
        .into();
    };

    let age_ms = now_ms.saturating_sub(ts_ms);
    if age_ms > policy.max_age_ms {
        return VerificationError::TimestampExpired {
            age_ms,
            max_age_ms: policy.max_age_ms,
        }
        .into();
    }

    let ahead_ms = ts_ms.saturating_sub(now_ms);
    if ahead_ms > policy.clock_skew_tolerance_ms {
        return VerificationError::TimestampFuture {
            ahead_ms,
            tolerance_ms: policy.clock_skew_tolerance_ms,
        }
        .into();
    }

    VerificationResult::Valid
}
