// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy for webhook verification and rate limiting.
//!
//! Every rejection this crate can produce maps to exactly one [`ErrorCode`].
//! None of them are fatal to the process; the caller rejects the request and
//! the remote side retries according to `Retry-After`.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Longest prefix of a caller-supplied value that may appear in error details.
const RECEIVED_PREVIEW_LEN: usize = 16;

/// Machine-readable rejection codes, serialised as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingSecret,
    MissingSignature,
    InvalidSignatureFormat,
    SignatureMismatch,
    MissingTimestamp,
    InvalidTimestamp,
    TimestampExpired,
    TimestampFuture,
    InvalidSourceIp,
    RateLimitExceeded,
    Blocked,
    RateLimitUnavailable,
    DispatchFailed,
}

impl ErrorCode {
    /// Wire representation, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSecret => "MISSING_SECRET",
            Self::MissingSignature => "MISSING_SIGNATURE",
            Self::InvalidSignatureFormat => "INVALID_SIGNATURE_FORMAT",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::MissingTimestamp => "MISSING_TIMESTAMP",
            Self::InvalidTimestamp => "INVALID_TIMESTAMP",
            Self::TimestampExpired => "TIMESTAMP_EXPIRED",
            Self::TimestampFuture => "TIMESTAMP_FUTURE",
            Self::InvalidSourceIp => "INVALID_SOURCE_IP",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Blocked => "BLOCKED",
            Self::RateLimitUnavailable => "RATE_LIMIT_UNAVAILABLE",
            Self::DispatchFailed => "DISPATCH_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a webhook fails verification.
///
/// Variants only ever carry what the sender supplied (truncated); the
/// computed digest and the secret are never stored here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Webhook secret is not configured")]
    MissingSecret,

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Signature header must have the form sha256=<hex>")]
    InvalidSignatureFormat { received: String },

    #[error("Signature does not match payload")]
    SignatureMismatch { received: String },

    #[error("Missing timestamp")]
    MissingTimestamp,

    #[error("Timestamp could not be parsed")]
    InvalidTimestamp { received: String },

    #[error("Timestamp is {age_ms}ms old, maximum age is {max_age_ms}ms")]
    TimestampExpired { age_ms: i64, max_age_ms: i64 },

    #[error("Timestamp is {ahead_ms}ms in the future, tolerance is {tolerance_ms}ms")]
    TimestampFuture { ahead_ms: i64, tolerance_ms: i64 },

    #[error("Source IP is not allowed")]
    InvalidSourceIp { source_ip: Option<String> },
}

impl VerificationError {
    /// The rejection code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingSecret => ErrorCode::MissingSecret,
            Self::MissingSignature => ErrorCode::MissingSignature,
            Self::InvalidSignatureFormat { .. } => ErrorCode::InvalidSignatureFormat,
            Self::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            Self::MissingTimestamp => ErrorCode::MissingTimestamp,
            Self::InvalidTimestamp { .. } => ErrorCode::InvalidTimestamp,
            Self::TimestampExpired { .. } => ErrorCode::TimestampExpired,
            Self::TimestampFuture { .. } => ErrorCode::TimestampFuture,
            Self::InvalidSourceIp { .. } => ErrorCode::InvalidSourceIp,
        }
    }

    /// Structured details for logs. Never returned to the sender.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::MissingSecret | Self::MissingSignature | Self::MissingTimestamp => None,
            Self::InvalidSignatureFormat { received }
            | Self::SignatureMismatch { received }
            | Self::InvalidTimestamp { received } => Some(json!({ "received": received })),
            Self::TimestampExpired { age_ms, max_age_ms } => {
                Some(json!({ "ageMs": age_ms, "maxAgeMs": max_age_ms }))
            }
            Self::TimestampFuture {
                ahead_ms,
                tolerance_ms,
            } => Some(json!({ "aheadMs": ahead_ms, "toleranceMs": tolerance_ms })),
            Self::InvalidSourceIp { source_ip } => Some(json!({ "sourceIp": source_ip })),
        }
    }
}

/// Outcome of a verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Request passed the check
    Valid,
    /// Request failed the check
    Invalid(VerificationError),
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid)
    }

    pub fn error(&self) -> Option<&VerificationError> {
        match self {
            VerificationResult::Valid => None,
            VerificationResult::Invalid(e) => Some(e),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        self.error().map(VerificationError::code)
    }
}

impl From<VerificationError> for VerificationResult {
    fn from(err: VerificationError) -> Self {
        VerificationResult::Invalid(err)
    }
}

/// JSON body of every rejection response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

impl From<&VerificationError> for ErrorBody {
    fn from(err: &VerificationError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

/// Failures talking to the shared counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "redis-store")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Failure handing a verified webhook to its consumer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Webhook consumer rejected event: {0}")]
    Rejected(String),

    #[error("Webhook consumer unavailable: {0}")]
    Unavailable(String),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid bind address {0:?}")]
    InvalidBindAddr(String),
}

/// Cut a sender-supplied value down to a short preview for error details.
pub(crate) fn preview(value: &str) -> String {
    let mut chars = value.chars();
    let head: String = chars.by_ref().take(RECEIVED_PREVIEW_LEN).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
