// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Full webhook verification: signature, then timestamp, then source IP.
//!
//! All three checks are required; the order only decides which error a
//! sender sees first.

use crate::audit::{EventSource, SecurityEvent, SecurityEventSink};
use crate::clock::Clock;
use crate::error::VerificationResult;
use crate::signature::verify_signature;
use crate::source_ip::{verify_source_ip, AllowlistProvider, IpAllowlist};
use crate::timestamp::{verify_timestamp_at, RawTimestamp, TimestampPolicy};
use std::sync::Arc;

/// Everything needed to verify one inbound webhook.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    /// Exact raw body bytes as received
    pub payload: &'a [u8],
    /// Value of the signature header, if present
    pub signature: Option<&'a str>,
    /// Tenant-scoped shared secret
    pub secret: &'a str,
    /// Timestamp declared by the sender
    pub timestamp: Option<RawTimestamp>,
    /// Sender address after proxy-header resolution
    pub source_ip: Option<&'a str>,
}

/// Read the `timestamp` field from a JSON body.
///
/// Only inspects a parsed copy; the raw bytes used for signature checks are
/// left untouched.
pub fn extract_timestamp(payload: &[u8]) -> Option<RawTimestamp> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("timestamp").and_then(RawTimestamp::from_json)
}

/// Run all three checks, stopping at the first failure.
pub fn verify_webhook(
    request: &SignedRequest<'_>,
    policy: &TimestampPolicy,
    allowlist: &IpAllowlist,
    now_ms: i64,
) -> VerificationResult {
    let signature = verify_signature(request.payload, request.signature, request.secret);
    if !signature.is_valid() {
        return signature;
    }

    let timestamp = verify_timestamp_at(request.timestamp.as_ref(), policy, now_ms);
    if !timestamp.is_valid() {
        return timestamp;
    }

    verify_source_ip(request.source_ip, allowlist)
}

/// Webhook verifier with its collaborators injected.
#[derive(Clone)]
pub struct WebhookVerifier {
    policy: TimestampPolicy,
    allowlist: Arc<dyn AllowlistProvider>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn SecurityEventSink>,
}

impl WebhookVerifier {
    pub fn new(
        policy: TimestampPolicy,
        allowlist: Arc<dyn AllowlistProvider>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn SecurityEventSink>,
    ) -> Self {
        Self {
            policy,
            allowlist,
            clock,
            events,
        }
    }

    pub fn policy(&self) -> &TimestampPolicy {
        &self.policy
    }

    /// Verify a request and record the outcome.
    ///
    /// `tenant` only labels the logged event.
    pub fn verify(&self, request: &SignedRequest<'_>, tenant: &str) -> VerificationResult {
        let allowlist = self.allowlist.allowlist();
        let now = self.clock.now();
        let result = verify_webhook(request, &self.policy, &allowlist, now.timestamp_millis());

        let event = match result.error() {
            None => SecurityEvent::success(EventSource::Webhook, "Webhook verified", now),
            Some(err) => {
                SecurityEvent::failure(EventSource::Webhook, err.code(), err.to_string(), now)
                    .with_details(err.details())
            }
        };
        let event = match request.source_ip {
            Some(ip) => event.with_identifier(format!("tenant:{tenant} ip:{ip}")),
            None => event.with_identifier(format!("tenant:{tenant}")),
        };
        self.events.record(event);

        result
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{EventKind, MemorySink};
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::signature::sign_payload;
    use crate::source_ip::StaticAllowlist;

    const SECRET: &str = "tenant-secret";
    const NOW_MS: i64 = 1_700_000_000_000;

    fn body(ts: i64) -> Vec<u8> {
        format!(r#"{{"event":"conversation.updated","timestamp":{ts}}}"#).into_bytes()
    }

    #[test]
    fn test_extract_timestamp() {
        assert_eq!(
            extract_timestamp(&body(1_700_000_000)),
            Some(RawTimestamp::Integer(1_700_000_000))
        );
        assert_eq!(
            extract_timestamp(br#"{"timestamp":"1700000000"}"#),
            Some(RawTimestamp::Text("1700000000".into()))
        );
        assert_eq!(extract_timestamp(br#"{"event":"x"}"#), None);
        assert_eq!(extract_timestamp(b"not json"), None);
    }

    #[test]
    fn test_signature_checked_before_timestamp() {
        let payload = body(1);
        let request = SignedRequest {
            payload: &payload,
            signature: Some("sha256=00"),
            secret: SECRET,
            timestamp: extract_timestamp(&payload),
            source_ip: None,
        };
        let result = verify_webhook(
            &request,
            &TimestampPolicy::default(),
            &IpAllowlist::default(),
            NOW_MS,
        );
        assert_eq!(result.code(), Some(ErrorCode::SignatureMismatch));
    }

    #[test]
    fn test_timestamp_checked_before_ip() {
        let payload = body(1_700_000_000 - 400);
        let signature = sign_payload(&payload, SECRET).unwrap();
        let request = SignedRequest {
            payload: &payload,
            signature: Some(&signature),
            secret: SECRET,
            timestamp: extract_timestamp(&payload),
            source_ip: Some("198.51.100.1"),
        };
        let allowlist = IpAllowlist::new(["10.0.0.1"], true);
        let result = verify_webhook(&request, &TimestampPolicy::default(), &allowlist, NOW_MS);
        assert_eq!(result.code(), Some(ErrorCode::TimestampExpired));
    }

    #[test]
    fn test_verifier_records_events() {
        let sink = Arc::new(MemorySink::new());
        let verifier = WebhookVerifier::new(
            TimestampPolicy::default(),
            Arc::new(StaticAllowlist::new(IpAllowlist::new(["10.0.0.1"], false))),
            Arc::new(ManualClock::at_millis(NOW_MS)),
            sink.clone(),
        );

        let payload = body(1_700_000_000);
        let signature = sign_payload(&payload, SECRET).unwrap();
        let mut request = SignedRequest {
            payload: &payload,
            signature: Some(&signature),
            secret: SECRET,
            timestamp: extract_timestamp(&payload),
            source_ip: Some("::ffff:10.0.0.1"),
        };
        assert!(verifier.verify(&request, "acme").is_valid());

        request.source_ip = Some("10.9.9.9");
        assert_eq!(
            verifier.verify(&request, "acme").code(),
            Some(ErrorCode::InvalidSourceIp)
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Success);
        assert_eq!(events[1].kind, EventKind::Failure);
        assert_eq!(events[1].code, Some(ErrorCode::InvalidSourceIp));
        assert_eq!(events[1].identifier.as_deref(), Some("tenant:acme ip:10.9.9.9"));
        assert!(events.iter().all(|e| e.at.timestamp_millis() == NOW_MS));
    }
}
