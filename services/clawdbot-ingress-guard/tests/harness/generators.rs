// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use clawdbot_ingress_guard::error::ErrorCode;
use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate a pool of login identities.
pub fn generate_emails(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("user{}@tenant-{}.example.com", i, i % 7))
        .collect()
}

/// Tampered variants of a valid `sha256=<hex>` header with the code each
/// must be rejected with.
pub fn generate_signature_mutations(valid: &str) -> Vec<(String, ErrorCode)> {
    let hex = valid.trim_start_matches("sha256=");
    let mut flipped = hex.as_bytes().to_vec();
    flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
    let flipped = String::from_utf8(flipped).unwrap();

    vec![
        // Same length, one nibble changed
        (format!("sha256={flipped}"), ErrorCode::SignatureMismatch),
        // Truncated digest
        (format!("sha256={}", &hex[..32]), ErrorCode::SignatureMismatch),
        // Extended digest
        (format!("sha256={hex}00"), ErrorCode::SignatureMismatch),
        // Wrong algorithm label
        (format!("sha1={hex}"), ErrorCode::InvalidSignatureFormat),
        // Bare digest without prefix
        (hex.to_string(), ErrorCode::InvalidSignatureFormat),
        // Prefix only
        ("sha256=".to_string(), ErrorCode::InvalidSignatureFormat),
        // Non-hex characters
        (format!("sha256={}", "zz".repeat(32)), ErrorCode::InvalidSignatureFormat),
        // Empty header
        (String::new(), ErrorCode::MissingSignature),
    ]
}

/// Timestamps relative to `now_ms`, each with the expected outcome
/// (`None` means accepted) under the default five-minute window and
/// one-minute skew tolerance.
pub fn generate_timestamps(now_ms: i64) -> Vec<(serde_json::Value, Option<ErrorCode>)> {
    let now_secs = now_ms / 1000;
    vec![
        (now_ms.into(), None),
        (now_secs.into(), None),
        ((now_secs - 299).into(), None),
        ((now_ms - 300_000).into(), None),
        ((now_secs - 400).into(), Some(ErrorCode::TimestampExpired)),
        ((now_ms - 300_001).into(), Some(ErrorCode::TimestampExpired)),
        ((now_secs + 30).into(), None),
        ((now_secs + 120).into(), Some(ErrorCode::TimestampFuture)),
        (now_secs.to_string().into(), None),
        ("not-a-time".into(), Some(ErrorCode::InvalidTimestamp)),
        (serde_json::Value::Null, Some(ErrorCode::MissingTimestamp)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_generate_emails() {
        let emails = generate_emails(20);
        let unique: std::collections::HashSet<_> = emails.iter().collect();
        assert_eq!(unique.len(), 20);
    }
}
