// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HMAC-SHA256 webhook signatures.
//!
//! The gateway signs the raw request body with the tenant's shared secret and
//! sends `sha256=<hex digest>` in the signature header. Verification must run
//! over the exact bytes received; re-serialising the JSON body changes
//! whitespace and key order and breaks the digest.

use crate::error::{preview, VerificationError, VerificationResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Default header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-clawdbot-signature";

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
fn hex_digest(payload: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Produce the `sha256=<hex>` header value for a payload.
///
/// Returns `None` only when `secret` is empty.
pub fn sign_payload(payload: &[u8], secret: &str) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    hex_digest(payload, secret).map(|digest| format!("{SIGNATURE_PREFIX}{digest}"))
}

/// Verify a webhook signature header against the raw payload.
pub fn verify_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
) -> VerificationResult {
    if secret.is_empty() {
        return VerificationError::MissingSecret.into();
    }

    let header = match signature_header.map(str::trim) {
        Some(h) if !h.is_empty() => h,
        _ => return VerificationError::MissingSignature.into(),
    };

    let received = match header.strip_prefix(SIGNATURE_PREFIX) {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => hex,
        _ => {
            debug!("Signature header has unexpected format");
            return VerificationError::InvalidSignatureFormat {
                received: preview(header),
            }
            .into();
        }
    };

    let Some(expected) = hex_digest(payload, secret) else {
        return VerificationError::MissingSecret.into();
    };

    let received_lower = received.to_ascii_lowercase();
    if fixed_time_eq(expected.as_bytes(), received_lower.as_bytes()) {
        VerificationResult::Valid
    } else {
        VerificationError::SignatureMismatch {
            received: preview(header),
        }
        .into()
    }
}

/// Constant-time equality that does not return early on length mismatch.
///
/// When lengths differ a comparison against a zeroed buffer of the expected
/// length still runs, so latency does not reveal the digest length.
fn fixed_time_eq(expected: &[u8], received: &[u8]) -> bool {
    if expected.len() != received.len() {
        let dummy = vec![0u8; expected.len()];
        let _ = std::hint::black_box(expected.ct_eq(&dummy));
        return false;
    }
    expected.ct_eq(received).into()
}
