// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Resolving the identifier a request is throttled under.
//!
//! Priority: an explicit resolver supplied by the route, then the
//! authenticated tenant, then the client IP. Logged-in tenants share one
//! quota across their users; anonymous traffic is throttled per IP.

use crate::source_ip::normalize_ip;
use async_trait::async_trait;
use axum::body::{Body, HttpBody};
use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Rate-limit key used when no proxy header or socket address names the client.
pub const LOOPBACK_FALLBACK: &str = "127.0.0.1";

/// Proxy headers consulted after `x-forwarded-for`, in order.
const SINGLE_IP_HEADERS: [&str; 3] = ["x-real-ip", "cf-connecting-ip", "true-client-ip"];

/// Client IP from proxy headers, else the socket peer.
///
/// `None` when neither names the client. Source IP checks must see that
/// case as missing rather than substitute an address.
pub fn request_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let from_headers = forwarded.or_else(|| {
        SINGLE_IP_HEADERS.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
    });

    match (from_headers, peer) {
        (Some(ip), _) => Some(normalize_ip(ip)),
        (None, Some(peer)) => Some(normalize_ip(&peer.to_string())),
        (None, None) => None,
    }
}

/// Client IP for keying rate limits, falling back to loopback.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    request_ip(headers, peer).unwrap_or_else(|| LOOPBACK_FALLBACK.to_string())
}

/// Socket peer address when the server was started with connect info.
pub fn peer_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Current session lookup, answering "which tenant is logged in".
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn tenant_id(&self, headers: &HeaderMap) -> Option<String>;
}

/// No sessions; every request falls through to IP keying.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

#[async_trait]
impl SessionResolver for NoSession {
    async fn tenant_id(&self, _headers: &HeaderMap) -> Option<String> {
        None
    }
}

/// Tenant taken from a header set by an authenticating reverse proxy.
///
/// Only sound when the proxy strips the header from client requests.
#[derive(Debug, Clone)]
pub struct TrustedHeaderSession {
    header: String,
}

impl TrustedHeaderSession {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

#[async_trait]
impl SessionResolver for TrustedHeaderSession {
    async fn tenant_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Route-specific identifier, taking priority over session and IP.
///
/// Receives the request mutably so it may buffer and restore the body.
/// Returning `None` falls back to the default resolution.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve(&self, request: &mut Request) -> Option<String>;
}

/// Adapter for synchronous closures.
pub struct FnIdentifier<F>(pub F);

#[async_trait]
impl<F> IdentifierResolver for FnIdentifier<F>
where
    F: Fn(&Request) -> Option<String> + Send + Sync,
{
    async fn resolve(&self, request: &mut Request) -> Option<String> {
        (self.0)(request)
    }
}

/// Attempted identity from a JSON login body, keyed as `email:<address>`.
///
/// The body is buffered and put back so the handler still sees it. Bodies
/// whose size is unknown or over `max_bytes` are left untouched and not
/// inspected, so the request falls back to session or IP keying.
#[derive(Debug, Clone)]
pub struct EmailFromJsonBody {
    field: String,
    max_bytes: usize,
}

impl EmailFromJsonBody {
    pub fn new(field: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            field: field.into(),
            max_bytes,
        }
    }
}

impl Default for EmailFromJsonBody {
    fn default() -> Self {
        Self::new("email", 64 * 1024)
    }
}

#[async_trait]
impl IdentifierResolver for EmailFromJsonBody {
    async fn resolve(&self, request: &mut Request) -> Option<String> {
        let bounded = HttpBody::size_hint(request.body())
            .upper()
            .is_some_and(|len| len <= self.max_bytes as u64);
        if !bounded {
            debug!(max_bytes = self.max_bytes, "Body too large for identity lookup");
            return None;
        }

        // Only a failed read (client gone) can lose the body past this point
        let body = std::mem::take(request.body_mut());
        let bytes = match axum::body::to_bytes(body, self.max_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "Could not buffer body for identity lookup");
                return None;
            }
        };
        *request.body_mut() = Body::from(bytes.clone());

        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        value
            .get(&self.field)?
            .as_str()
            .map(|email| email.trim().to_ascii_lowercase())
            .filter(|email| !email.is_empty())
            .map(|email| format!("email:{email}"))
    }
}

/// Full resolution: explicit resolver, then session tenant, then IP.
pub async fn resolve_identifier(
    request: &mut Request,
    explicit: Option<&dyn IdentifierResolver>,
    sessions: Option<&dyn SessionResolver>,
) -> String {
    if let Some(resolver) = explicit {
        if let Some(identifier) = resolver.resolve(request).await {
            return identifier;
        }
    }

    if let Some(sessions) = sessions {
        if let Some(tenant) = sessions.tenant_id(request.headers()).await {
            return format!("tenant:{tenant}");
        }
    }

    format!("ip:{}", client_ip(request.headers(), peer_ip(request)))
}
