// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tenant secrets and the consumer of verified webhooks.

use crate::error::DispatchError;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{info, warn};

/// Secret shared with every tenant that has no override.
pub const DEFAULT_SECRET_ENV: &str = "CLAWDBOT_WEBHOOK_SECRET";

/// Per-tenant overrides as `tenant=secret,tenant=secret`.
pub const TENANT_SECRETS_ENV: &str = "CLAWDBOT_WEBHOOK_SECRETS";

/// Lookup of the shared secret a tenant's gateway signs with.
pub trait WebhookSecrets: Send + Sync {
    fn secret_for(&self, tenant_id: &str) -> Option<String>;
}

/// Secrets fixed at startup.
#[derive(Clone, Default)]
pub struct StaticWebhookSecrets {
    default: Option<String>,
    tenants: HashMap<String, String>,
}

impl StaticWebhookSecrets {
    pub fn new(default: Option<String>) -> Self {
        Self {
            default: default.filter(|s| !s.is_empty()),
            tenants: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.tenants.insert(tenant_id.into(), secret.into());
        self
    }

    /// Build from raw environment values.
    ///
    /// Malformed override entries are skipped with a warning.
    pub fn from_env_values(default: Option<&str>, overrides: Option<&str>) -> Self {
        let mut secrets = Self::new(default.map(|s| s.trim().to_string()));

        for entry in overrides.unwrap_or_default().split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((tenant, secret))
                    if !tenant.trim().is_empty() && !secret.trim().is_empty() =>
                {
                    secrets
                        .tenants
                        .insert(tenant.trim().to_string(), secret.trim().to_string());
                }
                _ => {
                    let tenant = entry.split('=').next().unwrap_or_default();
                    warn!(tenant, "Ignoring malformed webhook secret entry");
                }
            }
        }
        secrets
    }

    pub fn from_env() -> Self {
        Self::from_env_values(
            std::env::var(DEFAULT_SECRET_ENV).ok().as_deref(),
            std::env::var(TENANT_SECRETS_ENV).ok().as_deref(),
        )
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl WebhookSecrets for StaticWebhookSecrets {
    fn secret_for(&self, tenant_id: &str) -> Option<String> {
        self.tenants
            .get(tenant_id)
            .or(self.default.as_ref())
            .cloned()
    }
}

impl std::fmt::Debug for StaticWebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tenants: Vec<&str> = self.tenants.keys().map(String::as_str).collect();
        tenants.sort_unstable();
        f.debug_struct("StaticWebhookSecrets")
            .field("has_default", &self.default.is_some())
            .field("tenants", &tenants)
            .finish()
    }
}

/// Consumer of webhooks that passed verification.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        tenant_id: &str,
        event: serde_json::Value,
    ) -> Result<(), DispatchError>;
}

/// Logs each event and acknowledges it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl WebhookDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        tenant_id: &str,
        event: serde_json::Value,
    ) -> Result<(), DispatchError> {
        let kind = event
            .get("event")
            .or_else(|| event.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        info!(tenant_id, event = kind, "Webhook accepted");
        Ok(())
    }
}
