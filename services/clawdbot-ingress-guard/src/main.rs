// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Clawdbot Ingress Guard Service
//!
//! Terminates Clawdbot gateway webhooks and answers rate limit probes for
//! the dashboard API.
//!
//! ## Usage
//!
//! 1. **Webhook ingress**: gateways post to `/webhooks/clawdbot/:tenant_id`;
//!    requests are rate limited per IP, verified, then dispatched.
//!
//! 2. **External auth service**: Envoy or another proxy calls `/check` with
//!    `{ "type": "api-read", "identifier": "tenant:acme" }` before forwarding.
//!
//! ## Configuration
//!
//! Loaded from the environment (a `.env` file is read first if present):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `RATE_LIMIT_<TYPE>_MAX` / `RATE_LIMIT_<TYPE>_WINDOW_SECS`: per-class ceilings
//! - `RATE_LIMIT_FAIL_OPEN`: admit requests when the counter store fails (default: true)
//! - `CLAWDBOT_WEBHOOK_SECRET` / `CLAWDBOT_WEBHOOK_SECRETS`: signing secrets
//! - `CLAWDBOT_ALLOWED_IPS` / `CLAWDBOT_STRICT_IP_VALIDATION`: sender allowlist
//! - `REDIS_URL`: shared counter store (requires the `redis-store` feature)

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clawdbot_ingress_guard::{
    audit::{ChannelSink, SecurityEventSink},
    clock::SystemClock,
    config::Config,
    dispatch::{LoggingDispatcher, StaticWebhookSecrets},
    handlers::{router, AppState},
    limiter::RateLimiter,
    metrics::GuardMetrics,
    source_ip::EnvAllowlistProvider,
    store::{BlockList, CounterStore, MemoryCounterStore},
    webhook::WebhookVerifier,
};

const AUDIT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let addr = config.socket_addr()?;
    info!(
        bind_addr = %addr,
        api_read = config.rate_limit.api_read.max_requests,
        api_write = config.rate_limit.api_write.max_requests,
        webhook = config.rate_limit.webhook.max_requests,
        auth = config.rate_limit.auth.max_requests,
        fail_open = config.rate_limit.fail_open,
        "Starting Clawdbot ingress guard"
    );

    let (events, _audit_task) = ChannelSink::spawn(AUDIT_CHANNEL_CAPACITY);
    let events: Arc<dyn SecurityEventSink> = Arc::new(events);

    let (counters, blocks) = counter_store(&config).await?;
    let limiter = RateLimiter::new(config.rate_limit.clone(), counters, blocks)
        .with_events(events.clone());

    let verifier = WebhookVerifier::new(
        config.webhook.timestamp_policy(),
        Arc::new(EnvAllowlistProvider::new(config.webhook.allowlist_refresh())),
        Arc::new(SystemClock),
        events,
    );

    let secrets = StaticWebhookSecrets::from_env();
    if !secrets.has_default() && secrets.tenant_count() == 0 {
        warn!("No webhook secrets configured, every webhook will be rejected");
    }

    let metrics = if config.metrics.enabled {
        Some(GuardMetrics::new()?)
    } else {
        None
    };

    let state = Arc::new(AppState {
        limiter: Arc::new(limiter),
        verifier,
        secrets: Arc::new(secrets),
        dispatcher: Arc::new(LoggingDispatcher),
        metrics,
        config,
    });

    let app = router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Redis when `REDIS_URL` is set and the feature is enabled, else in-memory.
async fn counter_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn CounterStore>, Arc<dyn BlockList>)> {
    #[cfg(feature = "redis-store")]
    {
        if let Ok(url) = std::env::var("REDIS_URL") {
            let store = Arc::new(
                clawdbot_ingress_guard::redis_store::RedisCounterStore::connect(
                    &url,
                    config.rate_limit.key_prefix.clone(),
                )
                .await?,
            );
            info!("Using Redis counter store");
            let counters: Arc<dyn CounterStore> = store.clone();
            let blocks: Arc<dyn BlockList> = store;
            return Ok((counters, blocks));
        }
    }

    #[cfg(not(feature = "redis-store"))]
    {
        if std::env::var("REDIS_URL").is_ok() {
            warn!("REDIS_URL is set but the redis-store feature is disabled");
        }
    }

    let store = Arc::new(MemoryCounterStore::new());
    warn!("Using in-memory counter store, limits are per instance");

    // Spawn cleanup task
    let cleanup_store = store.clone();
    let period = config.rate_limit.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            cleanup_store.cleanup().await;
        }
    });

    let counters: Arc<dyn CounterStore> = store.clone();
    let blocks: Arc<dyn BlockList> = store;
    Ok((counters, blocks))
}
