// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Redis-backed counter store shared by every instance.
//!
//! ## Key layout
//!
//! - `<prefix><limit-type>:<identifier>`: window counter, expires with the window
//! - `<prefix>block:<identifier>`: Unix-millisecond deadline written by abuse
//!   detection
//!
//! The increment runs as one Lua script, so `INCR` and the expiry are a
//! single atomic step even when two instances race on a fresh key.

use crate::error::StoreError;
use crate::store::{BlockList, CounterStore, WindowCount};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::fmt;
use std::time::Duration;
use tracing::warn;

const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
  ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

/// Redis counter store.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    key_prefix: String,
    increment: Script,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            increment: Script::new(INCREMENT_SCRIPT),
        })
    }

    fn block_key(&self, identifier: &str) -> String {
        format!("{}block:{}", self.key_prefix, identifier)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.connection.clone();
        let (count, ttl_ms): (u64, i64) = self
            .increment
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowCount {
            count,
            resets_in: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        })
    }
}

#[async_trait]
impl BlockList for RedisCounterStore {
    async fn blocked_until(&self, identifier: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.block_key(identifier)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match raw.trim().parse::<i64>() {
            Ok(ms) => Ok(Utc
                .timestamp_millis_opt(ms)
                .single()
                .filter(|until| *until > Utc::now())),
            Err(_) => {
                warn!(identifier, "Unparseable block deadline, treating as blocked");
                Ok(Some(DateTime::<Utc>::MAX_UTC))
            }
        }
    }
}
