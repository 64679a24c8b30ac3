// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Counter and block-list storage.
//!
//! Quotas only mean something when every instance sees the same counters,
//! so the limiter talks to a [`CounterStore`]. Each increment is a single
//! atomic increment-with-expiry: concurrent requests for the same key can
//! neither lose an update nor open a second window.
//!
//! [`MemoryCounterStore`] keeps state in process memory and is only correct
//! for a single instance. Multi-instance deployments use the Redis store
//! (`redis-store` feature).

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Counter value after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests counted in the current window, including this one
    pub count: u64,
    /// Time until the window resets
    pub resets_in: Duration,
}

/// Blocked identifier with its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub identifier: String,
    pub blocked_until: DateTime<Utc>,
}

/// Shared fixed-window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to `key`, opening a new window of length `window`
    /// if none is active.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;
}

/// Identifiers blocked by abuse detection.
///
/// The limiter only reads blocks; they are written by abuse detection
/// upstream of this crate.
#[async_trait]
pub trait BlockList: Send + Sync {
    async fn blocked_until(&self, identifier: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn is_blocked(&self, identifier: &str) -> Result<bool, StoreError> {
        Ok(self.blocked_until(identifier).await?.is_some())
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    resets_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    windows: HashMap<String, Window>,
    blocks: HashMap<String, DateTime<Utc>>,
}

/// Process-local store for single-instance deployments and tests.
pub struct MemoryCounterStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    /// Block an identifier until `until`.
    ///
    /// Stands in for the abuse-detection writer in single-instance setups.
    pub async fn block(&self, identifier: &str, until: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.blocks.insert(identifier.to_string(), until);
    }

    pub async fn unblock(&self, identifier: &str) {
        let mut state = self.state.lock().await;
        state.blocks.remove(identifier);
    }

    /// Number of live windows.
    pub async fn len(&self) -> usize {
        self.state.lock().await.windows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired windows and blocks (should be called periodically).
    pub async fn cleanup(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let before = state.windows.len();
        state.windows.retain(|_, window| window.resets_at > now);
        state.blocks.retain(|_, until| *until > now);
        debug!(
            removed = before - state.windows.len(),
            remaining = state.windows.len(),
            "Cleaned up rate limit windows"
        );
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCounterStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let span = ChronoDuration::from_std(window)
            .map_err(|e| StoreError::Unavailable(format!("window out of range: {e}")))?;
        let now = self.clock.now();

        let mut state = self.state.lock().await;
        let entry = state.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + span,
        });
        if entry.resets_at <= now {
            *entry = Window {
                count: 0,
                resets_at: now + span,
            };
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            resets_in: (entry.resets_at - now).to_std().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl BlockList for MemoryCounterStore {
    async fn blocked_until(&self, identifier: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        Ok(state
            .blocks
            .get(identifier)
            .copied()
            .filter(|until| *until > now))
    }
}
