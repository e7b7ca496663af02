//! Edge rate limiter keyed by caller address.
//!
//! Fixed window per address, independent of the identity ledger in
//! [`crate::usage`]. The two layers are not reconciled: this one is coarse
//! abuse protection at the entry point, the ledger is per-user quota.
//!
//! Known coarsening: callers without a usable forwarded/peer header all share
//! the [`UNKNOWN_CALLER`] bucket, so one noisy anonymous client can exhaust the
//! quota for every other anonymous client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::keyed::KeyedCells;

pub const UNKNOWN_CALLER: &str = "unknown";
pub const DEFAULT_EDGE_LIMIT: u32 = 15;
pub const DEFAULT_EDGE_WINDOW_SECS: u64 = 60;
/// Expired entries are swept once every this many checks.
pub const SWEEP_INTERVAL: u64 = 1024;

/// Best-effort caller address: first `x-forwarded-for` value, then `x-real-ip`,
/// then the shared unknown bucket.
pub fn client_address(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_CALLER)
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDecision {
    pub limited: bool,
    pub remaining: u32,
    pub reset_in_ms: u64,
}

pub struct EdgeRateLimiter {
    entries: KeyedCells<RateLimitEntry>,
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    checks: AtomicU64,
}

impl EdgeRateLimiter {
    pub fn new(limit: u32, window: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: KeyedCells::new(),
            limit: limit.max(1),
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
            clock,
            checks: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_EDGE_LIMIT,
            std::time::Duration::from_secs(DEFAULT_EDGE_WINDOW_SECS),
            Arc::new(SystemClock),
        )
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request from `address` and report whether it is over the limit.
    pub fn check(&self, address: &str) -> EdgeDecision {
        let now = self.clock.now();
        // Addresses come from request headers; stale ones are dropped periodically.
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.sweep_at(now);
        }
        let window = self.window;
        let limit = self.limit;
        self.entries.with(
            address,
            || RateLimitEntry {
                count: 0,
                window_reset_at: now,
            },
            |entry| {
                if entry.count == 0 || now > entry.window_reset_at {
                    entry.count = 1;
                    entry.window_reset_at = now + window;
                    return EdgeDecision {
                        limited: false,
                        remaining: limit - 1,
                        reset_in_ms: window.num_milliseconds().max(0) as u64,
                    };
                }
                let reset_in_ms = (entry.window_reset_at - now).num_milliseconds().max(0) as u64;
                if entry.count >= limit {
                    return EdgeDecision {
                        limited: true,
                        remaining: 0,
                        reset_in_ms,
                    };
                }
                entry.count += 1;
                EdgeDecision {
                    limited: false,
                    remaining: limit - entry.count,
                    reset_in_ms,
                }
            },
        )
    }

    pub fn tracked_addresses(&self) -> usize {
        self.entries.len()
    }

    /// Forget addresses whose window has ended. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at(self.clock.now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let dropped = self.entries.retain(|entry| now <= entry.window_reset_at);
        if dropped > 0 {
            debug!(dropped, remaining = self.entries.len(), "swept expired edge entries");
        }
        dropped
    }
}
