// src/usage/mod.rs
//! Per-identity usage ledger: rolling daily and per-minute request windows.
//!
//! The ledger is an explicit service object. It owns the records in its
//! [`UsageStore`] and evaluates windows against an injected [`Clock`]; nothing
//! here is a module-level singleton.
//!
//! Windows reset lazily: a counter rolls back to zero the first time the ledger
//! touches the record after the window's duration has elapsed.

pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
pub use store::{InMemoryUsageStore, UsageRecord, UsageStore};

pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 15;

fn minute_window() -> Duration {
    Duration::seconds(60)
}

fn daily_window() -> Duration {
    Duration::hours(24)
}

/// Token count charged for a response. This is the response length in
/// characters, a stand-in for the provider's real token accounting.
pub fn approximate_tokens(response_text: &str) -> u64 {
    response_text.chars().count() as u64
}

/// Request ceilings. The daily ceiling is derived from the minute ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub per_minute: u32,
}

impl UsageLimits {
    pub fn new(per_minute: u32) -> Self {
        Self { per_minute }
    }

    pub fn per_day(&self) -> u32 {
        self.per_minute.saturating_mul(24)
    }
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    pub can_proceed: bool,
    pub daily_remaining: u32,
    pub minute_remaining: u32,
    pub next_daily_reset: DateTime<Utc>,
    pub next_minute_reset: DateTime<Utc>,
}

impl UsageStatus {
    /// How long until every exhausted window has reset.
    ///
    /// An exhausted daily window outlasts the minute window, so it wins even
    /// when both are at zero.
    pub fn retry_after(&self, now: DateTime<Utc>) -> std::time::Duration {
        let at = if self.daily_remaining == 0 {
            self.next_daily_reset.max(self.next_minute_reset)
        } else if self.minute_remaining == 0 {
            self.next_minute_reset
        } else {
            now
        };
        (at - now).to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub identity: String,
    pub total_requests: u64,
    pub total_tokens: u64,
    pub daily_requests: u32,
    pub minute_requests: u32,
    pub daily_remaining: u32,
    pub minute_remaining: u32,
    pub can_proceed: bool,
    pub last_daily_reset: DateTime<Utc>,
    pub next_minute_reset: DateTime<Utc>,
}

pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    limits: UsageLimits,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>, limits: UsageLimits) -> Self {
        Self {
            store,
            clock,
            limits,
        }
    }

    /// In-memory store on the wall clock.
    pub fn in_memory(limits: UsageLimits) -> Self {
        Self::new(
            Arc::new(InMemoryUsageStore::new()),
            Arc::new(SystemClock),
            limits,
        )
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Raw record, created on first access.
    pub fn get(&self, identity: &str) -> UsageRecord {
        self.store.get(identity, self.clock.now())
    }

    /// Account one completed request carrying `tokens`.
    pub fn record(&self, identity: &str, tokens: u64) -> UsageRecord {
        let now = self.clock.now();
        self.store.modify(identity, now, &mut |rec| {
            roll_windows(rec, now);
            count_request(rec, tokens);
        })
    }

    pub fn status(&self, identity: &str) -> UsageStatus {
        let now = self.clock.now();
        let rec = self
            .store
            .modify(identity, now, &mut |rec| roll_windows(rec, now));
        status_of(&rec, self.limits)
    }

    pub fn stats(&self, identity: &str) -> UsageStats {
        let now = self.clock.now();
        let rec = self
            .store
            .modify(identity, now, &mut |rec| roll_windows(rec, now));
        let status = status_of(&rec, self.limits);
        UsageStats {
            identity: identity.to_string(),
            total_requests: rec.total_requests,
            total_tokens: rec.total_tokens,
            daily_requests: rec.daily_count,
            minute_requests: rec.minute_count,
            daily_remaining: status.daily_remaining,
            minute_remaining: status.minute_remaining,
            can_proceed: status.can_proceed,
            last_daily_reset: rec.last_daily_reset,
            next_minute_reset: status.next_minute_reset,
        }
    }

    /// Check-and-reserve under the identity's lock.
    ///
    /// On success a slot is held until the reservation is committed (counters
    /// incremented) or dropped (slot released, counters untouched). On refusal
    /// the status that caused it is returned.
    pub fn reserve(&self, identity: &str) -> Result<UsageReservation<'_>, UsageStatus> {
        let now = self.clock.now();
        let limits = self.limits;
        let mut verdict: Option<UsageStatus> = None;
        self.store.modify(identity, now, &mut |rec| {
            roll_windows(rec, now);
            let status = status_of(rec, limits);
            if status.can_proceed {
                rec.in_flight = rec.in_flight.saturating_add(1);
                verdict = None;
            } else {
                verdict = Some(status);
            }
        });
        match verdict {
            Some(refused) => Err(refused),
            None => Ok(UsageReservation {
                ledger: self,
                identity: identity.to_string(),
                settled: false,
            }),
        }
    }

    /// Record `requests` synthetic requests with random token counts. Ceilings are not checked.
    pub fn simulate(&self, identity: &str, requests: u32) {
        let mut rng = rand::rng();
        for _ in 0..requests {
            let tokens = rng.random_range(500..1500);
            self.record(identity, tokens);
        }
        debug!(identity, requests, "simulated usage");
    }

    pub fn clear(&self, identity: &str) -> bool {
        self.store.remove(identity)
    }

    pub fn all(&self) -> Vec<(String, UsageRecord)> {
        self.store.all()
    }

    fn settle(&self, identity: &str, tokens: Option<u64>) -> UsageRecord {
        let now = self.clock.now();
        self.store.modify(identity, now, &mut |rec| {
            rec.in_flight = rec.in_flight.saturating_sub(1);
            if let Some(tokens) = tokens {
                roll_windows(rec, now);
                count_request(rec, tokens);
            }
        })
    }
}

/// A slot admitted by [`UsageLedger::reserve`].
#[must_use = "dropping a reservation releases the slot without recording usage"]
pub struct UsageReservation<'a> {
    ledger: &'a UsageLedger,
    identity: String,
    settled: bool,
}

impl UsageReservation<'_> {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Turn the reservation into a recorded request.
    pub fn commit(mut self, tokens: u64) -> UsageRecord {
        self.settled = true;
        self.ledger.settle(&self.identity, Some(tokens))
    }
}

impl Drop for UsageReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.ledger.settle(&self.identity, None);
        }
    }
}

fn roll_windows(rec: &mut UsageRecord, now: DateTime<Utc>) {
    if now - rec.last_daily_reset > daily_window() {
        rec.daily_count = 0;
        rec.last_daily_reset = now;
    }
    if now - rec.last_minute_reset > minute_window() {
        rec.minute_count = 0;
        rec.last_minute_reset = now;
    }
}

fn count_request(rec: &mut UsageRecord, tokens: u64) {
    rec.daily_count = rec.daily_count.saturating_add(1);
    rec.minute_count = rec.minute_count.saturating_add(1);
    rec.total_requests = rec.total_requests.saturating_add(1);
    rec.total_tokens = rec.total_tokens.saturating_add(tokens);
}

fn status_of(rec: &UsageRecord, limits: UsageLimits) -> UsageStatus {
    let daily_remaining = limits
        .per_day()
        .saturating_sub(rec.daily_count.saturating_add(rec.in_flight));
    let minute_remaining = limits
        .per_minute
        .saturating_sub(rec.minute_count.saturating_add(rec.in_flight));
    UsageStatus {
        can_proceed: daily_remaining > 0 && minute_remaining > 0,
        daily_remaining,
        minute_remaining,
        next_daily_reset: rec.last_daily_reset + daily_window(),
        next_minute_reset: rec.last_minute_reset + minute_window(),
    }
}
