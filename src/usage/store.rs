//! Storage seam for per-identity usage records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::keyed::KeyedCells;

/// Counters kept per identity. Windows roll lazily when a request observes them expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub daily_count: u32,
    pub last_daily_reset: DateTime<Utc>,
    pub minute_count: u32,
    pub last_minute_reset: DateTime<Utc>,
    pub total_requests: u64,
    pub total_tokens: u64,
    /// Admitted requests whose model call has not finished yet.
    #[serde(default)]
    pub in_flight: u32,
}

impl UsageRecord {
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            last_daily_reset: now,
            minute_count: 0,
            last_minute_reset: now,
            total_requests: 0,
            total_tokens: 0,
            in_flight: 0,
        }
    }
}

/// Backing store for the usage ledger.
///
/// `modify` must run `apply` atomically with respect to other calls for the
/// same identity; calls for different identities should not block each other.
pub trait UsageStore: Send + Sync {
    /// Current record, created with zeroed counters on first access.
    fn get(&self, identity: &str, now: DateTime<Utc>) -> UsageRecord;

    /// Mutate the record for `identity` in place and return the result.
    fn modify(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(&mut UsageRecord),
    ) -> UsageRecord;

    fn remove(&self, identity: &str) -> bool;

    fn all(&self) -> Vec<(String, UsageRecord)>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: KeyedCells<UsageRecord>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn get(&self, identity: &str, now: DateTime<Utc>) -> UsageRecord {
        self.records
            .with(identity, || UsageRecord::fresh(now), |rec| rec.clone())
    }

    fn modify(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        apply: &mut dyn FnMut(&mut UsageRecord),
    ) -> UsageRecord {
        self.records.with(
            identity,
            || UsageRecord::fresh(now),
            |rec| {
                apply(rec);
                rec.clone()
            },
        )
    }

    fn remove(&self, identity: &str) -> bool {
        self.records.remove(identity)
    }

    fn all(&self) -> Vec<(String, UsageRecord)> {
        self.records.snapshot()
    }
}
