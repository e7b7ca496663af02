use serde::{Deserialize, Serialize};

use crate::rate_limit::{DEFAULT_EDGE_LIMIT, DEFAULT_EDGE_WINDOW_SECS};
use crate::usage::{UsageLimits, DEFAULT_REQUESTS_PER_MINUTE};

fn default_requests_per_minute() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}
fn default_edge_requests_per_minute() -> u32 {
    DEFAULT_EDGE_LIMIT
}
fn default_edge_window_secs() -> u64 {
    DEFAULT_EDGE_WINDOW_SECS
}

/// Ceilings for the identity ledger and the edge limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Identity ledger minute ceiling; the daily ceiling is 24x this.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_edge_requests_per_minute")]
    pub edge_requests_per_minute: u32,
    #[serde(default = "default_edge_window_secs")]
    pub edge_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            edge_requests_per_minute: default_edge_requests_per_minute(),
            edge_window_secs: default_edge_window_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn usage_limits(&self) -> UsageLimits {
        UsageLimits::new(self.requests_per_minute.max(1))
    }

    pub fn edge_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.edge_window_secs.max(1))
    }
}
