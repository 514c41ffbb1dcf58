use serde::{Deserialize, Serialize};

use crate::storage::StoreStats;

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Messages not yet acknowledged, in any state.
    pub depth: u64,
    pub unclaimed: u64,
    /// Messages under a running lease.
    pub in_flight: u64,
    /// Messages whose lease lapsed; claimable again.
    pub expired: u64,
    /// Instant the counts were taken at, unix milliseconds.
    pub as_of: u64,
}

impl QueueStats {
    pub(crate) fn from_store(stats: StoreStats, as_of: u64) -> Self {
        Self {
            depth: stats.total,
            unclaimed: stats.unclaimed,
            in_flight: stats.leased,
            expired: stats.expired,
            as_of,
        }
    }

    /// Messages a claim issued now could pick up.
    pub fn claimable(&self) -> u64 {
        self.unclaimed + self.expired
    }
}
