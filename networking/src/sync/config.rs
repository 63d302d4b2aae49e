/// Sync service configuration.
///
/// Compile-time defaults plus the runtime [`SyncConfig`] they seed.
use std::time::Duration;

use serde::Deserialize;

/// Interval after which a sync attempt is forced even without new peers (in seconds).
pub const FORCE_SYNC_INTERVAL_SECS: u64 = 10;

/// Peers needed before a new connection may start a sync ahead of the timer.
pub const MIN_DESIRED_PEER_COUNT: usize = 5;

/// Target payload size of one transaction pack sent to a new peer.
/// A single transaction larger than this is still sent, alone.
pub const TX_SYNC_PACK_SIZE: usize = 100 * 1024;

/// Maximum trie entries requested from a peer in one round trip.
pub const MAX_STATE_FETCH: usize = 384;

/// Maximum concurrent requests to a single peer.
pub const MAX_CONCURRENT_REQUESTS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Start in fast sync mode. Disabled automatically after the first
    /// successful sync that leaves a non-empty chain.
    pub fast_sync: bool,
    /// Forced sync interval in seconds.
    pub force_sync_interval: u64,
    pub min_desired_peers: usize,
    pub tx_pack_size: usize,
    pub max_state_fetch: usize,
}

impl SyncConfig {
    pub fn force_sync_period(&self) -> Duration {
        Duration::from_secs(self.force_sync_interval)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fast_sync: false,
            force_sync_interval: FORCE_SYNC_INTERVAL_SECS,
            min_desired_peers: MIN_DESIRED_PEER_COUNT,
            tx_pack_size: TX_SYNC_PACK_SIZE,
            max_state_fetch: MAX_STATE_FETCH,
        }
    }
}
