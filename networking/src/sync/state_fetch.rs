use std::sync::Arc;

use containers::{Bytes, NodeHash};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use thiserror::Error;
use tracing::{debug, info, warn};
use trie::{NodeReader, NodeWriter, StateSync, StateSyncError, SyncResult};

use super::peer_manager::PeerManager;

/// Consecutive round trips without progress after which the download gives up.
pub const MAX_STALLED_ROUNDS: usize = 8;

/// Network requester trait for fetching trie entries.
///
/// Abstracts the network layer to allow testing with mocks.
#[async_trait::async_trait]
pub trait NodeDataRequester: Send + Sync {
    /// Request trie nodes or code by hash from a peer.
    ///
    /// The response lists data in request order and may stop short. Returns
    /// None if the request failed.
    async fn request_node_data(&self, peer_id: PeerId, hashes: Vec<NodeHash>) -> Option<Vec<Bytes>>;
}

#[derive(Debug, Error)]
pub enum StateFetchError {
    #[error(transparent)]
    Sync(#[from] StateSyncError),
    #[error("no peer available to serve state data")]
    NoPeers,
    #[error("state download stalled with {pending} entries pending")]
    Stalled { pending: usize },
}

/// State trie download driver.
///
/// Feeds a [`StateSync`] scheduler from the network: asks it for missing
/// entries, requests them from a peer, hands the response back for
/// verification and flushes resolved entries to the database after every
/// round trip.
///
/// A fast-sync [`Downloader`](crate::sync::Downloader) implementation drives
/// one of these per pivot state root once block data is in place.
pub struct StateFetcher<D, N> {
    sync: StateSync<Arc<D>>,
    database: Arc<D>,
    peer_manager: Arc<PeerManager>,
    network: N,
    max_fetch: usize,
    metrics: Option<SharedMetrics>,
}

impl<D, N> StateFetcher<D, N>
where
    D: NodeReader + NodeWriter,
    N: NodeDataRequester,
{
    pub fn new(
        root: NodeHash,
        database: Arc<D>,
        peer_manager: Arc<PeerManager>,
        network: N,
        max_fetch: usize,
    ) -> Self {
        Self {
            sync: StateSync::new(root, database.clone()),
            database,
            peer_manager,
            network,
            max_fetch,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn scheduler(&self) -> &StateSync<Arc<D>> {
        &self.sync
    }

    /// Number of entries still needed.
    pub fn pending(&self) -> usize {
        self.sync.pending()
    }

    /// Download every entry reachable from the root that the database lacks.
    ///
    /// Returns the number of entries written. A malformed node aborts the
    /// download with the scheduler's error; entries committed before it stay
    /// in the database so a restart resumes from there.
    pub async fn run(&mut self) -> Result<usize, StateFetchError> {
        let root = self.sync.root();
        let mut written = 0;
        let mut stalled = 0;

        info!(root = %root, pending = self.sync.pending(), "Starting state download");

        while !self.sync.is_done() {
            if stalled >= MAX_STALLED_ROUNDS {
                warn!(root = %root, pending = self.sync.pending(), "State download stalled");
                return Err(StateFetchError::Stalled {
                    pending: self.sync.pending(),
                });
            }

            let Some(peer_id) = self.peer_manager.select_peer_for_request() else {
                debug!("No available peer for state request");
                return Err(StateFetchError::NoPeers);
            };

            let hashes = self.sync.missing(self.max_fetch);
            if hashes.is_empty() {
                break;
            }

            if self.fetch_round(peer_id, &hashes).await? {
                stalled = 0;
            } else {
                stalled += 1;
            }

            let count = self.sync.commit(&*self.database)?;
            written += count;

            if let Some(metrics) = &self.metrics {
                metrics.inc_trie_nodes_committed(count as u64);
                metrics.set_trie_pending_entries(self.sync.pending() as i64);
            }
        }

        info!(root = %root, written, "State download complete");
        Ok(written)
    }

    /// One request and response. Returns whether any entry was resolved.
    async fn fetch_round(&mut self, peer_id: PeerId, hashes: &[NodeHash]) -> Result<bool, StateFetchError> {
        debug!(peer = %peer_id, num_hashes = hashes.len(), "Requesting state entries from peer");

        self.peer_manager.on_request_start(&peer_id);

        let Some(data) = self.network.request_node_data(peer_id, hashes.to_vec()).await else {
            warn!(peer = %peer_id, "State request failed");
            self.sync.release(hashes);
            self.peer_manager.on_request_failure(&peer_id, "request failed");
            return Ok(false);
        };

        let results: Vec<SyncResult> = hashes
            .iter()
            .zip(data)
            .map(|(hash, data)| SyncResult::new(*hash, data))
            .collect();
        let cached_before = self.sync.memcache_len();

        let outcome = self.sync.process(&results);

        // Whatever was not resolved goes back to the missing pool.
        self.sync.release(hashes);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.peer_manager.on_request_failure(&peer_id, "undecodable state entry");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_trie_nodes_rejected("decode");
                }
                return Err(err.into());
            }
        };

        let resolved = self.sync.memcache_len() - cached_before;
        if let Some(metrics) = &self.metrics {
            metrics.inc_trie_nodes_processed(resolved as u64);
        }

        match outcome.failed {
            Some(index) => {
                debug!(
                    peer = %peer_id,
                    index,
                    delivered = results.len(),
                    "Peer delivered invalid state entry"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_trie_nodes_rejected("invalid");
                }
                self.peer_manager.on_request_failure(&peer_id, "invalid state entry");
            }
            None => {
                if results.len() < hashes.len() {
                    debug!(
                        peer = %peer_id,
                        delivered = results.len(),
                        requested = hashes.len(),
                        "Peer returned partial state response"
                    );
                }
                self.peer_manager.on_request_complete(&peer_id);
            }
        }

        Ok(outcome.committed)
    }
}
