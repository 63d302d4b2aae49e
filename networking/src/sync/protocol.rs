use std::sync::Arc;

use anyhow::Result;
use chain::TxPool;
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use super::{peer_manager::PeerManager, tx_sync::TxSyncHandle};
use crate::types::{PeerRef, PeerSet};

/// Connection lifecycle glue between the peer set, the sync service and the
/// transaction relay loop.
pub struct ProtocolManager<T> {
    peers: Arc<PeerManager>,
    tx_pool: Arc<T>,
    new_peers: mpsc::Sender<PeerId>,
    tx_sync: TxSyncHandle,
    metrics: Option<SharedMetrics>,
}

impl<T: TxPool> ProtocolManager<T> {
    pub fn new(
        peers: Arc<PeerManager>,
        tx_pool: Arc<T>,
        new_peers: mpsc::Sender<PeerId>,
        tx_sync: TxSyncHandle,
    ) -> Self {
        Self {
            peers,
            tx_pool,
            new_peers,
            tx_sync,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn peers(&self) -> &Arc<PeerManager> {
        &self.peers
    }

    /// Register a freshly handshaken peer, wake the syncer and queue the
    /// pending transactions for it.
    pub async fn on_peer_connected(&self, peer: PeerRef) -> Result<()> {
        let peer_id = peer.id();
        if !self.peers.add_peer(peer.clone()) {
            debug!(peer = %peer_id, "Peer already registered");
            return Ok(());
        }

        info!(peer = %peer_id, peers = self.peers.len(), "Peer connected");
        self.update_peer_count();

        match self.new_peers.try_send(peer_id) {
            // A queued notification already wakes the syncer.
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => debug!(peer = %peer_id, "Sync service stopped, not notifying"),
        }

        self.sync_transactions(peer).await
    }

    /// Drop a peer from the peer set and discard the transactions still
    /// queued for it. Returns whether the peer was registered.
    pub async fn on_peer_disconnected(&self, peer_id: &PeerId) -> Result<bool> {
        if self.peers.remove_peer(peer_id).is_none() {
            return Ok(false);
        }

        info!(peer = %peer_id, peers = self.peers.len(), "Peer disconnected");
        self.update_peer_count();
        self.tx_sync.unregister(*peer_id).await?;
        Ok(true)
    }

    /// Start sending all currently pending transactions to `peer`.
    async fn sync_transactions(&self, peer: PeerRef) -> Result<()> {
        let transactions = self.tx_pool.pending_transactions();
        if transactions.is_empty() {
            return Ok(());
        }

        debug!(peer = %peer.id(), num_txs = transactions.len(), "Queueing pending transactions for peer");
        self.tx_sync.register(peer, transactions).await
    }

    fn update_peer_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_peers(self.peers.len() as i64);
        }
    }
}
