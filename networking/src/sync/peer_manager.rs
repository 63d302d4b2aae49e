use super::config::MAX_CONCURRENT_REQUESTS;
use crate::types::{PeerRef, PeerSet};
use libp2p_identity::PeerId;
use parking_lot::RwLock;
/// Peer manager for sync operations.
///
/// Tracks connected peers and their claimed heads, and selects peers for
/// requests.
use std::collections::HashMap;
use tracing::debug;

/// Sync-specific peer state.
///
/// Wraps the peer session with request tracking.
#[derive(Debug, Clone)]
pub struct SyncPeer {
    pub peer: PeerRef,
    pub requests_in_flight: usize,
    pub failed_requests: usize,
}

impl SyncPeer {
    pub fn new(peer: PeerRef) -> Self {
        Self {
            peer,
            requests_in_flight: 0,
            failed_requests: 0,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer.id()
    }

    /// Check if peer is available for new requests.
    pub fn is_available(&self) -> bool {
        self.requests_in_flight < MAX_CONCURRENT_REQUESTS
    }

    /// Mark that a request has been sent to this peer.
    pub fn on_request_start(&mut self) {
        self.requests_in_flight += 1;
    }

    /// Mark that a request has completed.
    pub fn on_request_complete(&mut self) {
        self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
    }
}

/// Peer manager for sync operations.
///
/// Shared between the protocol handler, which adds and removes peers, and
/// the sync tasks, which read heads and account requests.
#[derive(Debug, Default)]
pub struct PeerManager {
    peers: RwLock<HashMap<PeerId, SyncPeer>>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer to the manager. A peer already known under the same id
    /// keeps its session.
    pub fn add_peer(&self, peer: PeerRef) -> bool {
        let peer_id = peer.id();
        let mut peers = self.peers.write();
        if peers.contains_key(&peer_id) {
            return false;
        }
        peers.insert(peer_id, SyncPeer::new(peer));
        true
    }

    /// Remove a peer from the manager.
    pub fn remove_peer(&self, peer_id: &PeerId) -> Option<SyncPeer> {
        self.peers.write().remove(peer_id)
    }

    /// Get a snapshot of a peer's sync state by ID.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<SyncPeer> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Select an available peer for a request.
    ///
    /// Prefers the peer with the fewest failed requests, then the fewest
    /// requests in flight, ties broken by peer id.
    pub fn select_peer_for_request(&self) -> Option<PeerId> {
        self.peers
            .read()
            .values()
            .filter(|peer| peer.is_available())
            .min_by_key(|peer| {
                (
                    peer.failed_requests,
                    peer.requests_in_flight,
                    peer.peer_id(),
                )
            })
            .map(SyncPeer::peer_id)
    }

    /// Mark that a request has been sent to a peer.
    pub fn on_request_start(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.on_request_start();
        }
    }

    /// Mark that a request has completed successfully.
    pub fn on_request_complete(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.on_request_complete();
        }
    }

    /// Mark that a request has failed.
    pub fn on_request_failure(&self, peer_id: &PeerId, reason: &str) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.on_request_complete();
            peer.failed_requests += 1;
            debug!(peer = %peer_id, reason, failures = peer.failed_requests, "Request to peer failed");
        }
    }

    /// Ids of all tracked peers.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().keys().copied().collect()
    }
}

impl PeerSet for PeerManager {
    fn best_peer(&self) -> Option<PeerRef> {
        self.peers
            .read()
            .values()
            .map(|sync_peer| (sync_peer.peer.head().total_difficulty, sync_peer))
            .max_by(|(left_td, left), (right_td, right)| {
                left_td
                    .cmp(right_td)
                    .then_with(|| right.peer_id().cmp(&left.peer_id()))
            })
            .map(|(_, sync_peer)| sync_peer.peer.clone())
    }

    fn len(&self) -> usize {
        self.peers.read().len()
    }

    fn peer(&self, peer_id: &PeerId) -> Option<PeerRef> {
        self.peers.read().get(peer_id).map(|sync_peer| sync_peer.peer.clone())
    }
}
