use std::{fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use containers::{PeerHead, Transaction};
use libp2p_identity::PeerId;

/// A connected remote node, as seen by the sync layer.
#[async_trait]
pub trait Peer: Send + Sync + Debug {
    fn id(&self) -> PeerId;

    /// Head block hash and total difficulty the peer claimed on handshake.
    fn head(&self) -> PeerHead;

    /// Transmit a batch of transactions. An error means the connection is
    /// no longer usable.
    async fn send_transactions(&self, transactions: Vec<Transaction>) -> Result<()>;
}

pub type PeerRef = Arc<dyn Peer>;

/// Set of peers the node currently has sessions with.
pub trait PeerSet: Send + Sync {
    /// Peer with the highest claimed total difficulty.
    fn best_peer(&self) -> Option<PeerRef>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn peer(&self, peer_id: &PeerId) -> Option<PeerRef>;
}
