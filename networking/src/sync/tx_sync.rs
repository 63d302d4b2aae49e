//! Initial transaction relay for new connections.
//!
//! When a peer connects, every pending transaction is relayed to it. To keep
//! egress bandwidth low, transactions go out in bounded packs, one pack at a
//! time across all peers.

use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};
use containers::Transaction;
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::types::PeerRef;

const TX_SYNC_CHANNEL_CAPACITY: usize = 64;

/// A batch of transactions about to be sent to one peer.
#[derive(Debug, Clone)]
pub struct TxPack {
    pub peer: PeerRef,
    pub transactions: Vec<Transaction>,
    /// Total payload size of `transactions`.
    pub size: usize,
}

#[derive(Debug)]
struct TxBacklog {
    peer: PeerRef,
    transactions: VecDeque<Transaction>,
}

/// Per-peer transaction backlogs and the pack selection policy.
#[derive(Debug)]
pub struct TxSyncState {
    pending: HashMap<PeerId, TxBacklog>,
    pack_size: usize,
    rng: StdRng,
}

impl TxSyncState {
    pub fn new(pack_size: usize, rng: StdRng) -> Self {
        Self {
            pending: HashMap::new(),
            pack_size,
            rng,
        }
    }

    /// Queue `transactions` for `peer`, replacing any backlog it still has.
    pub fn register(&mut self, peer: PeerRef, transactions: Vec<Transaction>) -> PeerId {
        let peer_id = peer.id();
        if transactions.is_empty() {
            self.pending.remove(&peer_id);
            return peer_id;
        }

        let replaced = self
            .pending
            .insert(
                peer_id,
                TxBacklog {
                    peer,
                    transactions: transactions.into(),
                },
            )
            .is_some();
        trace!(peer = %peer_id, replaced, "Registered transaction backlog");
        peer_id
    }

    /// Choose a peer with a non-empty backlog, uniformly at random.
    pub fn pick(&mut self) -> Option<PeerId> {
        let mut peer_ids: Vec<PeerId> = self.pending.keys().copied().collect();
        peer_ids.sort();
        peer_ids.choose(&mut self.rng).copied()
    }

    /// Cut the next pack off the front of `peer_id`'s backlog.
    ///
    /// The first transaction is always taken, even if it alone exceeds the
    /// target size. The peer is dropped from the pending set once its
    /// backlog is empty.
    pub fn take_pack(&mut self, peer_id: &PeerId) -> Option<TxPack> {
        let backlog = self.pending.get_mut(peer_id)?;

        let mut transactions = Vec::new();
        let mut size = 0;
        while let Some(next) = backlog.transactions.front() {
            if !transactions.is_empty() && size + next.size() > self.pack_size {
                break;
            }
            let Some(tx) = backlog.transactions.pop_front() else {
                break;
            };
            size += tx.size();
            transactions.push(tx);
        }

        let peer = backlog.peer.clone();
        if backlog.transactions.is_empty() {
            self.pending.remove(peer_id);
        }

        if transactions.is_empty() {
            return None;
        }

        Some(TxPack {
            peer,
            transactions,
            size,
        })
    }

    /// Pack for a randomly picked peer.
    pub fn next_pack(&mut self) -> Option<TxPack> {
        let peer_id = self.pick()?;
        self.take_pack(&peer_id)
    }

    /// Drop whatever is still queued for `peer_id`.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        self.pending.remove(peer_id).is_some()
    }

    /// Forget a peer whose send failed.
    pub fn on_send_failure(&mut self, peer_id: &PeerId) {
        self.remove(peer_id);
    }

    pub fn is_pending(&self, peer_id: &PeerId) -> bool {
        self.pending.contains_key(peer_id)
    }

    /// Transactions still queued for `peer_id`.
    pub fn backlog(&self, peer_id: &PeerId) -> Option<Vec<Transaction>> {
        self.pending
            .get(peer_id)
            .map(|backlog| backlog.transactions.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Messages handed to the relay loop.
#[derive(Debug)]
pub enum TxSyncRequest {
    /// A new peer and the transaction snapshot to relay to it.
    Register {
        peer: PeerRef,
        transactions: Vec<Transaction>,
    },
    /// The peer went away, its backlog is dropped.
    Unregister(PeerId),
}

type SendResult = (PeerId, usize, Result<()>);

/// Sending side of the relay loop.
#[derive(Debug, Clone)]
pub struct TxSyncHandle {
    sender: mpsc::Sender<TxSyncRequest>,
}

impl TxSyncHandle {
    pub async fn register(&self, peer: PeerRef, transactions: Vec<Transaction>) -> Result<()> {
        self.sender
            .send(TxSyncRequest::Register { peer, transactions })
            .await
            .map_err(|_| anyhow!("transaction sync loop stopped"))
    }

    pub async fn unregister(&self, peer_id: PeerId) -> Result<()> {
        self.sender
            .send(TxSyncRequest::Unregister(peer_id))
            .await
            .map_err(|_| anyhow!("transaction sync loop stopped"))
    }
}

/// Relay loop draining [`TxSyncState`], with at most one send in flight.
pub struct TxSyncer {
    state: TxSyncState,
    requests: mpsc::Receiver<TxSyncRequest>,
    metrics: Option<SharedMetrics>,
}

impl TxSyncer {
    pub fn new(pack_size: usize) -> (Self, TxSyncHandle) {
        Self::with_rng(pack_size, StdRng::from_entropy())
    }

    pub fn with_rng(pack_size: usize, rng: StdRng) -> (Self, TxSyncHandle) {
        let (sender, requests) = mpsc::channel(TX_SYNC_CHANNEL_CAPACITY);
        let syncer = Self {
            state: TxSyncState::new(pack_size, rng),
            requests,
            metrics: None,
        };
        (syncer, TxSyncHandle { sender })
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let (done_tx, mut done_rx) = mpsc::channel::<SendResult>(1);
        let mut sending: Option<JoinHandle<()>> = None;
        let mut requests_open = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Some(handle) = sending.take() {
                        handle.abort();
                    }
                    debug!(pending = self.state.len(), "Transaction sync loop shutting down");
                    return;
                }
                request = self.requests.recv(), if requests_open => {
                    match request {
                        Some(TxSyncRequest::Register { peer, transactions }) => {
                            let peer_id = self.state.register(peer, transactions);
                            if sending.is_none() {
                                if let Some(pack) = self.state.take_pack(&peer_id) {
                                    sending = Some(self.send(pack, done_tx.clone()));
                                }
                            }
                        }
                        Some(TxSyncRequest::Unregister(peer_id)) => {
                            if self.state.remove(&peer_id) {
                                trace!(peer = %peer_id, "Dropped transaction backlog");
                            }
                        }
                        None => requests_open = false,
                    }
                }
                Some((peer_id, size, result)) = done_rx.recv() => {
                    sending = None;
                    match result {
                        Ok(()) => {
                            if let Some(metrics) = &self.metrics {
                                metrics.inc_tx_packs_sent(size as u64);
                            }
                        }
                        Err(err) => {
                            debug!(peer = %peer_id, %err, "Transaction send failed");
                            self.state.on_send_failure(&peer_id);
                            if let Some(metrics) = &self.metrics {
                                metrics.inc_tx_send_failures();
                            }
                        }
                    }
                    if let Some(pack) = self.state.next_pack() {
                        sending = Some(self.send(pack, done_tx.clone()));
                    }
                }
            }
        }
    }

    fn send(&self, pack: TxPack, done: mpsc::Sender<SendResult>) -> JoinHandle<()> {
        let peer_id = pack.peer.id();
        trace!(peer = %peer_id, num_txs = pack.transactions.len(), size = pack.size, "Sending transactions");

        tokio::spawn(async move {
            let result = pack.peer.send_transactions(pack.transactions).await;
            let _ = done.send((peer_id, pack.size, result)).await;
        })
    }
}
