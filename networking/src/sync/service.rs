use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chain::ChainReader;
use containers::{NodeHash, TotalDifficulty};
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use thiserror::Error;
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;
/// Sync service driving chain synchronisation against the best peer.
///
/// The service owns the sync mode and the synced flag. It decides when to
/// sync and with whom; the download itself is delegated to a [`Downloader`].
use tracing::{debug, error, info, trace, warn};

use super::{
    config::SyncConfig,
    states::{SyncMode, SyncState, SyncStatus},
};
use crate::types::{PeerRef, PeerSet};

/// Chain downloader the sync service delegates to.
///
/// Abstracts the block and state transport to allow testing with mocks.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Sync the local chain up to `head` as served by `peer_id`.
    ///
    /// Returns false if the download was declined or failed; the caller
    /// retries on a later trigger.
    async fn synchronise(
        &self,
        peer_id: PeerId,
        head: NodeHash,
        total_difficulty: TotalDifficulty,
        mode: SyncMode,
    ) -> bool;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "found invalid total difficulty {total_difficulty:?} for current block {hash} (number {number}); \
         check available disk space and restart to attempt database recovery"
    )]
    InvalidTotalDifficulty {
        hash: NodeHash,
        number: u64,
        total_difficulty: Option<TotalDifficulty>,
    },
    #[error("sync halted after local chain corruption")]
    Halted,
}

/// What a single sync attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No peer to sync with.
    NoPeer,
    /// The peer's total difficulty does not exceed ours.
    NotAhead,
    /// The downloader declined or failed.
    Declined,
    Completed { mode: SyncMode },
}

pub struct SyncService<C, S, D> {
    config: SyncConfig,
    chain: Arc<C>,
    peers: Arc<S>,
    downloader: Arc<D>,
    status: Arc<SyncStatus>,
    metrics: Option<SharedMetrics>,
}

impl<C: ChainReader, S: PeerSet, D: Downloader> SyncService<C, S, D> {
    pub fn new(config: SyncConfig, chain: Arc<C>, peers: Arc<S>, downloader: Arc<D>) -> Self {
        let status = Arc::new(SyncStatus::new(config.fast_sync));

        Self {
            config,
            chain,
            peers,
            downloader,
            status,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        metrics.set_fast_sync_enabled(self.status.fast_sync());
        self.metrics = Some(metrics);
        self
    }

    /// Shared handle to the sync flags.
    pub fn status(&self) -> Arc<SyncStatus> {
        self.status.clone()
    }

    pub fn state(&self) -> SyncState {
        self.status.state()
    }

    pub fn mode(&self) -> SyncMode {
        self.status.mode()
    }

    /// Attempt a sync with `peer`, or with the best known peer if none is given.
    pub async fn trigger(&self, peer: Option<PeerRef>) -> Result<SyncOutcome, SyncError> {
        let peer = peer.or_else(|| self.peers.best_peer());
        self.synchronise(peer).await
    }

    /// Sync the local chain with `peer` if it claims a heavier chain.
    ///
    /// Fails only if the local head has no usable total difficulty. That
    /// halts the service: every later call returns [`SyncError::Halted`].
    pub async fn synchronise(&self, peer: Option<PeerRef>) -> Result<SyncOutcome, SyncError> {
        if self.status.halted() {
            return Err(SyncError::Halted);
        }

        let Some(peer) = peer else {
            trace!("No peer to sync with");
            return Ok(SyncOutcome::NoPeer);
        };

        let current = self.chain.current_block();
        let local_td = match self.chain.total_difficulty(&current.hash) {
            Some(td) if !td.is_zero() => td,
            total_difficulty => {
                self.status.halt();
                let err = SyncError::InvalidTotalDifficulty {
                    hash: current.hash,
                    number: current.number,
                    total_difficulty,
                };
                error!(%err, "Local chain is corrupted, sync halted");
                return Err(err);
            }
        };

        let peer_id = peer.id();
        let head = peer.head();
        if head.total_difficulty <= local_td {
            debug!(
                peer = %peer_id,
                peer_td = %head.total_difficulty,
                local_td = %local_td,
                "Peer not ahead, skipping sync"
            );
            return Ok(SyncOutcome::NotAhead);
        }

        let mode = self.status.mode();
        self.set_state(SyncState::Syncing);
        info!(
            peer = %peer_id,
            %mode,
            head = %head.hash,
            peer_td = %head.total_difficulty,
            local_td = %local_td,
            "Starting sync"
        );

        let started = Instant::now();
        let completed = self
            .downloader
            .synchronise(peer_id, head.hash, head.total_difficulty, mode)
            .await;

        if let Some(metrics) = &self.metrics {
            let result = if completed { "completed" } else { "declined" };
            metrics.inc_sync_attempts(mode.as_str(), result);
            metrics.observe_sync_duration(mode.as_str(), started.elapsed().as_secs_f64());
        }

        if !completed {
            debug!(peer = %peer_id, %mode, "Sync declined by downloader");
            self.set_state(SyncState::Idle);
            return Ok(SyncOutcome::Declined);
        }

        self.status.mark_synced();
        self.set_state(SyncState::Synced);

        if mode == SyncMode::FastSync && self.chain.current_height() > 0 {
            info!(height = self.chain.current_height(), "Fast sync complete, auto disabling");
            self.status.disable_fast_sync();
            if let Some(metrics) = &self.metrics {
                metrics.set_fast_sync_enabled(false);
            }
        }

        Ok(SyncOutcome::Completed { mode })
    }

    /// Syncer loop.
    ///
    /// Attempts a sync when the forced sync timer fires, or earlier when a
    /// peer connects and enough peers are known. The timer restarts after
    /// every attempt and attempts never overlap.
    pub async fn run(
        self,
        mut new_peers: mpsc::Receiver<PeerId>,
        shutdown: CancellationToken,
    ) -> Result<(), SyncError> {
        let period = self.config.force_sync_period();
        let mut new_peers_open = true;

        loop {
            let force_sync = time::sleep(period);
            tokio::pin!(force_sync);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Sync service shutting down");
                        return Ok(());
                    }
                    _ = &mut force_sync => {
                        trace!("Forced sync timer fired");
                        break;
                    }
                    event = new_peers.recv(), if new_peers_open => match event {
                        Some(peer_id) if self.peers.len() >= self.config.min_desired_peers => {
                            debug!(peer = %peer_id, peers = self.peers.len(), "New peer, syncing ahead of timer");
                            break;
                        }
                        Some(peer_id) => {
                            trace!(peer = %peer_id, peers = self.peers.len(), "New peer, waiting for more peers");
                        }
                        None => new_peers_open = false,
                    },
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Sync service shutting down during sync");
                    return Ok(());
                }
                outcome = self.trigger(None) => {
                    let outcome = outcome?;
                    trace!(?outcome, "Sync attempt finished");
                }
            }
        }
    }

    fn set_state(&self, target: SyncState) {
        let from = self.status.state();
        if !self.status.transition(target) {
            warn!(?from, to = ?target, "Invalid state transition attempted");
        } else if from != target {
            debug!(?from, to = ?target, "Sync state changed");
        }
    }
}
