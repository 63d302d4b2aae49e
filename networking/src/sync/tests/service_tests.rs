use std::{sync::Arc, time::Duration};

use super::MockPeer;
use crate::sync::{
    Downloader, PeerManager, SyncConfig, SyncError, SyncMode, SyncOutcome, SyncService, SyncState,
};
use crate::types::{Peer, PeerRef};
use async_trait::async_trait;
use chain::{ChainReader, MemoryChain};
use containers::{
    BlockHeader, NodeHash, TotalDifficulty,
    alloy_primitives::{B256, U256},
};
use libp2p_identity::PeerId;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type Call = (PeerId, NodeHash, TotalDifficulty, SyncMode);

// Mock downloader recording every request
struct MockDownloader {
    succeed: bool,
    /// Chain to advance to this height on success.
    advance: Option<(Arc<MemoryChain>, u64)>,
    calls: Mutex<Vec<Call>>,
}

impl MockDownloader {
    fn new(succeed: bool) -> Arc<Self> {
        Arc::new(Self {
            succeed,
            advance: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn advancing(chain: Arc<MemoryChain>, height: u64) -> Arc<Self> {
        Arc::new(Self {
            succeed: true,
            advance: Some((chain, height)),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn synchronise(
        &self,
        peer_id: PeerId,
        head: NodeHash,
        total_difficulty: TotalDifficulty,
        mode: SyncMode,
    ) -> bool {
        self.calls.lock().push((peer_id, head, total_difficulty, mode));
        if self.succeed {
            if let Some((chain, height)) = &self.advance {
                chain.set_head(BlockHeader::new(*height, head, B256::ZERO), total_difficulty);
            }
        }
        self.succeed
    }
}

// Chain whose head has no stored total difficulty
struct CorruptChain;

impl ChainReader for CorruptChain {
    fn current_block(&self) -> BlockHeader {
        BlockHeader::new(7, B256::repeat_byte(7), B256::repeat_byte(6))
    }

    fn total_difficulty(&self, _hash: &NodeHash) -> Option<TotalDifficulty> {
        None
    }
}

fn create_test_chain(total_difficulty: u64) -> Arc<MemoryChain> {
    let genesis = BlockHeader::new(0, B256::repeat_byte(1), B256::ZERO);
    Arc::new(MemoryChain::new(genesis, U256::from(total_difficulty)))
}

fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        fast_sync: true,
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_synchronise_skips_peer_not_ahead() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        fast_sync_config(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    let outcome = service.synchronise(Some(MockPeer::new(100))).await.unwrap();

    assert_eq!(outcome, SyncOutcome::NotAhead);
    assert!(downloader.calls().is_empty());
    assert_eq!(service.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_synchronise_peer_ahead_calls_downloader_once() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        fast_sync_config(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );
    let peer = MockPeer::new(101);

    let outcome = service.synchronise(Some(peer.clone())).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Completed { mode: SyncMode::FastSync });
    assert_eq!(
        downloader.calls(),
        vec![(peer.id(), peer.head().hash, U256::from(101u64), SyncMode::FastSync)]
    );
    assert!(service.status().synced());
    assert_eq!(service.state(), SyncState::Synced);
}

#[tokio::test]
async fn test_fast_sync_disabled_after_non_empty_chain() {
    let chain = create_test_chain(100);
    let downloader = MockDownloader::advancing(chain.clone(), 500);
    let service = SyncService::new(
        fast_sync_config(),
        chain.clone(),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    service.synchronise(Some(MockPeer::new(101))).await.unwrap();

    assert_eq!(chain.current_height(), 500);
    assert_eq!(service.mode(), SyncMode::FullSync);

    service.synchronise(Some(MockPeer::new(102))).await.unwrap();

    let modes: Vec<SyncMode> = downloader.calls().iter().map(|call| call.3).collect();
    assert_eq!(modes, vec![SyncMode::FastSync, SyncMode::FullSync]);
    assert_eq!(service.mode(), SyncMode::FullSync);
}

#[tokio::test]
async fn test_fast_sync_kept_while_chain_empty() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        fast_sync_config(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader,
    );

    service.synchronise(Some(MockPeer::new(101))).await.unwrap();

    assert!(service.status().synced());
    assert_eq!(service.mode(), SyncMode::FastSync);
}

#[tokio::test]
async fn test_declined_sync_returns_to_idle() {
    let downloader = MockDownloader::new(false);
    let service = SyncService::new(
        fast_sync_config(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    let outcome = service.synchronise(Some(MockPeer::new(101))).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Declined);
    assert_eq!(downloader.calls().len(), 1);
    assert_eq!(service.state(), SyncState::Idle);
    assert!(!service.status().synced());
    assert_eq!(service.mode(), SyncMode::FastSync);
}

#[tokio::test]
async fn test_zero_total_difficulty_halts_sync() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        SyncConfig::default(),
        create_test_chain(0),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    let err = service.synchronise(Some(MockPeer::new(101))).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::InvalidTotalDifficulty { number: 0, total_difficulty: Some(td), .. } if td.is_zero()
    ));
    assert!(service.status().halted());

    let err = service.synchronise(Some(MockPeer::new(101))).await.unwrap_err();
    assert!(matches!(err, SyncError::Halted));
    assert!(downloader.calls().is_empty());
}

#[tokio::test]
async fn test_missing_total_difficulty_halts_sync() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        SyncConfig::default(),
        Arc::new(CorruptChain),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    let err = service.synchronise(Some(MockPeer::new(101))).await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::InvalidTotalDifficulty { number: 7, total_difficulty: None, .. }
    ));
    assert!(downloader.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_without_peers_is_noop() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        SyncConfig::default(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader.clone(),
    );

    assert_eq!(service.trigger(None).await.unwrap(), SyncOutcome::NoPeer);
    assert!(downloader.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_uses_best_peer() {
    let downloader = MockDownloader::new(true);
    let peers = Arc::new(PeerManager::new());
    let heavy = MockPeer::new(300);
    peers.add_peer(MockPeer::new(150));
    peers.add_peer(heavy.clone());
    peers.add_peer(MockPeer::new(200));
    let service = SyncService::new(
        SyncConfig::default(),
        create_test_chain(100),
        peers,
        downloader.clone(),
    );

    service.trigger(None).await.unwrap();

    let calls = downloader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, heavy.id());
    assert_eq!(calls[0].3, SyncMode::FullSync);
}

#[tokio::test(start_paused = true)]
async fn test_run_syncs_on_timer() {
    let chain = create_test_chain(100);
    let downloader = MockDownloader::advancing(chain.clone(), 1);
    let peers = Arc::new(PeerManager::new());
    peers.add_peer(MockPeer::new(101));
    let service = SyncService::new(SyncConfig::default(), chain, peers, downloader.clone());
    let status = service.status();

    let (_new_peers_tx, new_peers_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(service.run(new_peers_rx, shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(downloader.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(downloader.calls().len(), 1);
    assert!(status.synced());

    // The peer is no longer ahead, later timer ticks do not call the downloader.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(downloader.calls().len(), 1);

    shutdown.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_run_new_peer_waits_for_min_peers() {
    let downloader = MockDownloader::new(false);
    let peers = Arc::new(PeerManager::new());
    let config = SyncConfig {
        min_desired_peers: 2,
        ..SyncConfig::default()
    };
    let service = SyncService::new(config, create_test_chain(100), peers.clone(), downloader.clone());

    let (new_peers_tx, new_peers_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(service.run(new_peers_rx, shutdown.clone()));

    let first: PeerRef = MockPeer::new(101);
    peers.add_peer(first.clone());
    new_peers_tx.send(first.id()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(downloader.calls().is_empty());

    let second: PeerRef = MockPeer::new(102);
    peers.add_peer(second.clone());
    new_peers_tx.send(second.id()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let calls = downloader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, second.id());

    shutdown.cancel();
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_run_exits_on_corrupt_chain() {
    let downloader = MockDownloader::new(true);
    let peers = Arc::new(PeerManager::new());
    peers.add_peer(MockPeer::new(101));
    let service = SyncService::new(
        SyncConfig::default(),
        Arc::new(CorruptChain),
        peers,
        downloader.clone(),
    );
    let status = service.status();

    let (_new_peers_tx, new_peers_rx) = mpsc::channel(8);
    let result = service.run(new_peers_rx, CancellationToken::new()).await;

    assert!(matches!(result, Err(SyncError::InvalidTotalDifficulty { .. })));
    assert!(status.halted());
    assert!(downloader.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown() {
    let downloader = MockDownloader::new(true);
    let service = SyncService::new(
        SyncConfig::default(),
        create_test_chain(100),
        Arc::new(PeerManager::new()),
        downloader,
    );
    let (_new_peers_tx, new_peers_rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    assert!(service.run(new_peers_rx, shutdown).await.is_ok());
}
