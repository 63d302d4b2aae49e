use std::{sync::Arc, time::Duration};

use super::{MockPeer, create_test_tx};
use crate::sync::{PeerManager, ProtocolManager, TxSyncer};
use crate::types::{Peer, PeerSet};
use chain::MemoryTxPool;
use libp2p_identity::PeerId;
use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Harness {
    manager: ProtocolManager<MemoryTxPool>,
    peers: Arc<PeerManager>,
    pool: Arc<MemoryTxPool>,
    new_peers: mpsc::Receiver<PeerId>,
    shutdown: CancellationToken,
}

fn create_harness() -> Harness {
    let peers = Arc::new(PeerManager::new());
    let pool = Arc::new(MemoryTxPool::new());
    let (new_peers_tx, new_peers) = mpsc::channel(8);
    let (syncer, handle) = TxSyncer::with_rng(100 * 1024, StdRng::seed_from_u64(3));
    let shutdown = CancellationToken::new();
    tokio::spawn(syncer.run(shutdown.clone()));

    Harness {
        manager: ProtocolManager::new(peers.clone(), pool.clone(), new_peers_tx, handle),
        peers,
        pool,
        new_peers,
        shutdown,
    }
}

#[tokio::test]
async fn test_peer_connected_registers_and_relays() {
    let mut harness = create_harness();
    let transactions = vec![create_test_tx(100, 1), create_test_tx(200, 2)];
    for tx in &transactions {
        harness.pool.add(tx.clone());
    }
    let peer = MockPeer::new(10);

    harness.manager.on_peer_connected(peer.clone()).await.unwrap();

    assert_eq!(harness.peers.len(), 1);
    assert_eq!(harness.new_peers.try_recv().unwrap(), peer.id());

    for _ in 0..100 {
        if !peer.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(peer.sent(), vec![transactions]);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_peer_connected_with_empty_pool() {
    let mut harness = create_harness();
    let peer = MockPeer::new(10);

    harness.manager.on_peer_connected(peer.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.new_peers.try_recv().unwrap(), peer.id());
    assert_eq!(peer.attempts(), 0);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_duplicate_connection_ignored() {
    let mut harness = create_harness();
    let peer = MockPeer::new(10);

    harness.manager.on_peer_connected(peer.clone()).await.unwrap();
    harness.manager.on_peer_connected(peer.clone()).await.unwrap();

    assert_eq!(harness.peers.len(), 1);
    assert!(harness.new_peers.try_recv().is_ok());
    assert!(harness.new_peers.try_recv().is_err());

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_peer_disconnected_removes_peer() {
    let harness = create_harness();
    let peer = MockPeer::new(10);
    harness.manager.on_peer_connected(peer.clone()).await.unwrap();

    assert!(harness.manager.on_peer_disconnected(&peer.id()).await.unwrap());
    assert!(!harness.manager.on_peer_disconnected(&peer.id()).await.unwrap());
    assert!(harness.peers.is_empty());
    assert!(harness.manager.peers().best_peer().is_none());

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_disconnect_drops_transaction_backlog() {
    let harness = create_harness();
    for tag in 0..4 {
        harness.pool.add(create_test_tx(60 * 1024, tag));
    }
    let peer = MockPeer::new(10);

    harness.manager.on_peer_connected(peer.clone()).await.unwrap();
    harness.manager.on_peer_disconnected(&peer.id()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // At most the pack already in flight reaches the departed peer.
    assert!(peer.attempts() <= 1);

    harness.shutdown.cancel();
}

#[tokio::test]
async fn test_connect_survives_stopped_syncer() {
    let Harness {
        manager,
        peers,
        new_peers,
        shutdown,
        ..
    } = create_harness();
    drop(new_peers);

    manager.on_peer_connected(MockPeer::new(10)).await.unwrap();

    assert_eq!(peers.len(), 1);
    shutdown.cancel();
}
