/// Chain and state synchronisation for an execution-layer node.
///
/// This module decides when and from whom the node syncs, and relays the
/// local transaction backlog to new peers. It includes:
///
/// - **Peer Manager**: Tracks connected peers, their claimed heads and request load
/// - **Sync Service**: Periodically syncs with the best peer through a downloader
/// - **State Fetcher**: Drives the state trie scheduler against the network
/// - **Tx Sync**: Sends pending transactions to new peers in bounded packs
/// - **Protocol Manager**: Wires peer connection events into the above
///
/// ## Sync triggers
///
/// 1. A forced sync timer fires (every `FORCE_SYNC_INTERVAL_SECS`)
/// 2. A peer connects and at least `MIN_DESIRED_PEER_COUNT` peers are known
///
/// Either trigger syncs against the peer with the highest total difficulty,
/// and only if it is heavier than the local head.
///
/// ## State Machine
///
/// - **IDLE**: No sync attempt running
/// - **SYNCING**: Download delegated to the downloader
/// - **SYNCED**: Last attempt completed
///
/// Fast sync is used until the first sync that leaves a non-empty chain,
/// then full sync for the rest of the session.
pub mod config;
pub mod peer_manager;
pub mod protocol;
pub mod service;
pub mod state_fetch;
pub mod states;
pub mod tx_sync;

pub use config::*;
pub use peer_manager::{PeerManager, SyncPeer};
pub use protocol::ProtocolManager;
pub use service::{Downloader, SyncError, SyncOutcome, SyncService};
pub use state_fetch::{NodeDataRequester, StateFetchError, StateFetcher};
pub use states::{SyncMode, SyncState, SyncStatus};
pub use tx_sync::{TxPack, TxSyncHandle, TxSyncRequest, TxSyncState, TxSyncer};

#[cfg(test)]
mod tests;
