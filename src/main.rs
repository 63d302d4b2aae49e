use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chain::{MemoryChain, MemoryTxPool};
use clap::Parser;
use containers::{BlockHeader, NodeHash, TotalDifficulty};
use containers::alloy_primitives::{b256, B256, U256};
use libp2p_identity::PeerId;
use metrics::Metrics;
use metrics::server::{run_metrics_server, MetricsServerConfig};
use networking::sync::{Downloader, PeerManager, ProtocolManager, SyncConfig, SyncMode, SyncService, TxSyncer};
use networking::types::PeerSet;
use tokio::{sync::mpsc, task};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const GENESIS_HASH: B256 = b256!("d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3");
const GENESIS_DIFFICULTY: u64 = 0x4_0000_0000;

#[derive(Parser, Debug)]
struct Args {
    /// Start in fast sync mode
    #[arg(long)]
    fast_sync: bool,

    /// YAML file with sync settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics
    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 5054)]
    metrics_port: u16,
}

/// Downloader for a node without a wire transport: declines every sync.
struct OfflineDownloader;

#[async_trait]
impl Downloader for OfflineDownloader {
    async fn synchronise(
        &self,
        peer_id: PeerId,
        head: NodeHash,
        total_difficulty: TotalDifficulty,
        mode: SyncMode,
    ) -> bool {
        warn!(peer = %peer_id, %head, %total_difficulty, %mode, "No transport attached, declining sync");
        false
    }
}

fn load_config(args: &Args) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => SyncConfig::default(),
    };

    if args.fast_sync {
        config.fast_sync = true;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(?config, "Starting sync node");

    let metrics = args.metrics.then(|| Arc::new(Metrics::new()));

    let genesis = BlockHeader::new(0, GENESIS_HASH, B256::ZERO);
    let chain = Arc::new(MemoryChain::new(genesis, U256::from(GENESIS_DIFFICULTY)));
    let tx_pool = Arc::new(MemoryTxPool::new());
    let peers = Arc::new(PeerManager::new());
    let shutdown = CancellationToken::new();

    let (new_peers_tx, new_peers_rx) = mpsc::channel::<PeerId>(config.min_desired_peers.max(1));
    let (mut tx_syncer, tx_sync_handle) = TxSyncer::new(config.tx_pack_size);
    let mut sync_service = SyncService::new(config, chain, peers.clone(), Arc::new(OfflineDownloader));
    let mut protocol_manager = ProtocolManager::new(peers, tx_pool, new_peers_tx, tx_sync_handle);

    if let Some(metrics) = &metrics {
        sync_service = sync_service.with_metrics(metrics.clone());
        tx_syncer = tx_syncer.with_metrics(metrics.clone());
        protocol_manager = protocol_manager.with_metrics(metrics.clone());
    }

    let status = sync_service.status();
    let mut sync_handle = task::spawn(sync_service.run(new_peers_rx, shutdown.clone()));
    let relay_handle = task::spawn(tx_syncer.run(shutdown.clone()));

    let metrics_handle = metrics.map(|metrics| {
        let config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port: args.metrics_port,
        };
        task::spawn(async move {
            if let Err(err) = run_metrics_server(config, metrics).await {
                error!(%err, "Metrics server exited with error");
            }
        })
    });

    // Peer sessions reach the protocol manager once a transport is attached.
    info!(peers = protocol_manager.peers().len(), "Waiting for peers");

    let mut sync_running = true;
    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            info!("Received ctrl-c, shutting down");
            Ok(())
        }
        joined = &mut sync_handle => {
            sync_running = false;
            joined
                .context("sync service task panicked")?
                .context("sync service stopped")
        }
    };

    shutdown.cancel();

    if sync_running {
        if let Err(err) = sync_handle.await.context("sync service task panicked")? {
            error!(%err, "Sync service stopped with error");
        }
    }
    relay_handle.await.context("transaction sync task panicked")?;
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!(synced = status.synced(), mode = %status.mode(), "Sync node exited");
    result
}
