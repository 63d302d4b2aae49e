pub mod server;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    // Chain sync
    sync_attempts: IntCounterVec,
    sync_duration: HistogramVec,
    fast_sync_enabled: IntGauge,
    // State download
    trie_nodes_processed: IntCounterVec,
    trie_nodes_rejected: IntCounterVec,
    trie_pending_entries: IntGauge,
    trie_nodes_committed: IntCounterVec,
    // Transaction relay
    tx_packs_sent: IntCounterVec,
    tx_bytes_sent: IntCounterVec,
    tx_send_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new("network_peers_connected", "Number of connected peers")).unwrap();
        registry.register(Box::new(peers.clone())).unwrap();

        // Chain sync
        let sync_attempts = IntCounterVec::new(
            Opts::new("sync_attempts_total", "Total number of chain sync attempts"),
            &["mode", "result"],
        ).unwrap();
        registry.register(Box::new(sync_attempts.clone())).unwrap();

        let sync_duration = HistogramVec::new(
            HistogramOpts::new("sync_duration_seconds", "Time spent in a single chain sync attempt")
                .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 1800.0]),
            &["mode"],
        ).unwrap();
        registry.register(Box::new(sync_duration.clone())).unwrap();

        let fast_sync_enabled = IntGauge::with_opts(Opts::new("sync_fast_sync_enabled", "Whether the next sync attempt uses fast sync")).unwrap();
        registry.register(Box::new(fast_sync_enabled.clone())).unwrap();

        // State download
        let trie_nodes_processed = IntCounterVec::new(
            Opts::new("state_sync_nodes_processed_total", "Total number of trie entries accepted"),
            &[],
        ).unwrap();
        registry.register(Box::new(trie_nodes_processed.clone())).unwrap();

        let trie_nodes_rejected = IntCounterVec::new(
            Opts::new("state_sync_nodes_rejected_total", "Total number of delivered trie entries rejected"),
            &["reason"],
        ).unwrap();
        registry.register(Box::new(trie_nodes_rejected.clone())).unwrap();

        let trie_pending_entries = IntGauge::with_opts(Opts::new("state_sync_pending_entries", "Number of trie entries still needed")).unwrap();
        registry.register(Box::new(trie_pending_entries.clone())).unwrap();

        let trie_nodes_committed = IntCounterVec::new(
            Opts::new("state_sync_nodes_committed_total", "Total number of trie entries written to the database"),
            &[],
        ).unwrap();
        registry.register(Box::new(trie_nodes_committed.clone())).unwrap();

        // Transaction relay
        let tx_packs_sent = IntCounterVec::new(
            Opts::new("tx_sync_packs_sent_total", "Total number of transaction packs sent to new peers"),
            &[],
        ).unwrap();
        registry.register(Box::new(tx_packs_sent.clone())).unwrap();

        let tx_bytes_sent = IntCounterVec::new(
            Opts::new("tx_sync_bytes_sent_total", "Total payload bytes of transaction packs sent"),
            &[],
        ).unwrap();
        registry.register(Box::new(tx_bytes_sent.clone())).unwrap();

        let tx_send_failures = IntCounterVec::new(
            Opts::new("tx_sync_send_failures_total", "Total number of failed transaction pack sends"),
            &[],
        ).unwrap();
        registry.register(Box::new(tx_send_failures.clone())).unwrap();

        Self {
            registry,
            peers,
            sync_attempts,
            sync_duration,
            fast_sync_enabled,
            trie_nodes_processed,
            trie_nodes_rejected,
            trie_pending_entries,
            trie_nodes_committed,
            tx_packs_sent,
            tx_bytes_sent,
            tx_send_failures,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    // Chain sync
    pub fn inc_sync_attempts(&self, mode: &str, result: &str) {
        self.sync_attempts.with_label_values(&[mode, result]).inc();
    }

    pub fn observe_sync_duration(&self, mode: &str, duration: f64) {
        self.sync_duration.with_label_values(&[mode]).observe(duration);
    }

    pub fn set_fast_sync_enabled(&self, enabled: bool) {
        self.fast_sync_enabled.set(i64::from(enabled));
    }

    // State download
    pub fn inc_trie_nodes_processed(&self, count: u64) {
        self.trie_nodes_processed.with_label_values::<&str>(&[]).inc_by(count);
    }

    pub fn inc_trie_nodes_rejected(&self, reason: &str) {
        self.trie_nodes_rejected.with_label_values(&[reason]).inc();
    }

    pub fn set_trie_pending_entries(&self, v: i64) {
        self.trie_pending_entries.set(v);
    }

    pub fn inc_trie_nodes_committed(&self, count: u64) {
        self.trie_nodes_committed.with_label_values::<&str>(&[]).inc_by(count);
    }

    // Transaction relay
    pub fn inc_tx_packs_sent(&self, bytes: u64) {
        self.tx_packs_sent.with_label_values::<&str>(&[]).inc();
        self.tx_bytes_sent.with_label_values::<&str>(&[]).inc_by(bytes);
    }

    pub fn inc_tx_send_failures(&self) {
        self.tx_send_failures.with_label_values::<&str>(&[]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
