mod protocol_tests;
mod service_tests;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use containers::{
    PeerHead, Transaction,
    alloy_primitives::{B256, U256},
};
use libp2p_identity::PeerId;
use parking_lot::Mutex;

use crate::types::Peer;

// Mock peer for testing
#[derive(Debug)]
pub(super) struct MockPeer {
    id: PeerId,
    head: PeerHead,
    fail_sends: bool,
    attempts: Mutex<usize>,
    sent: Mutex<Vec<Vec<Transaction>>>,
}

impl MockPeer {
    pub(super) fn new(total_difficulty: u64) -> Arc<Self> {
        Self::build(PeerId::random(), total_difficulty, false)
    }

    pub(super) fn with_id(id: PeerId, total_difficulty: u64) -> Arc<Self> {
        Self::build(id, total_difficulty, false)
    }

    pub(super) fn failing(total_difficulty: u64) -> Arc<Self> {
        Self::build(PeerId::random(), total_difficulty, true)
    }

    fn build(id: PeerId, total_difficulty: u64, fail_sends: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            head: PeerHead::new(B256::repeat_byte(0xaa), U256::from(total_difficulty)),
            fail_sends,
            attempts: Mutex::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Packs delivered successfully, in send order.
    pub(super) fn sent(&self) -> Vec<Vec<Transaction>> {
        self.sent.lock().clone()
    }

    pub(super) fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Peer for MockPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn head(&self) -> PeerHead {
        self.head
    }

    async fn send_transactions(&self, transactions: Vec<Transaction>) -> Result<()> {
        *self.attempts.lock() += 1;
        if self.fail_sends {
            bail!("connection reset by peer");
        }
        self.sent.lock().push(transactions);
        Ok(())
    }
}

/// Transaction whose payload is `size` bytes of `tag`.
pub(super) fn create_test_tx(size: usize, tag: u8) -> Transaction {
    Transaction::new(vec![tag; size])
}
