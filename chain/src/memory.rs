use std::collections::HashMap;

use containers::{BlockHeader, NodeHash, TotalDifficulty, Transaction};
use parking_lot::{Mutex, RwLock};

use crate::{ChainReader, TxPool};

#[derive(Debug)]
struct ChainInner {
    head: BlockHeader,
    total_difficulties: HashMap<NodeHash, TotalDifficulty>,
}

/// Chain kept entirely in memory: a head pointer plus the total difficulty
/// of every head it has had.
#[derive(Debug)]
pub struct MemoryChain {
    inner: RwLock<ChainInner>,
}

impl MemoryChain {
    pub fn new(genesis: BlockHeader, genesis_difficulty: TotalDifficulty) -> Self {
        let mut total_difficulties = HashMap::new();
        total_difficulties.insert(genesis.hash, genesis_difficulty);
        Self {
            inner: RwLock::new(ChainInner {
                head: genesis,
                total_difficulties,
            }),
        }
    }

    /// Move the head, recording its total difficulty.
    pub fn set_head(&self, head: BlockHeader, total_difficulty: TotalDifficulty) {
        let mut inner = self.inner.write();
        inner.total_difficulties.insert(head.hash, total_difficulty);
        inner.head = head;
    }
}

impl ChainReader for MemoryChain {
    fn current_block(&self) -> BlockHeader {
        self.inner.read().head
    }

    fn total_difficulty(&self, hash: &NodeHash) -> Option<TotalDifficulty> {
        self.inner.read().total_difficulties.get(hash).copied()
    }
}

/// Transaction pool kept in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryTxPool {
    pending: Mutex<Vec<Transaction>>,
}

impl MemoryTxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, tx: Transaction) {
        self.pending.lock().push(tx);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl TxPool for MemoryTxPool {
    fn pending_transactions(&self) -> Vec<Transaction> {
        self.pending.lock().clone()
    }
}
