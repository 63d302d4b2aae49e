/// Local chain and transaction pool as seen by the sync layer.
pub mod memory;

use containers::{BlockHeader, NodeHash, TotalDifficulty, Transaction};

pub use memory::{MemoryChain, MemoryTxPool};

/// Read access to the local canonical chain.
pub trait ChainReader: Send + Sync {
    /// Head of the local canonical chain.
    fn current_block(&self) -> BlockHeader;

    /// Cumulative difficulty of the chain ending in `hash`, if stored.
    fn total_difficulty(&self, hash: &NodeHash) -> Option<TotalDifficulty>;

    fn current_height(&self) -> u64 {
        self.current_block().number
    }
}

/// Source of locally pending transactions.
pub trait TxPool: Send + Sync {
    fn pending_transactions(&self) -> Vec<Transaction>;
}
