use std::{collections::HashMap, sync::Arc};

use containers::{Bytes, NodeHash};
use parking_lot::RwLock;

/// Read access to already persisted trie nodes and code.
pub trait NodeReader: Send + Sync {
    fn contains(&self, hash: &NodeHash) -> bool;
}

/// Batched write access for flushing synced entries.
///
/// A batch is applied completely or not at all.
pub trait NodeWriter: Send + Sync {
    fn write_batch(&self, batch: &[(NodeHash, Bytes)]) -> anyhow::Result<()>;
}

impl<T: NodeReader + ?Sized> NodeReader for &T {
    fn contains(&self, hash: &NodeHash) -> bool {
        (**self).contains(hash)
    }
}

impl<T: NodeReader + ?Sized> NodeReader for Arc<T> {
    fn contains(&self, hash: &NodeHash) -> bool {
        (**self).contains(hash)
    }
}

impl<T: NodeWriter + ?Sized> NodeWriter for Arc<T> {
    fn write_batch(&self, batch: &[(NodeHash, Bytes)]) -> anyhow::Result<()> {
        (**self).write_batch(batch)
    }
}

/// In-memory node store.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    nodes: RwLock<HashMap<NodeHash, Bytes>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &NodeHash) -> Option<Bytes> {
        self.nodes.read().get(hash).cloned()
    }

    pub fn insert(&self, hash: NodeHash, data: Bytes) {
        self.nodes.write().insert(hash, data);
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl NodeReader for MemoryDatabase {
    fn contains(&self, hash: &NodeHash) -> bool {
        self.nodes.read().contains_key(hash)
    }
}

impl NodeWriter for MemoryDatabase {
    fn write_batch(&self, batch: &[(NodeHash, Bytes)]) -> anyhow::Result<()> {
        let mut nodes = self.nodes.write();
        nodes.extend(batch.iter().cloned());
        Ok(())
    }
}
