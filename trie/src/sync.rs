use std::collections::{BTreeMap, HashSet};

use alloy_primitives::keccak256;
use containers::{is_empty_code, is_empty_root, Bytes, NodeHash};
use tracing::{debug, trace};

use crate::{
    database::{NodeReader, NodeWriter},
    error::{NodeDecodeError, StateSyncError},
    leaf::{AccountLeaves, LeafCallback, SubEntry},
    node::Node,
};

/// Depth hint for the root of a storage trie or a code blob: the length of
/// an account trie key in nibbles.
pub const SUB_TRIE_DEPTH: usize = 64;

/// What a requested hash resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Node of the account trie; its leaves go through the leaf callback.
    StateTrie,
    /// Node of a storage trie; its leaves are terminal.
    StorageTrie,
    /// Contract code, stored without decoding.
    Code,
}

/// A known-needed, not yet resolved entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRequest {
    pub hash: NodeHash,
    pub depth: usize,
    /// Entry this one was discovered from, `None` for the state root.
    pub parent: Option<NodeHash>,
    pub kind: EntryKind,
}

/// Data delivered for a requested hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncResult {
    pub hash: NodeHash,
    pub data: Bytes,
}

impl SyncResult {
    pub fn new(hash: NodeHash, data: impl Into<Bytes>) -> Self {
        Self {
            hash,
            data: data.into(),
        }
    }
}

/// Result of a [`StateSync::process`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Whether at least one entry moved into the memcache.
    pub committed: bool,
    /// Index of the first entry that was rejected (hash mismatch or
    /// unrequested data). Later entries were still processed.
    pub failed: Option<usize>,
}

/// State trie download scheduler.
///
/// Tracks the frontier of hashes still needed to rebuild the state rooted at
/// `root`, hands them out through [`missing`](Self::missing), verifies and
/// decodes delivered data in [`process`](Self::process) and buffers resolved
/// entries until [`commit`](Self::commit).
///
/// Not internally synchronised: a single caller drives a sync session.
pub struct StateSync<R, L = AccountLeaves> {
    root: NodeHash,
    database: R,
    on_leaf: L,

    /// Frontier, in canonical hash order.
    requests: BTreeMap<NodeHash, SyncRequest>,
    /// Frontier hashes handed out by `missing` and not yet delivered.
    in_flight: HashSet<NodeHash>,
    /// Resolved entries awaiting commit.
    memcache: BTreeMap<NodeHash, Bytes>,
}

impl<R: NodeReader> StateSync<R, AccountLeaves> {
    /// Start syncing the account trie rooted at `root`.
    pub fn new(root: NodeHash, database: R) -> Self {
        Self::with_callback(root, database, AccountLeaves)
    }
}

impl<R: NodeReader, L: LeafCallback> StateSync<R, L> {
    /// Start syncing a trie whose leaves are interpreted by `on_leaf`.
    ///
    /// An empty root, or one already present in `database`, yields a
    /// scheduler that is complete from the start.
    pub fn with_callback(root: NodeHash, database: R, on_leaf: L) -> Self {
        let mut sync = Self {
            root,
            database,
            on_leaf,
            requests: BTreeMap::new(),
            in_flight: HashSet::new(),
            memcache: BTreeMap::new(),
        };
        if !sync.schedule(root, 0, None, EntryKind::StateTrie) {
            debug!(root = %root, "State root empty or already present, nothing to sync");
        }
        sync
    }

    pub fn root(&self) -> NodeHash {
        self.root
    }

    /// Number of entries still needed.
    pub fn pending(&self) -> usize {
        self.requests.len()
    }

    pub fn is_done(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of resolved entries awaiting commit.
    pub fn memcache_len(&self) -> usize {
        self.memcache.len()
    }

    pub fn is_cached(&self, hash: &NodeHash) -> bool {
        self.memcache.contains_key(hash)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn request(&self, hash: &NodeHash) -> Option<&SyncRequest> {
        self.requests.get(hash)
    }

    /// Hand out up to `max` needed hashes that are not already in flight.
    ///
    /// Returned hashes are marked in flight and will not be returned again
    /// until delivered or [`release`](Self::release)d.
    pub fn missing(&mut self, max: usize) -> Vec<NodeHash> {
        let hashes: Vec<NodeHash> = self
            .requests
            .keys()
            .filter(|hash| !self.in_flight.contains(*hash))
            .take(max)
            .copied()
            .collect();

        self.in_flight.extend(hashes.iter().copied());
        hashes
    }

    /// Return in-flight hashes to the missing pool, e.g. after a request
    /// timed out or the serving peer dropped.
    pub fn release(&mut self, hashes: &[NodeHash]) {
        for hash in hashes {
            self.in_flight.remove(hash);
        }
    }

    /// Inject a batch of delivered entries, in order.
    ///
    /// Entries whose data does not hash to the claimed hash, or that were
    /// never requested, are skipped and the first such index is reported.
    /// Duplicate deliveries of already resolved entries are ignored. A
    /// decode failure aborts the call; entries before it stay applied.
    pub fn process(&mut self, results: &[SyncResult]) -> Result<ProcessOutcome, StateSyncError> {
        let mut outcome = ProcessOutcome::default();

        for (index, result) in results.iter().enumerate() {
            let Some(request) = self.requests.get(&result.hash) else {
                if !self.memcache.contains_key(&result.hash) {
                    trace!(hash = %result.hash, index, "Dropping unrequested entry");
                    outcome.failed.get_or_insert(index);
                }
                continue;
            };

            if keccak256(&result.data) != result.hash {
                debug!(hash = %result.hash, index, "Entry content does not match its hash");
                self.in_flight.remove(&result.hash);
                outcome.failed.get_or_insert(index);
                continue;
            }

            let discovered = match self.expand(request, &result.data) {
                Ok(discovered) => discovered,
                Err(source) => {
                    self.in_flight.remove(&result.hash);
                    return Err(StateSyncError::Decode {
                        index,
                        hash: result.hash,
                        source,
                    });
                }
            };

            self.requests.remove(&result.hash);
            self.in_flight.remove(&result.hash);
            self.memcache.insert(result.hash, result.data.clone());
            outcome.committed = true;

            for (hash, depth, kind) in discovered {
                self.schedule(hash, depth, Some(result.hash), kind);
            }
        }

        Ok(outcome)
    }

    /// Flush the memcache through `writer` as one batch.
    ///
    /// On failure the memcache is kept so the flush can be retried.
    pub fn commit<W: NodeWriter + ?Sized>(&mut self, writer: &W) -> Result<usize, StateSyncError> {
        if self.memcache.is_empty() {
            return Ok(0);
        }

        let batch: Vec<(NodeHash, Bytes)> = self
            .memcache
            .iter()
            .map(|(hash, data)| (*hash, data.clone()))
            .collect();
        let count = batch.len();

        writer
            .write_batch(&batch)
            .map_err(|source| StateSyncError::Commit { count, source })?;

        self.memcache.clear();
        debug!(count, pending = self.requests.len(), "Committed state entries");
        Ok(count)
    }

    /// Add a need to the frontier unless it is empty or already known.
    fn schedule(
        &mut self,
        hash: NodeHash,
        depth: usize,
        parent: Option<NodeHash>,
        kind: EntryKind,
    ) -> bool {
        let empty = match kind {
            EntryKind::Code => is_empty_code(&hash),
            EntryKind::StateTrie | EntryKind::StorageTrie => is_empty_root(&hash),
        };
        if empty
            || self.requests.contains_key(&hash)
            || self.memcache.contains_key(&hash)
            || self.database.contains(&hash)
        {
            return false;
        }

        trace!(hash = %hash, depth, ?kind, "Scheduling entry");
        self.requests.insert(
            hash,
            SyncRequest {
                hash,
                depth,
                parent,
                kind,
            },
        );
        true
    }

    /// Decode a verified entry and list what it points at.
    fn expand(
        &self,
        request: &SyncRequest,
        data: &[u8],
    ) -> Result<Vec<(NodeHash, usize, EntryKind)>, NodeDecodeError> {
        if request.kind == EntryKind::Code {
            return Ok(Vec::new());
        }

        let refs = Node::decode(data)?.references(request.depth);
        let mut discovered: Vec<_> = refs
            .children
            .into_iter()
            .map(|(hash, depth)| (hash, depth, request.kind))
            .collect();

        if request.kind == EntryKind::StateTrie {
            for leaf in &refs.leaves {
                for entry in self.on_leaf.on_leaf(leaf)? {
                    discovered.push(match entry {
                        SubEntry::Trie(root) => (root, SUB_TRIE_DEPTH, EntryKind::StorageTrie),
                        SubEntry::Raw(hash) => (hash, SUB_TRIE_DEPTH, EntryKind::Code),
                    });
                }
            }
        }

        Ok(discovered)
    }
}
