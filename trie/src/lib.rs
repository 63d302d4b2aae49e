/// Merkle-Patricia state trie download.
///
/// The [`StateSync`] scheduler reconstructs a state trie from node data
/// fetched off untrusted peers. Every fetched blob is checked against the
/// hash it was requested under, decoded, and used to discover the next
/// hashes to fetch:
///
/// - **Trie nodes** reveal child node hashes.
/// - **Account leaves** reveal a storage trie root and a code hash.
/// - **Code blobs** are terminal.
///
/// Resolved entries are buffered in memory until [`StateSync::commit`]
/// flushes them to a [`NodeWriter`] in a single batch.
pub mod database;
pub mod error;
pub mod leaf;
pub mod node;
pub mod sync;

pub use database::{MemoryDatabase, NodeReader, NodeWriter};
pub use error::{NodeDecodeError, StateSyncError};
pub use leaf::{AccountLeaves, LeafCallback, SubEntry};
pub use node::{ChildRef, Node, NodeRefs};
pub use sync::{EntryKind, ProcessOutcome, StateSync, SyncRequest, SyncResult, SUB_TRIE_DEPTH};
