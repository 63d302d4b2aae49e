use containers::NodeHash;
use thiserror::Error;

/// Malformed trie node or account leaf.
#[derive(Debug, Error)]
pub enum NodeDecodeError {
    #[error("invalid rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),

    #[error("trie node is not an rlp list")]
    NotAList,

    #[error("trie node has {0} items, expected 2 or 17")]
    InvalidItemCount(usize),

    #[error("child reference of {0} bytes is neither a hash nor an embedded node")]
    InvalidReference(usize),

    #[error("unexpected embedded list in value position")]
    UnexpectedList,

    #[error("short node has an empty key")]
    EmptyKey,

    #[error("invalid hex-prefix flag {0:#x}")]
    InvalidKeyFlag(u8),

    #[error("{0} trailing bytes after trie node")]
    TrailingBytes(usize),

    #[error("invalid account leaf: {0}")]
    Account(alloy_rlp::Error),
}

/// Errors surfaced by [`crate::StateSync`] to the caller driving the download.
#[derive(Debug, Error)]
pub enum StateSyncError {
    /// Data matched its hash but could not be decoded; the entry went back
    /// to the missing set and has to be fetched again.
    #[error("failed to decode entry {index} ({hash}): {source}")]
    Decode {
        index: usize,
        hash: NodeHash,
        #[source]
        source: NodeDecodeError,
    },

    /// The node writer rejected the batch; the memcache is left intact.
    #[error("failed to commit {count} trie entries: {source}")]
    Commit {
        count: usize,
        #[source]
        source: anyhow::Error,
    },
}
