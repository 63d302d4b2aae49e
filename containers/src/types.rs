use alloy_primitives::{b256, B256, U256};

pub use alloy_primitives::Bytes;

/// Content hash of a trie node or code blob (Keccak-256 of its bytes).
pub type NodeHash = B256;

/// Cumulative chain weight. Higher wins.
pub type TotalDifficulty = U256;

/// Root of an empty Merkle-Patricia trie: keccak256(rlp("")).
pub const EMPTY_ROOT_HASH: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Hash of empty contract code: keccak256("").
pub const KECCAK_EMPTY: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Whether `root` denotes "no trie" and therefore has nothing to sync.
pub fn is_empty_root(root: &B256) -> bool {
    root.is_zero() || *root == EMPTY_ROOT_HASH
}

/// Whether `code_hash` denotes an account without code.
pub fn is_empty_code(code_hash: &B256) -> bool {
    code_hash.is_zero() || *code_hash == KECCAK_EMPTY
}
