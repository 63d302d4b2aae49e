pub mod account;
pub mod block;
pub mod status;
pub mod transaction;
pub mod types;

pub use account::Account;
pub use block::BlockHeader;
pub use status::PeerHead;
pub use transaction::Transaction;
pub use types::{
    is_empty_code, is_empty_root, Bytes, NodeHash, TotalDifficulty, EMPTY_ROOT_HASH, KECCAK_EMPTY,
};

pub use alloy_primitives;
pub use alloy_rlp;
