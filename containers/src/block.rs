use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// The part of a block header the sync layer cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
}

impl BlockHeader {
    pub fn new(number: u64, hash: B256, parent_hash: B256) -> Self {
        Self {
            number,
            hash,
            parent_hash,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.number == 0
    }
}
