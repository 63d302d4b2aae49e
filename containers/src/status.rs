use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::types::TotalDifficulty;

/// Chain head a remote peer claims to have.
///
/// Both values are self-reported and untrusted until the downloader has
/// verified the chain behind them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerHead {
    pub hash: B256,
    pub total_difficulty: TotalDifficulty,
}

impl PeerHead {
    pub fn new(hash: B256, total_difficulty: TotalDifficulty) -> Self {
        Self {
            hash,
            total_difficulty,
        }
    }
}
