use alloy_primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};

/// A signed transaction as relayed between peers.
///
/// The payload is kept in its encoded form; execution and signature checks
/// happen elsewhere. Only identity and wire size matter for relaying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    hash: B256,
    payload: Bytes,
}

impl Transaction {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            hash: keccak256(&payload),
            payload,
        }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
