use alloy_primitives::{B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::types::{is_empty_code, is_empty_root};

/// Terminal record of the account trie.
///
/// Each account carries the root of its own storage trie and the hash of its
/// code, both of which have to be fetched separately during state sync.
#[derive(
    Clone, Debug, PartialEq, Eq, Default, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Account {
    /// Decode an account from the RLP value stored in an account trie leaf.
    ///
    /// Trailing bytes after the account list are rejected.
    pub fn from_rlp(mut data: &[u8]) -> alloy_rlp::Result<Self> {
        let account = Self::decode(&mut data)?;
        if !data.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }
        Ok(account)
    }

    /// Storage root to sync, if the account has storage.
    pub fn storage(&self) -> Option<B256> {
        (!is_empty_root(&self.storage_root)).then_some(self.storage_root)
    }

    /// Code hash to sync, if the account has code.
    pub fn code(&self) -> Option<B256> {
        (!is_empty_code(&self.code_hash)).then_some(self.code_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EMPTY_ROOT_HASH, KECCAK_EMPTY};
    use alloy_rlp::Encodable;
    use pretty_assertions::assert_eq;

    fn encode(account: &Account) -> Vec<u8> {
        let mut out = Vec::new();
        account.encode(&mut out);
        out
    }

    #[test]
    fn test_decode_account_leaf() {
        let account = Account {
            nonce: 7,
            balance: U256::from(1_000_000u64),
            storage_root: B256::repeat_byte(0x11),
            code_hash: B256::repeat_byte(0x22),
        };

        let decoded = Account::from_rlp(&encode(&account)).unwrap();
        assert_eq!(decoded, account);
        assert_eq!(decoded.storage(), Some(B256::repeat_byte(0x11)));
        assert_eq!(decoded.code(), Some(B256::repeat_byte(0x22)));
    }

    #[test]
    fn test_plain_account_has_nothing_to_sync() {
        let account = Account {
            nonce: 0,
            balance: U256::from(5u64),
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        };

        let decoded = Account::from_rlp(&encode(&account)).unwrap();
        assert_eq!(decoded.storage(), None);
        assert_eq!(decoded.code(), None);
    }

    #[test]
    fn test_reject_garbage_and_trailing_bytes() {
        assert!(Account::from_rlp(&[0x01, 0x02, 0x03]).is_err());

        let mut bytes = encode(&Account::default());
        bytes.push(0x00);
        assert!(Account::from_rlp(&bytes).is_err());
    }

    #[test]
    fn test_json_uses_camel_case_fields() {
        let account = Account {
            nonce: 1,
            balance: U256::from(16u64),
            storage_root: EMPTY_ROOT_HASH,
            code_hash: KECCAK_EMPTY,
        };

        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["nonce"], 1);
        assert_eq!(json["balance"], "0x10");
        assert_eq!(json["storageRoot"], EMPTY_ROOT_HASH.to_string());
        assert_eq!(json["codeHash"], KECCAK_EMPTY.to_string());

        let decoded: Account = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, account);
    }
}
