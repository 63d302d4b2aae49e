use containers::{Account, NodeHash};

use crate::error::NodeDecodeError;

/// Something a trie leaf points at that has to be synced as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubEntry {
    /// Root of a nested trie.
    Trie(NodeHash),
    /// Opaque blob, stored as is.
    Raw(NodeHash),
}

/// Interprets the leaf values of the trie being synced.
pub trait LeafCallback: Send {
    fn on_leaf(&self, leaf: &[u8]) -> Result<Vec<SubEntry>, NodeDecodeError>;
}

/// Leaf handler for the account trie: every leaf is an [`Account`] whose
/// storage trie and code still need fetching.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccountLeaves;

impl LeafCallback for AccountLeaves {
    fn on_leaf(&self, leaf: &[u8]) -> Result<Vec<SubEntry>, NodeDecodeError> {
        let account = Account::from_rlp(leaf).map_err(NodeDecodeError::Account)?;

        let mut entries = Vec::with_capacity(2);
        if let Some(root) = account.storage() {
            entries.push(SubEntry::Trie(root));
        }
        if let Some(code_hash) = account.code() {
            entries.push(SubEntry::Raw(code_hash));
        }
        Ok(entries)
    }
}
