/// Merkle-Patricia trie node codec.
///
/// Nodes are RLP lists:
/// - 17 items: branch (16 child references followed by a value),
/// - 2 items: short node whose hex-prefix encoded key marks it as either a
///   leaf (value follows) or an extension (child reference follows).
///
/// A child reference is a 32-byte hash, or the node itself when its
/// encoding is shorter than 32 bytes.
use alloy_primitives::{keccak256, Bytes};
use alloy_rlp::{Encodable, Header, EMPTY_STRING_CODE};
use containers::NodeHash;

use crate::error::NodeDecodeError;

const BRANCH_ITEMS: usize = 17;
const SHORT_ITEMS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Branch {
        children: Box<[Option<ChildRef>; 16]>,
        value: Option<Bytes>,
    },
    Extension {
        /// Key nibbles.
        key: Vec<u8>,
        child: ChildRef,
    },
    Leaf {
        /// Key nibbles.
        key: Vec<u8>,
        value: Bytes,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildRef {
    Hash(NodeHash),
    Inline(Box<Node>),
}

/// Everything a node points at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeRefs {
    /// Hashed children with their depth (in nibbles) below the trie root.
    pub children: Vec<(NodeHash, usize)>,
    /// Leaf values reachable without another fetch.
    pub leaves: Vec<Bytes>,
}

/// Raw RLP item borrowed from a node payload.
enum Item<'a> {
    Bytes(&'a [u8]),
    /// Full encoding of an embedded list, header included.
    List(&'a [u8]),
}

impl Node {
    /// Decode a node, rejecting trailing bytes.
    pub fn decode(data: &[u8]) -> Result<Self, NodeDecodeError> {
        let mut buf = data;
        let node = Self::decode_list(&mut buf)?;
        if !buf.is_empty() {
            return Err(NodeDecodeError::TrailingBytes(buf.len()));
        }
        Ok(node)
    }

    fn decode_list(buf: &mut &[u8]) -> Result<Self, NodeDecodeError> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(NodeDecodeError::NotAList);
        }
        let data = *buf;
        if data.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort.into());
        }
        let (mut payload, rest) = data.split_at(header.payload_length);
        *buf = rest;

        let mut items = Vec::with_capacity(BRANCH_ITEMS);
        while !payload.is_empty() {
            items.push(next_item(&mut payload)?);
        }

        match items.len() {
            BRANCH_ITEMS => {
                let mut children: [Option<ChildRef>; 16] = Default::default();
                for (slot, item) in children.iter_mut().zip(&items) {
                    *slot = decode_child(item)?;
                }
                let value = match &items[16] {
                    Item::Bytes(value) if value.is_empty() => None,
                    Item::Bytes(value) => Some(Bytes::copy_from_slice(value)),
                    Item::List(_) => return Err(NodeDecodeError::UnexpectedList),
                };
                Ok(Node::Branch {
                    children: Box::new(children),
                    value,
                })
            }
            SHORT_ITEMS => {
                let Item::Bytes(compact) = &items[0] else {
                    return Err(NodeDecodeError::UnexpectedList);
                };
                let (key, is_leaf) = compact_to_nibbles(compact)?;
                if is_leaf {
                    let Item::Bytes(value) = &items[1] else {
                        return Err(NodeDecodeError::UnexpectedList);
                    };
                    Ok(Node::Leaf {
                        key,
                        value: Bytes::copy_from_slice(value),
                    })
                } else {
                    let child =
                        decode_child(&items[1])?.ok_or(NodeDecodeError::InvalidReference(0))?;
                    Ok(Node::Extension { key, child })
                }
            }
            count => Err(NodeDecodeError::InvalidItemCount(count)),
        }
    }

    /// RLP encoding of the node.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Node::Branch { children, value } => {
                for child in children.iter() {
                    encode_child(child.as_ref(), &mut payload);
                }
                match value {
                    Some(value) => value[..].encode(&mut payload),
                    None => payload.push(EMPTY_STRING_CODE),
                }
            }
            Node::Extension { key, child } => {
                nibbles_to_compact(key, false).as_slice().encode(&mut payload);
                encode_child(Some(child), &mut payload);
            }
            Node::Leaf { key, value } => {
                nibbles_to_compact(key, true).as_slice().encode(&mut payload);
                value[..].encode(&mut payload);
            }
        }

        let mut out = Vec::with_capacity(payload.len() + 3);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }

    /// Hash of the node's encoding.
    pub fn hash(&self) -> NodeHash {
        keccak256(self.encode())
    }

    /// How a parent refers to this node: embedded if the encoding is short,
    /// otherwise by hash.
    pub fn reference(self) -> ChildRef {
        if self.encode().len() < 32 {
            ChildRef::Inline(Box::new(self))
        } else {
            ChildRef::Hash(self.hash())
        }
    }

    /// Collect hashed children and reachable leaf values. `depth` is the
    /// position of this node below the trie root, in nibbles.
    pub fn references(&self, depth: usize) -> NodeRefs {
        let mut refs = NodeRefs::default();
        self.collect(depth, &mut refs);
        refs
    }

    fn collect(&self, depth: usize, refs: &mut NodeRefs) {
        match self {
            Node::Branch { children, value } => {
                for child in children.iter().flatten() {
                    child.collect(depth + 1, refs);
                }
                if let Some(value) = value {
                    refs.leaves.push(value.clone());
                }
            }
            Node::Extension { key, child } => child.collect(depth + key.len(), refs),
            Node::Leaf { value, .. } => refs.leaves.push(value.clone()),
        }
    }
}

impl ChildRef {
    fn collect(&self, depth: usize, refs: &mut NodeRefs) {
        match self {
            ChildRef::Hash(hash) => refs.children.push((*hash, depth)),
            ChildRef::Inline(node) => node.collect(depth, refs),
        }
    }
}

fn next_item<'a>(buf: &mut &'a [u8]) -> Result<Item<'a>, NodeDecodeError> {
    let start: &'a [u8] = *buf;
    let header = Header::decode(buf)?;
    let data: &'a [u8] = *buf;
    if data.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }
    let (payload, rest) = data.split_at(header.payload_length);
    *buf = rest;

    if header.list {
        Ok(Item::List(&start[..start.len() - rest.len()]))
    } else {
        Ok(Item::Bytes(payload))
    }
}

fn decode_child(item: &Item<'_>) -> Result<Option<ChildRef>, NodeDecodeError> {
    match item {
        Item::Bytes(bytes) if bytes.is_empty() => Ok(None),
        Item::Bytes(bytes) if bytes.len() == 32 => {
            Ok(Some(ChildRef::Hash(NodeHash::from_slice(bytes))))
        }
        Item::Bytes(bytes) => Err(NodeDecodeError::InvalidReference(bytes.len())),
        Item::List(raw) => Ok(Some(ChildRef::Inline(Box::new(Node::decode(raw)?)))),
    }
}

fn encode_child(child: Option<&ChildRef>, out: &mut Vec<u8>) {
    match child {
        None => out.push(EMPTY_STRING_CODE),
        Some(ChildRef::Hash(hash)) => hash.encode(out),
        Some(ChildRef::Inline(node)) => out.extend_from_slice(&node.encode()),
    }
}

/// Decode a hex-prefix key into nibbles and the leaf flag.
fn compact_to_nibbles(compact: &[u8]) -> Result<(Vec<u8>, bool), NodeDecodeError> {
    let Some((&first, rest)) = compact.split_first() else {
        return Err(NodeDecodeError::EmptyKey);
    };
    let flag = first >> 4;
    if flag > 3 {
        return Err(NodeDecodeError::InvalidKeyFlag(flag));
    }

    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if flag & 0x1 != 0 {
        nibbles.push(first & 0x0f);
    }
    for byte in rest {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    Ok((nibbles, flag & 0x2 != 0))
}

fn nibbles_to_compact(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let flag = if is_leaf { 0x2 } else { 0x0 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);

    let rest = if nibbles.len() % 2 == 1 {
        out.push(((flag | 0x1) << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    for pair in rest.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn leaf(key: &[u8], value: &[u8]) -> Node {
        Node::Leaf {
            key: key.to_vec(),
            value: Bytes::copy_from_slice(value),
        }
    }

    #[rstest]
    #[case::even_extension(&[1, 2, 3, 4], false, &[0x00, 0x12, 0x34])]
    #[case::odd_extension(&[1, 2, 3], false, &[0x11, 0x23])]
    #[case::even_leaf(&[0, 15, 1, 12], true, &[0x20, 0x0f, 0x1c])]
    #[case::odd_leaf(&[15, 1, 12], true, &[0x3f, 0x1c])]
    fn test_hex_prefix(#[case] nibbles: &[u8], #[case] is_leaf: bool, #[case] compact: &[u8]) {
        assert_eq!(nibbles_to_compact(nibbles, is_leaf), compact);
        assert_eq!(compact_to_nibbles(compact).unwrap(), (nibbles.to_vec(), is_leaf));
    }

    #[test]
    fn test_invalid_hex_prefix_flag() {
        assert!(matches!(
            compact_to_nibbles(&[0x40]),
            Err(NodeDecodeError::InvalidKeyFlag(4))
        ));
        assert!(matches!(compact_to_nibbles(&[]), Err(NodeDecodeError::EmptyKey)));
    }

    #[test]
    fn test_branch_with_hashed_and_embedded_children() {
        let big = leaf(&[7; 40], &[0xaa; 40]);
        let big_hash = big.hash();
        let small = leaf(&[1, 2], &[0x05]);
        assert!(matches!(small.clone().reference(), ChildRef::Inline(_)));

        let mut children: [Option<ChildRef>; 16] = Default::default();
        children[3] = Some(big.reference());
        children[9] = Some(small.reference());
        let branch = Node::Branch {
            children: Box::new(children),
            value: None,
        };

        let decoded = Node::decode(&branch.encode()).unwrap();
        assert_eq!(decoded, branch);

        let refs = decoded.references(5);
        assert_eq!(refs.children, vec![(big_hash, 6)]);
        assert_eq!(refs.leaves, vec![Bytes::from_static(&[0x05])]);
    }

    #[test]
    fn test_extension_child_depth() {
        let child = leaf(&[4; 50], &[0xbb; 33]);
        let child_hash = child.hash();
        let extension = Node::Extension {
            key: vec![1, 2, 3],
            child: child.reference(),
        };

        let decoded = Node::decode(&extension.encode()).unwrap();
        assert_eq!(decoded, extension);
        assert_eq!(decoded.references(2).children, vec![(child_hash, 5)]);
        assert!(decoded.references(2).leaves.is_empty());
    }

    #[test]
    fn test_leaf_round_trip_exposes_value() {
        let node = leaf(&[0xa; 63], b"account");
        let decoded = Node::decode(&node.encode()).unwrap();
        assert_eq!(decoded.references(1).leaves, vec![Bytes::from_static(b"account")]);
    }

    #[test]
    fn test_reject_malformed_nodes() {
        // Not a list.
        assert!(matches!(
            Node::decode(&[0x83, 1, 2, 3]),
            Err(NodeDecodeError::NotAList)
        ));
        // List of three strings.
        assert!(matches!(
            Node::decode(&[0xc3, 0x01, 0x02, 0x03]),
            Err(NodeDecodeError::InvalidItemCount(3))
        ));
        // Branch child of 2 bytes.
        let mut payload = vec![0x82, 0xaa, 0xbb];
        payload.extend(std::iter::repeat(EMPTY_STRING_CODE).take(16));
        let mut encoded = vec![0xc0 + payload.len() as u8];
        encoded.extend(payload);
        assert!(matches!(
            Node::decode(&encoded),
            Err(NodeDecodeError::InvalidReference(2))
        ));
        // Trailing garbage.
        let mut encoded = leaf(&[1], &[2]).encode();
        encoded.push(0x00);
        assert!(matches!(
            Node::decode(&encoded),
            Err(NodeDecodeError::TrailingBytes(1))
        ));
        // Truncated.
        let encoded = leaf(&[1; 10], &[2; 40]).encode();
        assert!(Node::decode(&encoded[..encoded.len() - 1]).is_err());
    }
}
