//! Lookups in hex-prefix Merkle Patricia tries, such as the transaction and receipt tries of a
//! parent chain block.
//!
//! Nodes are resolved as keccak preimages. A 17 item node is a branch, a 2 item node is a leaf
//! or an extension depending on the flag nibble of its path. Children shorter than 32 bytes are
//! embedded in their parent instead of being referenced by hash.

use alloy_rlp::Header;
use sov_da_interface::PreimageResolver;
use tracing::trace;

use crate::lookup::{resolve_keccak, LookupError};

const BRANCH_ITEMS: usize = 17;
const SHORT_NODE_ITEMS: usize = 2;

struct RlpItem<'a> {
    list: bool,
    payload: &'a [u8],
    raw: &'a [u8],
}

enum NextNode {
    Hash([u8; 32]),
    Embedded(Vec<u8>),
}

fn key_to_nibbles(key: &[u8]) -> Vec<u8> {
    key.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

/// Splits an encoded node into its items. Returns `None` for the empty string, which encodes
/// the empty trie.
fn decode_node(encoded: &[u8]) -> Result<Option<Vec<RlpItem<'_>>>, LookupError> {
    let mut buf = encoded;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        if header.payload_length == 0 && buf.is_empty() {
            return Ok(None);
        }
        return Err(LookupError::InvalidNode(
            "trie node is not a list".to_string(),
        ));
    }
    if buf.len() != header.payload_length {
        return Err(LookupError::InvalidNode(format!(
            "trie node declares {} payload bytes but carries {}",
            header.payload_length,
            buf.len()
        )));
    }

    let mut items = Vec::new();
    while !buf.is_empty() {
        let start = buf;
        let item = Header::decode(&mut buf)?;
        let header_len = start.len() - buf.len();
        let end = header_len + item.payload_length;
        if end > start.len() {
            return Err(LookupError::Rlp(alloy_rlp::Error::InputTooShort));
        }
        items.push(RlpItem {
            list: item.list,
            payload: &start[header_len..end],
            raw: &start[..end],
        });
        buf = &start[end..];
    }
    Ok(Some(items))
}

/// Decodes a hex-prefix encoded path into `(is_leaf, nibbles)`.
fn decode_path(item: &RlpItem<'_>) -> Result<(bool, Vec<u8>), LookupError> {
    let (&first, rest) = match (item.list, item.payload.split_first()) {
        (false, Some(split)) => split,
        _ => {
            return Err(LookupError::InvalidNode(
                "short node path is not a non-empty string".to_string(),
            ))
        }
    };
    let flag = first >> 4;
    if flag > 3 {
        return Err(LookupError::InvalidNode(format!(
            "unknown path flag {flag}"
        )));
    }
    let odd = flag & 1 == 1;
    if !odd && first & 0x0f != 0 {
        return Err(LookupError::InvalidNode(
            "even path carries a padding nibble".to_string(),
        ));
    }

    let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
    if odd {
        nibbles.push(first & 0x0f);
    }
    nibbles.extend(key_to_nibbles(rest));
    Ok((flag >= 2, nibbles))
}

fn child_ref(item: &RlpItem<'_>) -> Result<NextNode, LookupError> {
    if item.list {
        return Ok(NextNode::Embedded(item.raw.to_vec()));
    }
    match item.payload.len() {
        0 => Err(LookupError::KeyNotFound),
        32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(item.payload);
            Ok(NextNode::Hash(hash))
        }
        n => Err(LookupError::InvalidNode(format!(
            "child reference of {n} bytes"
        ))),
    }
}

fn value_of(item: &RlpItem<'_>) -> Result<Vec<u8>, LookupError> {
    if item.list {
        return Err(LookupError::InvalidNode(
            "trie value is not a string".to_string(),
        ));
    }
    if item.payload.is_empty() {
        return Err(LookupError::KeyNotFound);
    }
    Ok(item.payload.to_vec())
}

/// Returns the value stored under `key` in the trie rooted at `root`.
///
/// The value is returned as stored, without further decoding. A key that is absent, or whose
/// path diverges from a leaf or extension, is an error rather than an empty value.
pub fn fetch_trie_value<R: PreimageResolver + ?Sized>(
    root: &[u8; 32],
    key: &[u8],
    resolver: &R,
) -> Result<Vec<u8>, LookupError> {
    let target = key_to_nibbles(key);
    let mut consumed = 0usize;
    let mut node = resolve_keccak(resolver, root)?;

    loop {
        let next = {
            let items = decode_node(&node)?.ok_or(LookupError::KeyNotFound)?;
            match items.len() {
                BRANCH_ITEMS => {
                    let Some(&nibble) = target.get(consumed) else {
                        return value_of(&items[16]);
                    };
                    consumed += 1;
                    child_ref(&items[nibble as usize])?
                }
                SHORT_NODE_ITEMS => {
                    let (is_leaf, path) = decode_path(&items[0])?;
                    let remaining = &target[consumed..];
                    if is_leaf {
                        if remaining != path.as_slice() {
                            return Err(LookupError::PathMismatch(consumed));
                        }
                        return value_of(&items[1]);
                    }
                    if path.is_empty() || !remaining.starts_with(&path) {
                        return Err(LookupError::PathMismatch(consumed));
                    }
                    consumed += path.len();
                    child_ref(&items[1])?
                }
                n => {
                    return Err(LookupError::InvalidNode(format!(
                        "trie node has {n} items"
                    )))
                }
            }
        };
        node = match next {
            NextNode::Hash(hash) => {
                trace!(consumed, node = hex::encode(hash), "Descending into trie node");
                resolve_keccak(resolver, &hash)?
            }
            NextNode::Embedded(raw) => raw,
        };
    }
}

/// Returns the object at `index` of an ordered trie (transactions or receipts of a block),
/// whose keys are the RLP encoding of the index.
pub fn fetch_indexed_value<R: PreimageResolver + ?Sized>(
    root: &[u8; 32],
    index: u64,
    resolver: &R,
) -> Result<Vec<u8>, LookupError> {
    fetch_trie_value(root, &alloy_rlp::encode(index), resolver)
}

#[cfg(test)]
mod tests {
    use alloy_rlp::Encodable;
    use proptest::prelude::*;
    use sov_da_interface::hash::keccak256;
    use sov_da_interface::{PreimageType, PreimagesMap};

    use super::*;

    fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        Encodable::encode(bytes, &mut out);
        out
    }

    fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        Header {
            list: true,
            payload_length: items.iter().map(Vec::len).sum(),
        }
        .encode(&mut out);
        for item in items {
            out.extend_from_slice(item);
        }
        out
    }

    fn hex_prefix(nibbles: &[u8], leaf: bool) -> Vec<u8> {
        let flag = (if leaf { 2 } else { 0 }) + (nibbles.len() % 2) as u8;
        let mut out = Vec::new();
        let rest = if nibbles.len() % 2 == 1 {
            out.push(flag << 4 | nibbles[0]);
            &nibbles[1..]
        } else {
            out.push(flag << 4);
            nibbles
        };
        out.extend(rest.chunks(2).map(|pair| pair[0] << 4 | pair[1]));
        out
    }

    /// A reference to `node` as its parent embeds it.
    fn reference(node: Vec<u8>, preimages: &mut PreimagesMap) -> Vec<u8> {
        if node.len() < 32 {
            return node;
        }
        let hash = keccak256(&node);
        preimages.record(PreimageType::Keccak256, hash, node);
        encode_bytes(&hash)
    }

    /// Builds the node over `entries` (nibble keys, sorted and prefix free) below `depth`.
    fn build_node(
        entries: &[(Vec<u8>, Vec<u8>)],
        depth: usize,
        preimages: &mut PreimagesMap,
    ) -> Vec<u8> {
        if let [(key, value)] = entries {
            return encode_list(&[
                encode_bytes(&hex_prefix(&key[depth..], true)),
                encode_bytes(value),
            ]);
        }

        let first = &entries[0].0;
        let shared = (depth..first.len())
            .take_while(|i| entries.iter().all(|(key, _)| key.get(*i) == Some(&first[*i])))
            .count();
        if shared > 0 {
            let child = build_node(entries, depth + shared, preimages);
            return encode_list(&[
                encode_bytes(&hex_prefix(&first[depth..depth + shared], false)),
                reference(child, preimages),
            ]);
        }

        let mut items = Vec::with_capacity(BRANCH_ITEMS);
        for nibble in 0..16u8 {
            let group: Vec<_> = entries
                .iter()
                .filter(|(key, _)| key[depth] == nibble)
                .cloned()
                .collect();
            if group.is_empty() {
                items.push(encode_bytes(&[]));
            } else {
                let child = build_node(&group, depth + 1, preimages);
                items.push(reference(child, preimages));
            }
        }
        items.push(encode_bytes(&[]));
        encode_list(&items)
    }

    fn build_trie(entries: &[(Vec<u8>, Vec<u8>)], preimages: &mut PreimagesMap) -> [u8; 32] {
        let mut entries: Vec<_> = entries
            .iter()
            .map(|(key, value)| (key_to_nibbles(key), value.clone()))
            .collect();
        entries.sort();
        let root = build_node(&entries, 0, preimages);
        let hash = keccak256(&root);
        preimages.record(PreimageType::Keccak256, hash, root);
        hash
    }

    fn indexed(values: &[Vec<u8>], preimages: &mut PreimagesMap) -> [u8; 32] {
        let entries: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, value)| (alloy_rlp::encode(i as u64), value.clone()))
            .collect();
        build_trie(&entries, preimages)
    }

    #[test]
    fn hex_prefix_paths_decode() {
        for (nibbles, leaf) in [
            (vec![], true),
            (vec![1], false),
            (vec![1, 2], true),
            (vec![0xf, 0, 3], false),
        ] {
            let item = encode_bytes(&hex_prefix(&nibbles, leaf));
            let items = decode_node(&encode_list(&[item])).unwrap().unwrap();
            assert_eq!(decode_path(&items[0]).unwrap(), (leaf, nibbles));
        }
    }

    #[test]
    fn single_receipt_trie_is_a_leaf() {
        let mut preimages = PreimagesMap::default();
        let root = indexed(&[b"receipt zero".to_vec()], &mut preimages);
        assert_eq!(preimages.len(), 1);
        assert_eq!(
            fetch_indexed_value(&root, 0, &preimages).unwrap(),
            b"receipt zero"
        );
        assert!(matches!(
            fetch_indexed_value(&root, 1, &preimages),
            Err(LookupError::PathMismatch(0))
        ));
    }

    #[test]
    fn embedded_children_are_followed() {
        let mut preimages = PreimagesMap::default();
        let values: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i + 1]).collect();
        let root = indexed(&values, &mut preimages);
        // Every child of the root branch is short enough to be embedded.
        assert_eq!(preimages.len(), 1);
        for (i, value) in values.iter().enumerate() {
            assert_eq!(&fetch_indexed_value(&root, i as u64, &preimages).unwrap(), value);
        }
    }

    #[test]
    fn value_stored_in_a_branch_is_returned() {
        let mut preimages = PreimagesMap::default();
        let branch = {
            let mut items = vec![encode_bytes(&[]); 16];
            items[3] = encode_list(&[
                encode_bytes(&hex_prefix(&[4], true)),
                encode_bytes(b"deeper"),
            ]);
            items.push(encode_bytes(b"at the branch"));
            encode_list(&items)
        };
        let extension = encode_list(&[
            encode_bytes(&hex_prefix(&[1, 2], false)),
            reference(branch, &mut preimages),
        ]);
        let root = keccak256(&extension);
        preimages.record(PreimageType::Keccak256, root, extension);

        assert_eq!(fetch_trie_value(&root, &[0x12], &preimages).unwrap(), b"at the branch");
        assert_eq!(
            fetch_trie_value(&root, &[0x12, 0x34], &preimages).unwrap(),
            b"deeper"
        );
        assert!(matches!(
            fetch_trie_value(&root, &[0x12, 0x54], &preimages),
            Err(LookupError::KeyNotFound)
        ));
        assert!(matches!(
            fetch_trie_value(&root, &[0x13], &preimages),
            Err(LookupError::PathMismatch(0))
        ));
    }

    #[test]
    fn empty_trie_has_no_keys() {
        let mut preimages = PreimagesMap::default();
        let empty = encode_bytes(&[]);
        let root = keccak256(&empty);
        preimages.record(PreimageType::Keccak256, root, empty);
        assert_eq!(
            hex::encode(root),
            "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
        );
        assert!(matches!(
            fetch_indexed_value(&root, 0, &preimages),
            Err(LookupError::KeyNotFound)
        ));
    }

    #[test]
    fn malformed_nodes_are_rejected() {
        let mut preimages = PreimagesMap::default();
        let three_items = encode_list(&[encode_bytes(b"a"), encode_bytes(b"b"), encode_bytes(b"c")]);
        let root = keccak256(&three_items);
        preimages.record(PreimageType::Keccak256, root, three_items);
        assert!(matches!(
            fetch_trie_value(&root, &[0], &preimages),
            Err(LookupError::InvalidNode(_))
        ));

        let garbage = vec![0xf9, 0xff];
        let root = keccak256(&garbage);
        preimages.record(PreimageType::Keccak256, root, garbage);
        assert!(fetch_trie_value(&root, &[0], &preimages).is_err());
    }

    proptest! {
        #[test]
        fn every_index_of_an_ordered_trie_is_found(
            values in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..80), 1..300)
        ) {
            let mut preimages = PreimagesMap::default();
            let root = indexed(&values, &mut preimages);
            for (i, value) in values.iter().enumerate() {
                prop_assert_eq!(&fetch_indexed_value(&root, i as u64, &preimages).unwrap(), value);
            }
            prop_assert!(fetch_indexed_value(&root, values.len() as u64, &preimages).is_err());
        }
    }
}
