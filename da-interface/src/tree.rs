//! The content tree hash used to address stored blobs.
//!
//! Data is split into 64 KiB bins. Each bin becomes a leaf `keccak(0xfe ‖ keccak(bin))`; pairs
//! of nodes are hashed as `keccak(0xff ‖ left ‖ right ‖ size_under)` with odd nodes bubbling up
//! unchanged. The lowest bit of the root is flipped so that a tree root can never be confused with
//! a plain keccak hash.

use crate::hash::keccak256;
use crate::preimage::{PreimageResolver, PreimageType, PreimagesMap};
use crate::DaError;

/// Size of a single leaf bin.
pub const BIN_SIZE: usize = 64 * 1024;
/// Domain separator of leaves.
pub const LEAF_BYTE: u8 = 0xfe;
/// Domain separator of internal nodes.
pub const NODE_BYTE: u8 = 0xff;

#[derive(Clone, Copy)]
struct Node {
    hash: [u8; 32],
    size: u32,
}

fn flip_bit_zero(mut hash: [u8; 32]) -> [u8; 32] {
    hash[0] ^= 1;
    hash
}

/// Hashes `data`, recording every keccak preimage the tree is built from.
pub fn record_hash(data: &[u8], mut preimages: Option<&mut PreimagesMap>) -> [u8; 32] {
    let mut keccord = |value: Vec<u8>| {
        let hash = keccak256(&value);
        if let Some(map) = preimages.as_deref_mut() {
            map.record(PreimageType::Keccak256, hash, value);
        }
        hash
    };
    let mut leaf = |bin: &[u8]| {
        let inner = keccord(bin.to_vec());
        let mut leaf = Vec::with_capacity(33);
        leaf.push(LEAF_BYTE);
        leaf.extend_from_slice(&inner);
        keccord(leaf)
    };

    if data.is_empty() {
        return flip_bit_zero(leaf(&[]));
    }

    let mut layer: Vec<Node> = data
        .chunks(BIN_SIZE)
        .map(|bin| Node {
            hash: leaf(bin),
            size: bin.len() as u32,
        })
        .collect();

    while layer.len() > 1 {
        let mut paired = Vec::with_capacity(layer.len() / 2 + 1);
        for pair in layer.chunks(2) {
            match pair {
                [left, right] => {
                    let size = left.size + right.size;
                    let mut node = Vec::with_capacity(1 + 32 + 32 + 4);
                    node.push(NODE_BYTE);
                    node.extend_from_slice(&left.hash);
                    node.extend_from_slice(&right.hash);
                    node.extend_from_slice(&size.to_be_bytes());
                    paired.push(Node {
                        hash: keccord(node),
                        size,
                    });
                }
                [odd] => paired.push(*odd),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            }
        }
        layer = paired;
    }
    flip_bit_zero(layer[0].hash)
}

/// Computes the content tree hash of `data`.
pub fn hash(data: &[u8]) -> [u8; 32] {
    record_hash(data, None)
}

/// Returns true if `hash` addresses `data`, either as a tree hash or as a plain keccak hash
/// (used by certificates that predate the tree format).
pub fn valid_hash(hash: &[u8; 32], data: &[u8]) -> bool {
    if self::hash(data) == *hash {
        return true;
    }
    data.len() <= BIN_SIZE && keccak256(data) == *hash
}

/// Rebuilds the data behind a tree root using only previously recorded preimages.
pub fn content<R: PreimageResolver>(root: &[u8; 32], resolver: &R) -> Result<Vec<u8>, DaError> {
    let mut out = Vec::new();
    let mut stack = vec![flip_bit_zero(*root)];
    while let Some(node) = stack.pop() {
        let preimage = resolver.resolve(PreimageType::Keccak256, &node)?;
        match preimage.split_first() {
            Some((&LEAF_BYTE, inner)) if inner.len() == 32 => {
                let mut inner_hash = [0u8; 32];
                inner_hash.copy_from_slice(inner);
                let bin = resolver.resolve(PreimageType::Keccak256, &inner_hash)?;
                if bin.len() > BIN_SIZE {
                    return Err(DaError::MalformedCertificate(format!(
                        "tree leaf of {} bytes exceeds the bin size",
                        bin.len()
                    )));
                }
                out.extend_from_slice(&bin);
            }
            Some((&NODE_BYTE, rest)) if rest.len() == 68 => {
                let mut left = [0u8; 32];
                let mut right = [0u8; 32];
                left.copy_from_slice(&rest[..32]);
                right.copy_from_slice(&rest[32..64]);
                // right goes first so the left subtree is expanded next
                stack.push(right);
                stack.push(left);
            }
            _ => {
                return Err(DaError::MalformedCertificate(format!(
                    "preimage of tree node {} is neither a leaf nor an internal node",
                    hex::encode(node)
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_of_len(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn empty_input_is_a_flipped_leaf() {
        let mut inner = vec![LEAF_BYTE];
        inner.extend_from_slice(&keccak256(&[]));
        let mut expected = keccak256(&inner);
        expected[0] ^= 1;
        assert_eq!(hash(&[]), expected);
    }

    #[test]
    fn root_is_never_a_plain_keccak() {
        let data = data_of_len(100);
        assert_ne!(hash(&data), keccak256(&data));
        assert!(valid_hash(&hash(&data), &data));
        assert!(valid_hash(&keccak256(&data), &data));
        assert!(!valid_hash(&hash(&data), &data_of_len(101)));
    }

    #[test]
    fn recorded_preimages_rebuild_multi_bin_content() {
        for len in [0, 1, BIN_SIZE, BIN_SIZE + 1, 3 * BIN_SIZE + 5] {
            let data = data_of_len(len);
            let mut preimages = PreimagesMap::default();
            let root = record_hash(&data, Some(&mut preimages));
            assert_eq!(root, hash(&data));
            assert_eq!(content(&root, &preimages).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn content_fails_without_preimages() {
        let root = hash(b"missing");
        assert!(matches!(
            content(&root, &PreimagesMap::default()),
            Err(DaError::NotFound(_))
        ));
    }
}
