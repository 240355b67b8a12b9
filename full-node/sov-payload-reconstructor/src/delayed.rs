//! Delayed messages are committed to by a binary Merkle tree whose root is the rolling "seen"
//! root. A tree over `count` messages is perfect over the next power of two: leaves past
//! `count` are zero hashes and are never visited by a lookup.
//!
//! Internal node preimages are `left ‖ right`, leaf preimages are the messages themselves, and
//! every node is addressed by its keccak hash.

use sov_da_interface::hash::{keccak256, keccak256_concat};
use sov_da_interface::{PreimageResolver, PreimageType, PreimagesMap};
use tracing::trace;

use crate::lookup::{resolve_keccak, LookupError};

const INTERNAL_NODE_LEN: usize = 64;

/// Depth of the tree committing to `count` messages.
fn tree_depth(count: u64) -> u32 {
    count
        .checked_next_power_of_two()
        .map_or(u64::BITS, u64::trailing_zeros)
}

/// Reads delayed message `index` out of the tree committing to `count` messages under `root`.
pub fn read_delayed_message<R: PreimageResolver + ?Sized>(
    root: &[u8; 32],
    index: u64,
    count: u64,
    resolver: &R,
) -> Result<Vec<u8>, LookupError> {
    if index >= count {
        return Err(LookupError::IndexOutOfRange { index, count });
    }

    let mut current = *root;
    let mut remaining = index;
    for depth in (1..=tree_depth(count)).rev() {
        let node = resolve_keccak(resolver, &current)?;
        if node.len() != INTERNAL_NODE_LEN {
            return Err(LookupError::InvalidNode(format!(
                "internal node preimage is {} bytes, expected {INTERNAL_NODE_LEN}",
                node.len()
            )));
        }
        let (left, right) = node.split_at(32);
        let subtree_size = 1u64 << (depth - 1);
        let child = if remaining < subtree_size {
            left
        } else {
            remaining -= subtree_size;
            right
        };
        current.copy_from_slice(child);
    }
    trace!(index, count, leaf = hex::encode(current), "Resolved delayed message leaf");
    resolve_keccak(resolver, &current)
}

/// A delayed message tree built from the messages themselves, recording every preimage a
/// lookup needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedMessageTree {
    root: [u8; 32],
    count: u64,
}

impl DelayedMessageTree {
    /// Builds the tree over `messages` and records leaf and node preimages into `preimages`.
    pub fn build<M: AsRef<[u8]>>(messages: &[M], preimages: &mut PreimagesMap) -> Self {
        if messages.is_empty() {
            return Self {
                root: [0u8; 32],
                count: 0,
            };
        }

        let count = messages.len() as u64;
        let mut layer: Vec<[u8; 32]> = messages
            .iter()
            .map(|msg| {
                let hash = keccak256(msg.as_ref());
                preimages.record(PreimageType::Keccak256, hash, msg.as_ref().to_vec());
                hash
            })
            .collect();
        layer.resize(messages.len().next_power_of_two(), [0u8; 32]);

        while layer.len() > 1 {
            layer = layer
                .chunks_exact(2)
                .map(|pair| {
                    let hash = keccak256_concat(&[pair[0].as_slice(), pair[1].as_slice()]);
                    preimages.record(PreimageType::Keccak256, hash, pair.concat());
                    hash
                })
                .collect();
        }

        Self {
            root: layer[0],
            count,
        }
    }

    /// The "seen" root.
    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Number of messages the tree commits to.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Returns true if the tree commits to no message.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Reads message `index` through `resolver`.
    pub fn read<R: PreimageResolver + ?Sized>(
        &self,
        index: u64,
        resolver: &R,
    ) -> Result<Vec<u8>, LookupError> {
        read_delayed_message(&self.root, index, self.count, resolver)
    }
}
