//! Merkle commitment over transaction IDs.
//!
//! Double SHA-256 with domain-separated hashing:
//! - Leaf: `SHA256d(0x00 || txid)`
//! - Internal node: `SHA256d(0x01 || left || right)`
//!
//! Odd layers duplicate their last element. An empty leaf set produces
//! [`Hash256::ZERO`], which no valid block can carry since every block has
//! at least a coinbase.

use crate::types::{sha256d, Hash256};

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Leaf hash: `SHA256d(0x00 || data)`.
pub fn leaf_hash(data: &Hash256) -> Hash256 {
    let mut buf = [0u8; 33];
    buf[0] = LEAF_PREFIX;
    buf[1..].copy_from_slice(data.as_bytes());
    sha256d(&buf)
}

/// Internal node hash: `SHA256d(0x01 || left || right)`.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; 65];
    buf[0] = NODE_PREFIX;
    buf[1..33].copy_from_slice(left.as_bytes());
    buf[33..].copy_from_slice(right.as_bytes());
    sha256d(&buf)
}

/// Merkle root over a slice of transaction IDs.
///
/// Returns [`Hash256::ZERO`] for an empty slice.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current: Vec<Hash256> = leaves.iter().map(leaf_hash).collect();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0]
}

fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() {
            &layer[i + 1]
        } else {
            // Odd layer: last element pairs with itself.
            left
        };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}
