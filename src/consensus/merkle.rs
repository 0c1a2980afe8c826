//! Merkle root over a transaction id sequence.
//!
//! Leaves are the txids themselves; parents are SHA-256d of the concatenated
//! children. An odd node at any level is paired with itself.

use crate::consensus::types::Hash;
use crate::crypto::hash256;

/// Compute the Merkle root of an ordered txid list.
///
/// An empty list yields the zero hash; it never occurs in a valid block,
/// which always carries a coinbase.
pub fn merkle_root(txids: &[Hash]) -> Hash {
    if txids.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = txids.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            let mut combined = [0u8; 64];
            combined[..32].copy_from_slice(left);
            combined[32..].copy_from_slice(right);
            next.push(hash256(&combined));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn test_single_leaf_is_itself() {
        let leaf = [7u8; 32];
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_pair_hashing() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(&a);
        combined[32..].copy_from_slice(&b);
        assert_eq!(merkle_root(&[a, b]), hash256(&combined));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let c = [3u8; 32];
        // Level 1: h(a,b), h(c,c); root = h(h(a,b), h(c,c))
        let explicit = merkle_root(&[a, b, c]);
        let duplicated = merkle_root(&[merkle_root(&[a, b]), merkle_root(&[c, c])]);
        assert_eq!(explicit, duplicated);
    }

    #[test]
    fn test_order_sensitivity() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
