/// Sorted-pair keccak256 Merkle tree over reward leaves
///
/// Leaf digest: keccak256(uint256 leafIndex || address account || uint256
/// amount) with fixed-width big-endian packing, matching the on-chain
/// claim contract's solidity-packed encoding.
///
/// Interior nodes hash the concatenation of the pair sorted bytewise, so a
/// proof needs no sibling-side metadata. An odd node at any level is
/// promoted to the next level unhashed.

use alloy_primitives::{Address, U256};
use sha3::{Digest, Keccak256};

pub type Hash32 = [u8; 32];

fn keccak(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of a single (index, account, amount) reward leaf.
pub fn hash_leaf(index: u64, account: Address, amount: U256) -> Hash32 {
    let mut buf = [0u8; 84];
    buf[..32].copy_from_slice(&U256::from(index).to_be_bytes::<32>());
    buf[32..52].copy_from_slice(account.as_slice());
    buf[52..].copy_from_slice(&amount.to_be_bytes::<32>());
    keccak(&buf)
}

fn hash_pair(a: &Hash32, b: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    if a <= b {
        buf[..32].copy_from_slice(a);
        buf[32..].copy_from_slice(b);
    } else {
        buf[..32].copy_from_slice(b);
        buf[32..].copy_from_slice(a);
    }
    keccak(&buf)
}

pub fn to_hex(hash: &Hash32) -> String {
    format!("0x{}", hex::encode(hash))
}

pub struct MerkleTree {
    layers: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    /// Build a tree over the given leaf digests. At least one leaf required.
    pub fn new(leaves: Vec<Hash32>) -> anyhow::Result<Self> {
        if leaves.is_empty() {
            anyhow::bail!("merkle tree requires at least one leaf");
        }

        let mut layers = vec![leaves];
        while layers.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = layers.last().expect("non-empty layers");
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                match pair {
                    [a, b] => next.push(hash_pair(a, b)),
                    // odd node carries up unhashed
                    [a] => next.push(*a),
                    _ => unreachable!(),
                }
            }
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> Hash32 {
        self.layers.last().expect("non-empty layers")[0]
    }

    pub fn root_hex(&self) -> String {
        to_hex(&self.root())
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Ordered sibling hashes from the leaf up to (excluding) the root.
    pub fn proof(&self, leaf_index: usize) -> Vec<Hash32> {
        let mut proof = Vec::new();
        let mut index = leaf_index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if sibling < layer.len() {
                proof.push(layer[sibling]);
            }
            index /= 2;
        }
        proof
    }

    pub fn proof_hex(&self, leaf_index: usize) -> Vec<String> {
        self.proof(leaf_index).iter().map(to_hex).collect()
    }

    /// Walk a leaf digest through a proof with sorted-pair hashing.
    pub fn verify(leaf: Hash32, proof: &[Hash32], root: Hash32) -> bool {
        let mut node = leaf;
        for sibling in proof {
            node = hash_pair(&node, sibling);
        }
        node == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn addr(n: u8) -> Address {
        Address::from_slice(&[n; 20])
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        // One-leaf tree: root = leaf digest, proof empty
        let leaf = hash_leaf(0, addr(1), U256::from(750));
        let tree = MerkleTree::new(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert!(tree.proof(0).is_empty());
        assert!(MerkleTree::verify(leaf, &[], tree.root()));
    }

    #[test]
    fn test_two_leaves_sorted_pair() {
        let leaf_a = hash_leaf(0, addr(1), U256::from(100));
        let leaf_b = hash_leaf(1, addr(2), U256::from(200));
        let tree = MerkleTree::new(vec![leaf_a, leaf_b]).unwrap();

        assert_eq!(tree.root(), hash_pair(&leaf_a, &leaf_b));
        assert_eq!(tree.proof(0), vec![leaf_b]);
        assert_eq!(tree.proof(1), vec![leaf_a]);

        // Root independent of insertion order
        let swapped = MerkleTree::new(vec![leaf_b, leaf_a]).unwrap();
        assert_eq!(tree.root(), swapped.root());
    }

    #[test]
    fn test_odd_leaf_promoted() {
        let leaves: Vec<Hash32> = (0..3u8)
            .map(|i| hash_leaf(i as u64, addr(i + 1), U256::from(100 * (i as u64 + 1))))
            .collect();
        let tree = MerkleTree::new(leaves.clone()).unwrap();

        let left = hash_pair(&leaves[0], &leaves[1]);
        assert_eq!(tree.root(), hash_pair(&left, &leaves[2]));

        // Third leaf has no sibling at level 0, so its proof skips that level
        assert_eq!(tree.proof(2), vec![left]);
    }

    #[test]
    fn test_all_proofs_verify_for_various_sizes() {
        for n in 1..=9u64 {
            let leaves: Vec<Hash32> = (0..n)
                .map(|i| hash_leaf(i, addr((i % 255) as u8 + 1), U256::from(i + 1)))
                .collect();
            let tree = MerkleTree::new(leaves.clone()).unwrap();
            let root = tree.root();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i);
                assert!(
                    MerkleTree::verify(*leaf, &proof, root),
                    "proof failed for leaf {} of {}",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_tampered_proof_rejected() {
        let leaves: Vec<Hash32> = (0..4u64)
            .map(|i| hash_leaf(i, addr(i as u8 + 1), U256::from(i + 1)))
            .collect();
        let tree = MerkleTree::new(leaves.clone()).unwrap();
        let mut proof = tree.proof(1);
        proof[0][0] ^= 0xff;
        assert!(!MerkleTree::verify(leaves[1], &proof, tree.root()));
        // Wrong leaf amount also fails
        let bad_leaf = hash_leaf(1, addr(2), U256::from(999));
        assert!(!MerkleTree::verify(bad_leaf, &tree.proof(1), tree.root()));
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(MerkleTree::new(vec![]).is_err());
    }

    #[test]
    fn test_leaf_encoding_is_fixed_width() {
        // Same content must always hash identically; differing index,
        // account, or amount must change the digest
        let account = Address::from_str("0x00112233445566778899aabbccddeeff00112233").unwrap();
        let base = hash_leaf(5, account, U256::from(1_000));
        assert_eq!(base, hash_leaf(5, account, U256::from(1_000)));
        assert_ne!(base, hash_leaf(6, account, U256::from(1_000)));
        assert_ne!(base, hash_leaf(5, account, U256::from(1_001)));
        assert_ne!(base, hash_leaf(5, addr(9), U256::from(1_000)));
    }
}
