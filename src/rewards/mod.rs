/// Cashback reward module
///
/// Rebate math and the sorted-pair keccak256 Merkle tree that backs each
/// reward epoch.

pub mod calculator;
pub mod merkle;

pub use calculator::{RebateCalculator, DEFAULT_CASHBACK_PERCENT};
pub use merkle::{hash_leaf, MerkleTree};
