//! Merkle root over a container's blocks
//!
//! Leaves are taken in `original_index` order so the root identifies the
//! original content set, not the current play order. Deleted blocks contribute
//! their recorded plaintext hash, which keeps the root stable across
//! delete/encrypt cycles.

use thiserror::Error;

use crate::block::{sha256, Block, BlockHash};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Cannot build a Merkle root over an empty block set")]
    EmptyBlockSet,
}

/// Result of a Merkle check, for callers that cache it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MerkleStatus {
    #[default]
    Unknown,
    Verified,
    Mismatch,
}

impl From<bool> for MerkleStatus {
    fn from(matches: bool) -> Self {
        if matches {
            MerkleStatus::Verified
        } else {
            MerkleStatus::Mismatch
        }
    }
}

/// Leaf hash of a block.
pub fn hash_block(block: &Block) -> BlockHash {
    block.effective_hash()
}

fn hash_pair(left: &BlockHash, right: &BlockHash) -> BlockHash {
    let mut joined = [0u8; 64];
    joined[..32].copy_from_slice(left);
    joined[32..].copy_from_slice(right);
    sha256(&joined)
}

/// Build the root from leaf hashes already in leaf order.
pub fn root_from_leaves(leaves: Vec<BlockHash>) -> Result<BlockHash, MerkleError> {
    let mut level = leaves;
    if level.is_empty() {
        return Err(MerkleError::EmptyBlockSet);
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                // Odd level: the last hash pairs with itself
                let right = pair.get(1).unwrap_or(&pair[0]);
                hash_pair(&pair[0], right)
            })
            .collect();
    }

    Ok(level[0])
}

pub fn build_root(blocks: &[Block]) -> Result<BlockHash, MerkleError> {
    let mut sorted: Vec<&Block> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.original_index);
    root_from_leaves(sorted.into_iter().map(hash_block).collect())
}

/// Recompute the root and compare with `expected`. A mismatch is a normal
/// outcome (edited or tampered content) and is reported as `false`.
pub fn verify_blocks(blocks: &[Block], expected: &BlockHash) -> bool {
    match build_root(blocks) {
        Ok(root) if &root == expected => {
            log::info!("Merkle root matches ({})", hex::encode(&root[..8]));
            true
        }
        Ok(root) => {
            log::warn!(
                "Merkle root mismatch: stored {} recomputed {}",
                hex::encode(&expected[..8]),
                hex::encode(&root[..8])
            );
            false
        }
        Err(e) => {
            log::warn!("Merkle verification failed: {}", e);
            false
        }
    }
}
