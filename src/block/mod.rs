//! Audio block data structures
//!
//! A recording is cut into fixed-size blocks once, at import or record time.
//! Blocks are never removed afterwards: deletion flips a flag and records the
//! hash of the plaintext so the Merkle root stays attestable, and reordering
//! only touches `current_index`.

pub mod codec;

pub use codec::{
    decode_blocks, parse_block_stream, rechunk, segment, serialize_block,
    serialize_block_stream, BlockDecoding,
};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_BLOCK_SIZE: usize = 100 * 1024; // ~1.16s of mono 16-bit 44.1kHz
pub const BLOCK_HASH_SIZE: usize = 32;

pub type BlockHash = [u8; BLOCK_HASH_SIZE];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("Corrupt block stream at offset {offset}: {reason}")]
    CorruptBlockStream { offset: usize, reason: String },

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Block {original_index} is too large to serialize ({len} bytes)")]
    BlockTooLarge { original_index: u32, len: usize },
}

impl BlockError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        BlockError::CorruptBlockStream {
            offset,
            reason: reason.into(),
        }
    }
}

pub(crate) fn sha256(data: &[u8]) -> BlockHash {
    Sha256::digest(data).into()
}

/// One segment of PCM audio.
///
/// Edits never mutate a block in place; the `with_*`/`mark_*` methods return
/// a new value sharing the payload buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub original_index: u32,
    pub current_index: u32,
    pub is_deleted: bool,
    pub is_encrypted: bool,
    /// Raw PCM, or ciphertext when `is_encrypted`.
    pub payload: Bytes,
    /// SHA-256 of the plaintext payload, recorded at delete time.
    pub undeleted_hash: Option<BlockHash>,
}

impl Block {
    pub fn new(index: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            original_index: index,
            current_index: index,
            is_deleted: false,
            is_encrypted: false,
            payload: payload.into(),
            undeleted_hash: None,
        }
    }

    pub fn with_current_index(&self, current_index: u32) -> Self {
        Self {
            current_index,
            ..self.clone()
        }
    }

    /// Soft-delete this block, recording the hash of its plaintext.
    ///
    /// An encrypted block already carries its hash and is returned as is.
    pub fn mark_deleted(&self) -> Self {
        if self.is_deleted {
            return self.clone();
        }
        Self {
            is_deleted: true,
            undeleted_hash: Some(sha256(&self.payload)),
            ..self.clone()
        }
    }

    /// Clear the deletion flag. Returns `None` when the payload is still
    /// ciphertext, since the block cannot be played until decrypted.
    pub fn unmark_deleted(&self) -> Option<Self> {
        if self.is_encrypted {
            return None;
        }
        Some(Self {
            is_deleted: false,
            undeleted_hash: None,
            ..self.clone()
        })
    }

    /// The hash this block contributes as a Merkle leaf.
    pub fn effective_hash(&self) -> BlockHash {
        match (self.is_deleted, self.undeleted_hash) {
            (true, Some(hash)) => hash,
            _ => sha256(&self.payload),
        }
    }
}

/// Non-deleted blocks sorted by `current_index`.
pub fn visible_order(blocks: &[Block]) -> Vec<&Block> {
    let mut visible: Vec<&Block> = blocks.iter().filter(|b| !b.is_deleted).collect();
    visible.sort_by_key(|b| (b.current_index, b.original_index));
    visible
}
