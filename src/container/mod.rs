//! The block-structured WAV container
//!
//! Layout on disk:
//!
//! 1. 44-byte WAV header whose `data` size covers only the block stream
//! 2. block records in `original_index` order
//! 3. custom chunks: `omrh` (Merkle root), `edhi` (edit history),
//!    `meta` (recording metadata), `dsig` (signature, always last)
//!
//! Players that understand plain WAV see a `data` chunk they cannot decode as
//! PCM; use `write_playable_copy` to produce audio for listening.

pub mod chunk;
pub mod header;
pub mod reader;
pub mod writer;

pub use chunk::{describe_chunks, extract_chunk, scan_chunks, Chunk, ChunkHeader, ChunkId, ChunkKind};
pub use header::{WavHeader, HEADER_LEN};
pub use reader::{locate_data_chunk, read_container};
pub use writer::{write_full_container, write_playable_copy, write_unsigned};

use std::path::Path;

use thiserror::Error;

use crate::block::{segment, Block, BlockDecoding, BlockError, BlockHash};
use crate::config::ContainerConfig;
use crate::history::EditHistory;
use crate::merkle::{self, MerkleError, MerkleStatus};
use crate::metadata::RecordingMetadata;
use crate::signature::SignatureBlock;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Not a RIFF/WAVE file: {0}")]
    NotRiff(String),

    #[error("Chunk '{id}' declares {declared} bytes but only {remaining} remain")]
    TruncatedChunk {
        id: String,
        declared: usize,
        remaining: usize,
    },

    #[error("No 'data' chunk found")]
    MissingDataChunk,

    #[error("Invalid '{id}' chunk: {reason}")]
    InvalidChunk { id: String, reason: String },

    #[error("Block error: {0}")]
    Block(#[from] BlockError),

    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("Container of {0} bytes exceeds the 4 GiB RIFF limit")]
    FileTooLarge(usize),

    #[error("IO error: {0}")]
    IoError(String),
}

/// An in-memory container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub header: WavHeader,
    pub blocks: Vec<Block>,
    /// Root over the blocks at creation time. Never recomputed after that.
    pub merkle_root: Option<BlockHash>,
    pub edit_history: EditHistory,
    pub metadata: Option<RecordingMetadata>,
    pub signature: Option<SignatureBlock>,
    /// Chunks with IDs this crate does not know, in file order.
    pub unknown_chunks: Vec<(ChunkId, Vec<u8>)>,
    /// Whether the data region parsed as block records.
    pub decoding: BlockDecoding,
}

impl Container {
    /// Segment freshly recorded PCM and fix the original Merkle root.
    pub fn create(
        pcm: &[u8],
        metadata: Option<RecordingMetadata>,
        config: &ContainerConfig,
    ) -> Result<Self, ContainerError> {
        let blocks = segment(pcm, config.block_size)?;
        let root = merkle::build_root(&blocks)?;
        log::info!(
            "Created container: {} blocks, root {}",
            blocks.len(),
            hex::encode(root)
        );

        Ok(Self {
            header: WavHeader::new(config.audio, 0),
            blocks,
            merkle_root: Some(root),
            edit_history: EditHistory::new(),
            metadata,
            signature: None,
            unknown_chunks: Vec::new(),
            decoding: BlockDecoding::Structured,
        })
    }

    /// Recompute the root over the current blocks and compare with the stored
    /// original. `false` for edited-in-place payloads, missing roots or empty
    /// block sets; never an error.
    pub fn verify_merkle_root(&self) -> bool {
        match &self.merkle_root {
            Some(root) => merkle::verify_blocks(&self.blocks, root),
            None => {
                log::warn!("No 'omrh' chunk; container is unverifiable");
                false
            }
        }
    }

    pub fn merkle_status(&self) -> MerkleStatus {
        self.verify_merkle_root().into()
    }

    /// Non-deleted blocks in play order.
    pub fn visible_blocks(&self) -> Vec<&Block> {
        crate::block::visible_order(&self.blocks)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        write_full_container(self)
    }

    pub fn from_bytes(bytes: &[u8], config: &ContainerConfig) -> Result<Self, ContainerError> {
        read_container(bytes, config)
    }

    pub fn playable_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        write_playable_copy(&self.header, &self.blocks)
    }

    pub fn load(path: &Path, config: &ContainerConfig) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path).map_err(|e| ContainerError::IoError(e.to_string()))?;
        Self::from_bytes(&bytes, config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ContainerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ContainerError::IoError(e.to_string()))?;
        }
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| ContainerError::IoError(e.to_string()))
    }
}
