//! Typed chunks appended after the audio data
//!
//! Every chunk is `id (4 ASCII bytes) || length (u32 LE) || payload`. Known
//! IDs are decoded through a parser table; anything else becomes
//! `Chunk::Unknown` and is skipped by its declared length, so newer writers
//! can add chunks without breaking older readers. A zero pad byte after an
//! odd-length chunk, as other RIFF tools write, is skipped when present.

use std::fmt;

use super::header::RIFF_PREAMBLE_LEN;
use super::ContainerError;
use crate::block::{BlockHash, BLOCK_HASH_SIZE};
use crate::history::EditHistory;
use crate::metadata::RecordingMetadata;
use crate::signature::SignatureBlock;

pub type ChunkId = [u8; 4];

pub const FMT_CHUNK_ID: ChunkId = *b"fmt ";
pub const DATA_CHUNK_ID: ChunkId = *b"data";
pub const CHUNK_HEADER_LEN: usize = 8;

/// The custom chunk types this crate understands, in write order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    MerkleRoot,
    EditHistory,
    Metadata,
    Signature,
}

impl ChunkKind {
    pub const ALL: [ChunkKind; 4] = [
        ChunkKind::MerkleRoot,
        ChunkKind::EditHistory,
        ChunkKind::Metadata,
        ChunkKind::Signature,
    ];

    pub fn id(&self) -> ChunkId {
        match self {
            ChunkKind::MerkleRoot => *b"omrh",
            ChunkKind::EditHistory => *b"edhi",
            ChunkKind::Metadata => *b"meta",
            ChunkKind::Signature => *b"dsig",
        }
    }

    pub fn from_id(id: &ChunkId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| &kind.id() == id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    MerkleRoot(BlockHash),
    EditHistory(EditHistory),
    Metadata(RecordingMetadata),
    Signature(SignatureBlock),
    Unknown { id: ChunkId, data: Vec<u8> },
}

type ChunkParser = fn(&[u8]) -> Result<Chunk, String>;

fn parse_merkle_root(data: &[u8]) -> Result<Chunk, String> {
    let root: BlockHash = data
        .try_into()
        .map_err(|_| format!("expected {} bytes, found {}", BLOCK_HASH_SIZE, data.len()))?;
    Ok(Chunk::MerkleRoot(root))
}

fn parse_edit_history(data: &[u8]) -> Result<Chunk, String> {
    EditHistory::from_cbor(data).map(Chunk::EditHistory)
}

fn parse_metadata(data: &[u8]) -> Result<Chunk, String> {
    RecordingMetadata::from_cbor(data).map(Chunk::Metadata)
}

fn parse_signature(data: &[u8]) -> Result<Chunk, String> {
    SignatureBlock::from_cbor(data).map(Chunk::Signature)
}

const PARSERS: [(ChunkKind, ChunkParser); 4] = [
    (ChunkKind::MerkleRoot, parse_merkle_root),
    (ChunkKind::EditHistory, parse_edit_history),
    (ChunkKind::Metadata, parse_metadata),
    (ChunkKind::Signature, parse_signature),
];

impl Chunk {
    pub fn decode(id: ChunkId, data: &[u8]) -> Result<Chunk, ContainerError> {
        let Some((_, parser)) = PARSERS.iter().find(|(kind, _)| kind.id() == id) else {
            return Ok(Chunk::Unknown {
                id,
                data: data.to_vec(),
            });
        };
        parser(data).map_err(|reason| ContainerError::InvalidChunk {
            id: display_id(&id),
            reason,
        })
    }

    pub fn kind(&self) -> Option<ChunkKind> {
        match self {
            Chunk::MerkleRoot(_) => Some(ChunkKind::MerkleRoot),
            Chunk::EditHistory(_) => Some(ChunkKind::EditHistory),
            Chunk::Metadata(_) => Some(ChunkKind::Metadata),
            Chunk::Signature(_) => Some(ChunkKind::Signature),
            Chunk::Unknown { .. } => None,
        }
    }

    pub fn id(&self) -> ChunkId {
        match self {
            Chunk::Unknown { id, .. } => *id,
            Chunk::MerkleRoot(_) => ChunkKind::MerkleRoot.id(),
            Chunk::EditHistory(_) => ChunkKind::EditHistory.id(),
            Chunk::Metadata(_) => ChunkKind::Metadata.id(),
            Chunk::Signature(_) => ChunkKind::Signature.id(),
        }
    }

    fn payload(&self) -> Result<Vec<u8>, ContainerError> {
        let encoded = match self {
            Chunk::MerkleRoot(root) => Ok(root.to_vec()),
            Chunk::EditHistory(history) => history.to_cbor(),
            Chunk::Metadata(metadata) => metadata.to_cbor(),
            Chunk::Signature(signature) => signature.to_cbor(),
            Chunk::Unknown { data, .. } => Ok(data.clone()),
        };
        encoded.map_err(|reason| ContainerError::InvalidChunk {
            id: display_id(&self.id()),
            reason,
        })
    }

    /// Append `id || len || payload` to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ContainerError> {
        let payload = self.payload()?;
        let len = length_field(&self.id(), payload.len())?;
        out.extend_from_slice(&self.id());
        out.extend_from_slice(&len);
        out.extend_from_slice(&payload);
        Ok(())
    }
}

fn length_field(id: &ChunkId, len: usize) -> Result<[u8; 4], ContainerError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| ContainerError::InvalidChunk {
            id: display_id(id),
            reason: format!("payload of {} bytes does not fit a u32 length", len),
        })
}

pub fn display_id(id: &ChunkId) -> String {
    String::from_utf8_lossy(id).into_owned()
}

/// Location of one chunk inside a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    /// Offset of the chunk header (the ID bytes).
    pub offset: usize,
    /// Declared payload length.
    pub len: usize,
    /// Whether a pad byte follows the payload.
    pub padded: bool,
}

impl ChunkHeader {
    pub fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.offset + CHUNK_HEADER_LEN;
        start..start + self.len
    }

    pub fn end(&self) -> usize {
        self.offset + CHUNK_HEADER_LEN + self.len
    }

    /// End of the chunk including its pad byte, if any.
    pub fn span_end(&self) -> usize {
        self.end() + usize::from(self.padded)
    }
}

impl fmt::Display for ChunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "offset {:>8}  id '{}'  size {}",
            self.offset,
            display_id(&self.id),
            self.len
        )
    }
}

/// Walk every sub-chunk after the RIFF preamble.
///
/// A declared length running past the end of the buffer, or a dangling partial
/// chunk header, is reported as `TruncatedChunk` (typically an interrupted
/// write).
pub fn scan_chunks(bytes: &[u8]) -> Result<Vec<ChunkHeader>, ContainerError> {
    let mut headers = Vec::new();
    let mut offset = RIFF_PREAMBLE_LEN;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < CHUNK_HEADER_LEN {
            return Err(ContainerError::TruncatedChunk {
                id: display_id_lossy(&bytes[offset..]),
                declared: CHUNK_HEADER_LEN,
                remaining,
            });
        }

        let mut id = [0u8; 4];
        id.copy_from_slice(&bytes[offset..offset + 4]);
        let len = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;

        if len > remaining - CHUNK_HEADER_LEN {
            return Err(ContainerError::TruncatedChunk {
                id: display_id(&id),
                declared: len,
                remaining: remaining - CHUNK_HEADER_LEN,
            });
        }

        let end = offset + CHUNK_HEADER_LEN + len;
        // Chunk IDs are ASCII, so a zero here can only be padding.
        let padded = len % 2 == 1 && bytes.get(end) == Some(&0);
        let header = ChunkHeader {
            id,
            offset,
            len,
            padded,
        };
        headers.push(header);
        offset = header.span_end();
    }

    Ok(headers)
}

fn display_id_lossy(partial: &[u8]) -> String {
    String::from_utf8_lossy(&partial[..partial.len().min(4)]).into_owned()
}

/// Find and decode the first chunk of `kind`. `Ok(None)` if absent.
pub fn extract_chunk(bytes: &[u8], kind: ChunkKind) -> Result<Option<Chunk>, ContainerError> {
    let headers = scan_chunks(bytes)?;
    match headers.iter().find(|h| h.id == kind.id()) {
        Some(header) => Chunk::decode(header.id, &bytes[header.payload_range()]).map(Some),
        None => Ok(None),
    }
}

/// One line per chunk, for debugging container layouts.
pub fn describe_chunks(bytes: &[u8]) -> Result<Vec<String>, ContainerError> {
    Ok(scan_chunks(bytes)?.iter().map(ToString::to_string).collect())
}
