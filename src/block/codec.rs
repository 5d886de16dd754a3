//! Block segmentation and the length-prefixed block record format
//!
//! Each record on disk is:
//!
//! ```text
//! record_len  u32 LE   (length of everything below)
//! version     u8       (RECORD_VERSION)
//! flags       u8       (bit 0 deleted, bit 1 encrypted)
//! original    u32 LE
//! current     u32 LE
//! hash_len    u8       (0 or 32)
//! hash        [u8; hash_len]
//! payload_len u32 LE
//! payload     [u8; payload_len]
//! ```

use bytes::Bytes;

use super::{Block, BlockError, BLOCK_HASH_SIZE};

const RECORD_VERSION: u8 = 1;
const FLAG_DELETED: u8 = 0b01;
const FLAG_ENCRYPTED: u8 = 0b10;
const LENGTH_PREFIX: usize = 4;
// version + flags + original + current + hash_len + payload_len
const MIN_RECORD_LEN: usize = 1 + 1 + 4 + 4 + 1 + 4;

/// How a block region was decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockDecoding {
    /// Parsed as a stream of block records.
    Structured,
    /// Not a block stream; re-chunked as raw PCM.
    Rechunked,
}

/// Split raw PCM into blocks of `block_size` bytes (the last may be shorter).
pub fn segment(pcm: &[u8], block_size: usize) -> Result<Vec<Block>, BlockError> {
    if block_size == 0 {
        return Err(BlockError::InvalidBlockSize(block_size));
    }
    let shared = Bytes::copy_from_slice(pcm);
    Ok((0..pcm.len())
        .step_by(block_size)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + block_size).min(pcm.len());
            Block::new(index as u32, shared.slice(start..end))
        })
        .collect())
}

/// Naive fixed-size re-chunking used when a data region is not a block stream.
pub fn rechunk(data: &[u8], block_size: usize) -> Vec<Block> {
    segment(data, block_size.max(1)).unwrap_or_default()
}

/// A record or payload length as the on-disk u32 field.
fn length_field(len: usize, original_index: u32) -> Result<[u8; 4], BlockError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| BlockError::BlockTooLarge { original_index, len })
}

pub fn serialize_block(block: &Block) -> Result<Vec<u8>, BlockError> {
    let hash_len = if block.undeleted_hash.is_some() { BLOCK_HASH_SIZE } else { 0 };
    let record_len = MIN_RECORD_LEN + hash_len + block.payload.len();

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + record_len);
    buf.extend_from_slice(&length_field(record_len, block.original_index)?);
    buf.push(RECORD_VERSION);

    let mut flags = 0u8;
    if block.is_deleted {
        flags |= FLAG_DELETED;
    }
    if block.is_encrypted {
        flags |= FLAG_ENCRYPTED;
    }
    buf.push(flags);
    buf.extend_from_slice(&block.original_index.to_le_bytes());
    buf.extend_from_slice(&block.current_index.to_le_bytes());
    buf.push(hash_len as u8);
    if let Some(hash) = &block.undeleted_hash {
        buf.extend_from_slice(hash);
    }
    buf.extend_from_slice(&length_field(block.payload.len(), block.original_index)?);
    buf.extend_from_slice(&block.payload);
    Ok(buf)
}

/// Serialize blocks in `original_index` order, regardless of play order.
pub fn serialize_block_stream(blocks: &[Block]) -> Result<Vec<u8>, BlockError> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| b.original_index);

    let mut out = Vec::new();
    for block in ordered {
        out.extend_from_slice(&serialize_block(block)?);
    }
    Ok(out)
}

fn read_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn parse_record(record: &[u8], offset: usize) -> Result<Block, BlockError> {
    if record.len() < MIN_RECORD_LEN {
        return Err(BlockError::corrupt(offset, "record shorter than fixed fields"));
    }
    if record[0] != RECORD_VERSION {
        return Err(BlockError::corrupt(
            offset,
            format!("unknown record version {}", record[0]),
        ));
    }

    let flags = record[1];
    let original_index = read_u32(record, 2).ok_or_else(|| BlockError::corrupt(offset, "original_index"))?;
    let current_index = read_u32(record, 6).ok_or_else(|| BlockError::corrupt(offset, "current_index"))?;
    let hash_len = record[10] as usize;

    let undeleted_hash = match hash_len {
        0 => None,
        BLOCK_HASH_SIZE => {
            let hash: [u8; BLOCK_HASH_SIZE] = record
                .get(11..11 + BLOCK_HASH_SIZE)
                .and_then(|h| h.try_into().ok())
                .ok_or_else(|| BlockError::corrupt(offset, "truncated undeleted_hash"))?;
            Some(hash)
        }
        other => {
            return Err(BlockError::corrupt(offset, format!("bad hash length {}", other)));
        }
    };

    let payload_at = 11 + hash_len;
    let payload_len = read_u32(record, payload_at)
        .ok_or_else(|| BlockError::corrupt(offset, "missing payload length"))? as usize;
    let payload = &record[payload_at + 4..];
    if payload.len() != payload_len {
        return Err(BlockError::corrupt(
            offset,
            format!("payload length {} does not match record ({})", payload_len, payload.len()),
        ));
    }
    if payload.is_empty() {
        return Err(BlockError::corrupt(offset, "empty payload"));
    }

    let is_deleted = flags & FLAG_DELETED != 0;
    if is_deleted && undeleted_hash.is_none() {
        return Err(BlockError::corrupt(offset, "deleted block without undeleted_hash"));
    }

    Ok(Block {
        original_index,
        current_index,
        is_deleted,
        is_encrypted: flags & FLAG_ENCRYPTED != 0,
        payload: Bytes::copy_from_slice(payload),
        undeleted_hash,
    })
}

/// Parse length-prefixed block records until the input is exhausted.
pub fn parse_block_stream(data: &[u8]) -> Result<Vec<Block>, BlockError> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let record_len = read_u32(data, offset)
            .ok_or_else(|| BlockError::corrupt(offset, "truncated length prefix"))? as usize;
        let start = offset + LENGTH_PREFIX;
        let end = start
            .checked_add(record_len)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                BlockError::corrupt(
                    offset,
                    format!("record length {} overruns {} remaining bytes", record_len, data.len() - start),
                )
            })?;

        let block = parse_record(&data[start..end], offset)?;
        if blocks.iter().any(|b| b.original_index == block.original_index) {
            return Err(BlockError::corrupt(
                offset,
                format!("duplicate original_index {}", block.original_index),
            ));
        }
        blocks.push(block);
        offset = end;
    }

    Ok(blocks)
}

/// Decode a container's data region, falling back to raw re-chunking when it
/// does not hold a valid block stream (plain WAV, or a pre-block-format file).
pub fn decode_blocks(data: &[u8], block_size: usize) -> (Vec<Block>, BlockDecoding) {
    match parse_block_stream(data) {
        Ok(blocks) if !blocks.is_empty() => {
            log::debug!("Parsed {} block records", blocks.len());
            (blocks, BlockDecoding::Structured)
        }
        Ok(_) => (Vec::new(), BlockDecoding::Structured),
        Err(e) => {
            log::debug!("Block stream parse failed, falling back to raw PCM: {}", e);
            (rechunk(data, block_size), BlockDecoding::Rechunked)
        }
    }
}
