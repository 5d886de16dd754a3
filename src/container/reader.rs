use super::chunk::{scan_chunks, Chunk, CHUNK_HEADER_LEN, DATA_CHUNK_ID, FMT_CHUNK_ID};
use super::header::WavHeader;
use super::{Container, ContainerError};
use crate::block::{decode_blocks, BlockDecoding};
use crate::config::ContainerConfig;

/// Offset and length of the `data` chunk payload.
pub fn locate_data_chunk(bytes: &[u8]) -> Result<(usize, usize), ContainerError> {
    WavHeader::from_bytes(bytes)?;
    scan_chunks(bytes)?
        .iter()
        .find(|h| h.id == DATA_CHUNK_ID)
        .map(|h| (h.offset + CHUNK_HEADER_LEN, h.len))
        .ok_or(ContainerError::MissingDataChunk)
}

/// Parse a container, or a plain WAV file.
///
/// Known chunks are decoded (the first occurrence of each wins); unknown
/// chunks are kept in `unknown_chunks`. A `data` region that is not a block
/// stream is re-chunked into `config.block_size` blocks. A file without an
/// `omrh` chunk reads fine but never verifies.
pub fn read_container(bytes: &[u8], config: &ContainerConfig) -> Result<Container, ContainerError> {
    let mut header = WavHeader::from_bytes(bytes)?;
    let chunks = scan_chunks(bytes)?;

    let data = chunks
        .iter()
        .find(|h| h.id == DATA_CHUNK_ID)
        .ok_or(ContainerError::MissingDataChunk)?;
    header.data_size = data.len as u32;

    let (blocks, decoding) = decode_blocks(&bytes[data.payload_range()], config.block_size);
    if decoding == BlockDecoding::Rechunked {
        log::warn!(
            "'data' chunk is not a block stream; re-chunked into {} raw blocks",
            blocks.len()
        );
    }

    let mut merkle_root = None;
    let mut edit_history = None;
    let mut metadata = None;
    let mut signature = None;
    let mut unknown_chunks = Vec::new();

    for chunk_header in chunks
        .iter()
        .filter(|h| h.id != FMT_CHUNK_ID && h.id != DATA_CHUNK_ID)
    {
        match Chunk::decode(chunk_header.id, &bytes[chunk_header.payload_range()])? {
            Chunk::MerkleRoot(root) => merkle_root = merkle_root.or(Some(root)),
            Chunk::EditHistory(history) => edit_history = edit_history.or(Some(history)),
            Chunk::Metadata(meta) => metadata = metadata.or(Some(meta)),
            Chunk::Signature(sig) => signature = signature.or(Some(sig)),
            Chunk::Unknown { id, data } => {
                log::debug!("Skipping unknown chunk {}", chunk_header);
                unknown_chunks.push((id, data));
            }
        }
    }

    if merkle_root.is_none() {
        log::info!("No 'omrh' chunk; container will not verify");
    }

    Ok(Container {
        header,
        blocks,
        merkle_root,
        edit_history: edit_history.unwrap_or_default(),
        metadata,
        signature,
        unknown_chunks,
        decoding,
    })
}
