use super::chunk::Chunk;
use super::header::{patch_riff_size, WavHeader};
use super::{Container, ContainerError};
use crate::block::{serialize_block_stream, visible_order, Block};

/// Header, block stream and every custom chunk except `dsig`.
fn write_body(container: &Container) -> Result<Vec<u8>, ContainerError> {
    let stream = serialize_block_stream(&container.blocks)?;
    let header = WavHeader {
        data_size: u32::try_from(stream.len())
            .map_err(|_| ContainerError::FileTooLarge(stream.len()))?,
        ..container.header
    };

    let mut out = Vec::with_capacity(header.to_bytes().len() + stream.len() + 256);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&stream);

    if let Some(root) = container.merkle_root {
        Chunk::MerkleRoot(root).write_to(&mut out)?;
    }
    Chunk::EditHistory(container.edit_history.clone()).write_to(&mut out)?;
    if let Some(metadata) = &container.metadata {
        Chunk::Metadata(metadata.clone()).write_to(&mut out)?;
    }
    for (id, data) in &container.unknown_chunks {
        Chunk::Unknown {
            id: *id,
            data: data.clone(),
        }
        .write_to(&mut out)?;
    }

    Ok(out)
}

/// Patch the RIFF size, refusing files whose size does not fit the field.
fn finish(mut out: Vec<u8>) -> Result<Vec<u8>, ContainerError> {
    if u32::try_from(out.len() - 8).is_err() {
        return Err(ContainerError::FileTooLarge(out.len()));
    }
    patch_riff_size(&mut out);
    Ok(out)
}

/// The exact bytes a signature covers.
pub fn write_unsigned(container: &Container) -> Result<Vec<u8>, ContainerError> {
    finish(write_body(container)?)
}

/// Full container. A signature, if present, is always the last chunk.
pub fn write_full_container(container: &Container) -> Result<Vec<u8>, ContainerError> {
    let mut out = write_body(container)?;
    if let Some(signature) = &container.signature {
        Chunk::Signature(signature.clone()).write_to(&mut out)?;
    }
    let out = finish(out)?;

    log::debug!(
        "Wrote container: {} blocks, {} bytes, signed={}",
        container.blocks.len(),
        out.len(),
        container.signature.is_some()
    );
    Ok(out)
}

/// A plain WAV of the visible blocks in play order, for ordinary players.
pub fn write_playable_copy(
    header: &WavHeader,
    blocks: &[Block],
) -> Result<Vec<u8>, ContainerError> {
    let visible = visible_order(blocks);
    let data_len: usize = visible.iter().map(|b| b.payload.len()).sum();
    let data_size =
        u32::try_from(data_len).map_err(|_| ContainerError::FileTooLarge(data_len))?;

    let mut out = Vec::with_capacity(super::HEADER_LEN + data_len);
    out.extend_from_slice(&WavHeader::new(header.format, data_size).to_bytes());
    for block in visible {
        out.extend_from_slice(&block.payload);
    }
    finish(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContainerConfig;
    use crate::container::chunk::scan_chunks;
    use crate::signature::SignatureBlock;

    fn container() -> Container {
        let config = ContainerConfig {
            block_size: 4,
            ..Default::default()
        };
        Container::create(&[1, 1, 1, 1, 2, 2, 2, 2, 3, 3], None, &config).unwrap()
    }

    fn ids(bytes: &[u8]) -> Vec<[u8; 4]> {
        scan_chunks(bytes).unwrap().iter().map(|h| h.id).collect()
    }

    #[test]
    fn test_full_container_layout() {
        let bytes = write_full_container(&container()).unwrap();
        assert_eq!(ids(&bytes), vec![*b"fmt ", *b"data", *b"omrh", *b"edhi"]);

        let header = WavHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.riff_size as usize, bytes.len() - 8);
    }

    #[test]
    fn test_signature_written_last() {
        let mut signed = container();
        signed.unknown_chunks.push((*b"note", vec![1, 2, 3]));
        signed.signature = Some(SignatureBlock {
            public_key_id: "ab".into(),
            signature: vec![0u8; 64],
            signed_at: chrono::Utc::now(),
        });

        let bytes = write_full_container(&signed).unwrap();
        assert_eq!(ids(&bytes).last(), Some(b"dsig"));
        assert_eq!(
            WavHeader::from_bytes(&bytes).unwrap().riff_size as usize,
            bytes.len() - 8
        );

        let unsigned = write_unsigned(&signed).unwrap();
        assert!(!ids(&unsigned).contains(b"dsig"));
        assert_eq!(&bytes[8..unsigned.len()], &unsigned[8..]);
    }

    #[test]
    fn test_playable_copy_skips_deleted_and_follows_order() {
        let mut c = container();
        c.blocks[1] = c.blocks[1].mark_deleted();
        c.blocks[0] = c.blocks[0].with_current_index(2);
        c.blocks[2] = c.blocks[2].with_current_index(0);

        let bytes = write_playable_copy(&c.header, &c.blocks).unwrap();
        assert_eq!(&bytes[44..], &[3, 3, 1, 1, 1, 1]);

        let header = WavHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.data_size, 6);
        assert_eq!(header.riff_size as usize, bytes.len() - 8);
        assert_eq!(ids(&bytes), vec![*b"fmt ", *b"data"]);
    }
}
