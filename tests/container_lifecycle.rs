//! Container lifecycle integration tests
//!
//! Record -> serialize -> edit -> encrypt -> export -> reparse -> verify ->
//! decrypt, repeated edits of one file across sessions, plus signing and
//! forward-compatible chunk scanning, all through the public API on real byte
//! buffers.
//!
//! Run with:
//!   cargo test --test container_lifecycle

use trustwav::block::DEFAULT_BLOCK_SIZE;
use trustwav::container::{extract_chunk, locate_data_chunk, read_container, Chunk, ChunkKind};
use trustwav::crypto::decrypt_deleted_blocks;
use trustwav::signature::{strip_signature_chunk, MemoryKeyStore, StaticKeyResolver};
use trustwav::{
    verify_container, Container, ContainerConfig, ContainerSigner, EditSession, EditorIdentity,
    Inversion, MerkleStatus, RecordingMetadata,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn editor() -> EditorIdentity {
    EditorIdentity::new("reporter", "pixel-7")
}

fn tone(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 13) % 256) as u8).collect()
}

/// Insert a raw chunk at `at`, fixing up the RIFF size.
fn splice_chunk(bytes: &[u8], at: usize, id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = bytes[..at].to_vec();
    out.extend_from_slice(id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&bytes[at..]);
    let riff = (out.len() - 8) as u32;
    out[4..8].copy_from_slice(&riff.to_le_bytes());
    out
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_silence_delete_encrypt_export_decrypt() {
    let config = ContainerConfig::default();
    let silence = vec![0u8; 3 * DEFAULT_BLOCK_SIZE];

    let container = Container::create(&silence, None, &config).unwrap();
    let r1 = container.merkle_root.unwrap();
    assert_eq!(container.blocks.len(), 3);

    let reparsed = read_container(&container.to_bytes().unwrap(), &config).unwrap();
    assert!(reparsed.verify_merkle_root());

    let mut session = EditSession::open(reparsed, editor());
    session.delete_block(1).unwrap();
    let exported = session.export(Some("secret")).unwrap().to_bytes().unwrap();

    let reopened = read_container(&exported, &config).unwrap();
    assert_eq!(reopened.merkle_root, Some(r1));
    assert!(reopened.blocks[1].is_deleted && reopened.blocks[1].is_encrypted);
    assert!(reopened.verify_merkle_root());
    assert_eq!(reopened.edit_history.len(), 1);

    let decrypted = decrypt_deleted_blocks(&reopened.blocks, "secret").unwrap();
    assert_eq!(decrypted[1].payload.len(), DEFAULT_BLOCK_SIZE);
    assert!(decrypted[1].payload.iter().all(|&b| b == 0));
    assert!(decrypt_deleted_blocks(&reopened.blocks, "not-secret").is_err());
}

#[test]
fn test_reorder_verifies_tamper_does_not() {
    let config = ContainerConfig {
        block_size: 512,
        ..Default::default()
    };
    let container = Container::create(&tone(2000), None, &config).unwrap();

    let mut session = EditSession::open(container.clone(), editor());
    session.move_block(0, 3).unwrap();
    session.move_block(1, 0).unwrap();
    let reordered = read_container(&session.to_container().to_bytes().unwrap(), &config).unwrap();
    assert!(reordered.verify_merkle_root());

    let mut tampered = container;
    let mut payload = tampered.blocks[2].payload.to_vec();
    payload[100] ^= 0x01;
    tampered.blocks[2].payload = payload.into();
    let tampered = read_container(&tampered.to_bytes().unwrap(), &config).unwrap();
    assert_eq!(tampered.merkle_status(), MerkleStatus::Mismatch);
}

#[test]
fn test_playable_copy_is_plain_wav_of_visible_audio() {
    let config = ContainerConfig {
        block_size: 4,
        ..Default::default()
    };
    let pcm = [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
    let mut session = EditSession::open(Container::create(&pcm, None, &config).unwrap(), editor());
    session.delete_block(0).unwrap();
    session.move_block(1, 0).unwrap();

    let wav = session
        .export(Some("pw"))
        .unwrap()
        .playable_bytes()
        .unwrap();
    let (offset, len) = locate_data_chunk(&wav).unwrap();
    assert_eq!(&wav[offset..offset + len], &[3, 3, 3, 3, 2, 2, 2, 2]);
    assert_eq!(wav.len(), offset + len);
}

// ---------------------------------------------------------------------------
// Several editing sessions on one file
// ---------------------------------------------------------------------------

/// Open `bytes`, delete `index`, export with `password` and serialize.
fn delete_in_new_session(
    bytes: &[u8],
    config: &ContainerConfig,
    index: u32,
    password: &str,
) -> Vec<u8> {
    let container = read_container(bytes, config).unwrap();
    let mut session = EditSession::open(container, editor());
    session.delete_block(index).unwrap();
    session.export(Some(password)).unwrap().to_bytes().unwrap()
}

#[test]
fn test_deletions_across_sessions_decrypt_together() {
    let config = ContainerConfig {
        block_size: 400,
        ..Default::default()
    };
    let pcm = tone(2000);
    let created = Container::create(&pcm, None, &config).unwrap();
    let original = created.to_bytes().unwrap();

    for (first, second) in [(1u32, 3u32), (3, 1)] {
        let once = delete_in_new_session(&original, &config, first, "pw");
        let twice = delete_in_new_session(&once, &config, second, "pw");

        let reopened = read_container(&twice, &config).unwrap();
        assert_eq!(reopened.edit_history.len(), 2);
        assert!(reopened.verify_merkle_root());
        assert_eq!(reopened.blocks.iter().filter(|b| b.is_encrypted).count(), 2);

        let decrypted = decrypt_deleted_blocks(&reopened.blocks, "pw").unwrap();
        for index in [first, second] {
            let block = &decrypted[index as usize];
            assert!(block.is_deleted && !block.is_encrypted);
            assert_eq!(block.payload, created.blocks[index as usize].payload);
        }
        assert!(decrypt_deleted_blocks(&reopened.blocks, "other").is_err());
    }
}

#[test]
fn test_second_session_with_other_password_is_refused() {
    let config = ContainerConfig {
        block_size: 400,
        ..Default::default()
    };
    let created = Container::create(&tone(1200), None, &config).unwrap();
    let once = delete_in_new_session(&created.to_bytes().unwrap(), &config, 0, "pw");

    let mut session = EditSession::open(read_container(&once, &config).unwrap(), editor());
    session.delete_block(2).unwrap();
    assert!(session.export(Some("different")).is_err());
}

#[test]
fn test_undo_after_reopening_encrypted_export() {
    let config = ContainerConfig {
        block_size: 400,
        ..Default::default()
    };
    let created = Container::create(&tone(1600), None, &config).unwrap();
    let exported = delete_in_new_session(&created.to_bytes().unwrap(), &config, 2, "pw");

    let mut session = EditSession::open(read_container(&exported, &config).unwrap(), editor());
    assert_eq!(session.undo(), Inversion::Skipped);
    assert_eq!(session.history().len(), 1);
    assert!(session.state().is_deleted(2));
    assert_eq!(session.state().play_order(), vec![0, 1, 3]);

    // Edits after the skipped undo still work and are undoable
    session.move_block(0, 2).unwrap();
    assert_eq!(session.undo(), Inversion::Exact);
    assert_eq!(session.state().play_order(), vec![0, 1, 3]);

    let saved = read_container(&session.to_container().to_bytes().unwrap(), &config).unwrap();
    assert!(saved.blocks[2].is_deleted && saved.blocks[2].is_encrypted);
    assert_eq!(saved.edit_history.len(), 1);
}

// ---------------------------------------------------------------------------
// Signatures and chunk scanning
// ---------------------------------------------------------------------------

#[test]
fn test_signed_container_round_trip() {
    let config = ContainerConfig {
        block_size: 1024,
        ..Default::default()
    };
    let mut store = MemoryKeyStore::new();
    let signer = ContainerSigner::provision(&mut store, &config).unwrap();
    let container = Container::create(
        &tone(5000),
        Some(RecordingMetadata::now("pixel-7")),
        &config,
    )
    .unwrap();

    let (signed, block) = signer.sign_container(&container).unwrap();
    let trusted = StaticKeyResolver::new().with_key(signer.verifying_key());
    assert!(verify_container(&signed, &trusted));

    let parsed = read_container(&signed, &config).unwrap();
    assert_eq!(parsed.signature, Some(block.clone()));
    assert!(parsed.verify_merkle_root());

    // Unsigned bytes never verify, even with the right key
    let unsigned = strip_signature_chunk(&signed).unwrap();
    assert!(!verify_container(&unsigned, &trusted));

    // Editing invalidates the old signature but not the Merkle root
    let mut session = EditSession::open(parsed, editor());
    session.delete_block(2).unwrap();
    let edited = Container {
        signature: Some(block),
        ..session.to_container()
    };
    let edited_bytes = edited.to_bytes().unwrap();
    assert!(!verify_container(&edited_bytes, &trusted));
    assert!(read_container(&edited_bytes, &config)
        .unwrap()
        .verify_merkle_root());
}

#[test]
fn test_unknown_chunk_between_root_and_history() {
    let config = ContainerConfig {
        block_size: 256,
        ..Default::default()
    };
    let mut store = MemoryKeyStore::new();
    let signer = ContainerSigner::provision(&mut store, &config).unwrap();
    let mut container = Container::create(
        &tone(1000),
        Some(RecordingMetadata::now("pixel-7")),
        &config,
    )
    .unwrap();
    container
        .edit_history
        .append(trustwav::EditEntry::delete_block(&editor(), 0));
    let (signed, _) = signer.sign_container(&container).unwrap();

    let (data_offset, data_len) = locate_data_chunk(&signed).unwrap();
    let after_omrh = data_offset + data_len + 8 + 32;
    let spliced = splice_chunk(&signed, after_omrh, b"bext", b"broadcast extension");

    assert!(matches!(
        extract_chunk(&spliced, ChunkKind::EditHistory).unwrap(),
        Some(Chunk::EditHistory(h)) if h == container.edit_history
    ));
    assert!(matches!(
        extract_chunk(&spliced, ChunkKind::Metadata).unwrap(),
        Some(Chunk::Metadata(m)) if Some(&m) == container.metadata.as_ref()
    ));
    assert!(matches!(
        extract_chunk(&spliced, ChunkKind::Signature).unwrap(),
        Some(Chunk::Signature(_))
    ));

    let parsed = read_container(&spliced, &config).unwrap();
    assert_eq!(parsed.unknown_chunks.len(), 1);
    assert!(parsed.verify_merkle_root());
}

#[test]
fn test_plain_wav_never_verifies() {
    let mut wav = b"RIFF".to_vec();
    wav.extend_from_slice(&(36u32 + 8).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&44_100u32.to_le_bytes());
    wav.extend_from_slice(&88_200u32.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&8u32.to_le_bytes());
    wav.extend_from_slice(&[0, 1, 0, 2, 0, 3, 0, 4]);

    let parsed = read_container(&wav, &ContainerConfig::default()).unwrap();
    assert_eq!(parsed.blocks.len(), 1);
    assert!(!parsed.verify_merkle_root());
    assert!(!verify_container(&wav, &StaticKeyResolver::new()));
}
