//! Password-based encryption of deleted blocks
//!
//! Deleted audio stays in the container so the edit can be reversed, but its
//! payload is replaced by ciphertext before export. Blocks are processed in
//! ascending `original_index` and chained: each plaintext is XORed with a
//! running value (initially `SHA256(password)`, then `SHA256` of the previous
//! ciphertext) before AES-256-GCM encryption, so the encrypted sequence cannot
//! be reordered or partially swapped without detection.
//!
//! The chain always spans every deleted block. Blocks encrypted by an earlier
//! export are decrypted and the whole set is encrypted again, so containers
//! edited over several sessions still decrypt in one pass. This requires the
//! same password for every export.
//!
//! The key is `SHA256(password)` with no salt or KDF iterations. This matches
//! containers produced by earlier recorders; changing it needs a new format
//! version.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::block::{sha256, Block, BlockHash};

const NONCE_LEN: usize = 12;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Decryption failed for block {original_index}")]
    DecryptionFailed { original_index: u32 },

    #[error("Encryption failed for block {original_index}: {reason}")]
    EncryptionFailed { original_index: u32, reason: String },

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

/// `SHA256(password)`, used directly as the AES-256 key.
pub fn derive_key(password: &str) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(sha256(password.as_bytes()))
}

fn xor_with(data: &[u8], chain: &BlockHash) -> Vec<u8> {
    data.iter()
        .zip(chain.iter().cycle())
        .map(|(byte, key)| byte ^ key)
        .collect()
}

/// Positions of `blocks` in ascending `original_index` order.
fn chain_order(blocks: &[Block]) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..blocks.len()).collect();
    positions.sort_by_key(|&p| blocks[p].original_index);
    positions
}

fn cipher_for(key: &[u8; 32]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::CryptoError(e.to_string()))
}

/// Encrypt every deleted block as one chain. Other blocks pass through and
/// the output keeps the input order.
///
/// Already encrypted blocks must decrypt under `password`; otherwise the call
/// fails with `DecryptionFailed` and nothing is re-encrypted.
pub fn encrypt_deleted_blocks(blocks: &[Block], password: &str) -> Result<Vec<Block>, CryptoError> {
    let plain = decrypt_deleted_blocks(blocks, password)?;
    let rechained = blocks.iter().filter(|b| b.is_deleted && b.is_encrypted).count();

    let key = derive_key(password);
    let cipher = cipher_for(&key)?;
    let mut chain: BlockHash = *key;
    let mut out = plain.clone();
    let mut encrypted = 0usize;

    for position in chain_order(&plain) {
        let block = &plain[position];
        if !block.is_deleted {
            continue;
        }

        let undeleted_hash = sha256(&block.payload);
        let chained = xor_with(&block.payload, &chain);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&chain[..NONCE_LEN]), chained.as_slice())
            .map_err(|e| CryptoError::EncryptionFailed {
                original_index: block.original_index,
                reason: e.to_string(),
            })?;
        chain = sha256(&ciphertext);

        out[position] = Block {
            is_encrypted: true,
            payload: ciphertext.into(),
            undeleted_hash: Some(undeleted_hash),
            ..block.clone()
        };
        encrypted += 1;
    }

    log::debug!(
        "Encrypted {} deleted blocks ({} re-chained)",
        encrypted,
        rechained
    );
    Ok(out)
}

/// Decrypt every encrypted deleted block, all or nothing.
///
/// Any authentication failure or plaintext hash mismatch aborts the whole
/// batch; no partially decrypted blocks are returned. Decrypted blocks remain
/// deleted, with their plaintext payload restored.
pub fn decrypt_deleted_blocks(blocks: &[Block], password: &str) -> Result<Vec<Block>, CryptoError> {
    let key = derive_key(password);
    let cipher = cipher_for(&key)?;
    let mut chain: BlockHash = *key;
    let mut out = blocks.to_vec();

    for position in chain_order(blocks) {
        let block = &blocks[position];
        if !block.is_deleted || !block.is_encrypted {
            continue;
        }

        let failed = CryptoError::DecryptionFailed {
            original_index: block.original_index,
        };
        let expected = block.undeleted_hash.ok_or_else(|| failed.clone())?;
        let chained = cipher
            .decrypt(Nonce::from_slice(&chain[..NONCE_LEN]), &block.payload[..])
            .map_err(|_| failed.clone())?;
        let plaintext = xor_with(&chained, &chain);
        if sha256(&plaintext) != expected {
            log::warn!(
                "Decrypted block {} does not match its undeleted_hash",
                block.original_index
            );
            return Err(failed);
        }
        chain = sha256(&block.payload);

        out[position] = Block {
            is_encrypted: false,
            payload: plaintext.into(),
            ..block.clone()
        };
    }

    Ok(out)
}
