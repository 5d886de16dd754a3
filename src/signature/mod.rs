//! Detached Ed25519 signatures over whole containers
//!
//! The signature covers the container bytes exactly as written without the
//! `dsig` chunk (RIFF size adjusted). Verifiers strip every `dsig` chunk to
//! recover those bytes, resolve the signer's public key by its id, and check.

pub mod keystore;
pub mod signer;

pub use keystore::{FileKeyStore, MemoryKeyStore, SecureKeyStore};
pub use signer::{ContainerSigner, PublicKeyResolver, StaticKeyResolver};

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::sha256;
use crate::container::chunk::{scan_chunks, Chunk, ChunkKind};
use crate::container::header::{patch_riff_size, WavHeader, RIFF_PREAMBLE_LEN};
use crate::container::{extract_chunk, ContainerError};

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Key not found in secure store: {0}")]
    KeyNotFound(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

/// Contents of the `dsig` chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Hex SHA-256 of the signer's verifying key.
    pub public_key_id: String,
    /// 64-byte Ed25519 signature.
    pub signature: Vec<u8>,
    pub signed_at: DateTime<Utc>,
}

impl SignatureBlock {
    pub fn to_cbor(&self) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, String> {
        ciborium::from_reader(data).map_err(|e| e.to_string())
    }
}

/// Identifier under which a verifying key is published.
pub fn public_key_id(key: &VerifyingKey) -> String {
    hex::encode(sha256(key.as_bytes()))
}

pub fn sign(bytes: &[u8], key: &SigningKey) -> Vec<u8> {
    key.sign(bytes).to_bytes().to_vec()
}

/// `false` for malformed signatures as well as bad ones.
pub fn verify(bytes: &[u8], signature: &[u8], key: &VerifyingKey) -> bool {
    match Signature::from_slice(signature) {
        Ok(signature) => key.verify(bytes, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Remove every `dsig` chunk, keeping all other chunks in order, and restore
/// the RIFF size. On a container written by this crate the result is exactly
/// the byte sequence that was signed.
pub fn strip_signature_chunk(bytes: &[u8]) -> Result<Vec<u8>, ContainerError> {
    WavHeader::from_bytes(bytes)?;
    let signature_id = ChunkKind::Signature.id();

    let mut out = Vec::with_capacity(bytes.len());
    out.extend_from_slice(&bytes[..RIFF_PREAMBLE_LEN]);
    for header in scan_chunks(bytes)? {
        if header.id != signature_id {
            out.extend_from_slice(&bytes[header.offset..header.span_end()]);
        }
    }
    patch_riff_size(&mut out);
    Ok(out)
}

/// Check a container's embedded signature. Unsigned files, unreadable
/// signature chunks, unknown signers and bad signatures all yield `false`.
pub fn verify_container(bytes: &[u8], resolver: &dyn PublicKeyResolver) -> bool {
    let block = match extract_chunk(bytes, ChunkKind::Signature) {
        Ok(Some(Chunk::Signature(block))) => block,
        Ok(_) => {
            log::info!("Container is not signed");
            return false;
        }
        Err(e) => {
            log::warn!("Could not read signature chunk: {}", e);
            return false;
        }
    };

    let unsigned = match strip_signature_chunk(bytes) {
        Ok(unsigned) => unsigned,
        Err(e) => {
            log::warn!("Could not strip signature chunk: {}", e);
            return false;
        }
    };

    let Some(key) = resolver.resolve(&block.public_key_id) else {
        log::warn!("No public key for signer {}", block.public_key_id);
        return false;
    };

    let valid = verify(&unsigned, &block.signature, &key);
    if !valid {
        log::warn!("Signature from {} does not match container", block.public_key_id);
    }
    valid
}
