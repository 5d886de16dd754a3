use std::collections::HashMap;

use chrono::Utc;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use super::{public_key_id, sign, SecureKeyStore, SignatureBlock, SignatureError};
use crate::config::ContainerConfig;
use crate::container::{write_full_container, write_unsigned, Container};

/// Looks up a signer's verifying key by its published id.
pub trait PublicKeyResolver {
    fn resolve(&self, public_key_id: &str) -> Option<VerifyingKey>;
}

/// Fixed set of trusted keys held in memory.
#[derive(Default, Clone)]
pub struct StaticKeyResolver {
    keys: HashMap<String, VerifyingKey>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `key`; returns its id.
    pub fn insert(&mut self, key: VerifyingKey) -> String {
        let id = public_key_id(&key);
        self.keys.insert(id.clone(), key);
        id
    }

    pub fn with_key(mut self, key: VerifyingKey) -> Self {
        self.insert(key);
        self
    }
}

impl PublicKeyResolver for StaticKeyResolver {
    fn resolve(&self, public_key_id: &str) -> Option<VerifyingKey> {
        self.keys.get(public_key_id).copied()
    }
}

/// The device's container signing key.
pub struct ContainerSigner {
    signing_key: SigningKey,
    public_key_id: String,
}

impl ContainerSigner {
    /// Load the signing key from `store`, generating and storing a fresh one
    /// (and its public key id) first if none exists.
    pub fn provision(
        store: &mut dyn SecureKeyStore,
        config: &ContainerConfig,
    ) -> Result<Self, SignatureError> {
        if store.contains(&config.signing_key_name)? {
            return Self::from_store(store, config);
        }

        let signing_key = SigningKey::generate(&mut OsRng);
        let id = public_key_id(&signing_key.verifying_key());
        store.put(&config.signing_key_name, signing_key.as_bytes())?;
        store.put(&config.public_key_id_name, id.as_bytes())?;
        log::info!("Provisioned new signing key {}", id);

        Ok(Self {
            signing_key,
            public_key_id: id,
        })
    }

    pub fn from_store(
        store: &dyn SecureKeyStore,
        config: &ContainerConfig,
    ) -> Result<Self, SignatureError> {
        let secret = store
            .get(&config.signing_key_name)?
            .ok_or_else(|| SignatureError::KeyNotFound(config.signing_key_name.clone()))?;
        let bytes: [u8; 32] = secret.as_slice().try_into().map_err(|_| {
            SignatureError::InvalidKey(format!(
                "signing key must be 32 bytes, found {}",
                secret.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let id = public_key_id(&signing_key.verifying_key());

        if let Some(stored) = store.get(&config.public_key_id_name)? {
            if stored.as_slice() != id.as_bytes() {
                log::warn!("Stored public key id does not match signing key; using {}", id);
            }
        }

        Ok(Self {
            signing_key,
            public_key_id: id,
        })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key_id(&self) -> &str {
        &self.public_key_id
    }

    /// Sign the container's unsigned bytes. Returns the full signed file and
    /// the signature block embedded in it. Any existing signature is replaced.
    pub fn sign_container(
        &self,
        container: &Container,
    ) -> Result<(Vec<u8>, SignatureBlock), SignatureError> {
        let unsigned = write_unsigned(container)?;
        let block = SignatureBlock {
            public_key_id: self.public_key_id.clone(),
            signature: sign(&unsigned, &self.signing_key),
            signed_at: Utc::now(),
        };

        let signed = Container {
            signature: Some(block.clone()),
            ..container.clone()
        };
        let bytes = write_full_container(&signed)?;
        log::debug!("Signed container ({} bytes) as {}", unsigned.len(), block.public_key_id);
        Ok((bytes, block))
    }
}
