//! Secure key storage
//!
//! The recorder keeps its signing key in a platform secure store addressed by
//! string names. `SecureKeyStore` models that store; `FileKeyStore` is a JSON
//! keystore for desktop use and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::SignatureError;

pub trait SecureKeyStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SignatureError>;
    fn put(&mut self, name: &str, value: &[u8]) -> Result<(), SignatureError>;

    fn contains(&self, name: &str) -> Result<bool, SignatureError> {
        Ok(self.get(name)?.is_some())
    }
}

/// Values held in memory, wiped on drop.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SignatureError> {
        Ok(self.entries.get(name).cloned())
    }

    fn put(&mut self, name: &str, value: &[u8]) -> Result<(), SignatureError> {
        self.entries
            .insert(name.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }
}

/// JSON file of `name -> hex value`, rewritten on every `put`.
///
/// Future: back this with the platform keychain instead of a plain file.
pub struct FileKeyStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileKeyStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, SignatureError> {
        let entries = if path.exists() {
            let data =
                std::fs::read(path).map_err(|e| SignatureError::IoError(e.to_string()))?;
            serde_json::from_slice(&data)
                .map_err(|e| SignatureError::DeserializationError(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), SignatureError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SignatureError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| SignatureError::SerializationError(e.to_string()))?;

        std::fs::write(&self.path, json).map_err(|e| SignatureError::IoError(e.to_string()))
    }
}

impl SecureKeyStore for FileKeyStore {
    fn get(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SignatureError> {
        self.entries
            .get(name)
            .map(|value| {
                hex::decode(value)
                    .map(Zeroizing::new)
                    .map_err(|e| SignatureError::InvalidKey(format!("{}: {}", name, e)))
            })
            .transpose()
    }

    fn put(&mut self, name: &str, value: &[u8]) -> Result<(), SignatureError> {
        self.entries.insert(name.to_string(), hex::encode(value));
        self.save()
    }
}
