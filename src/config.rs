//! Container configuration
//!
//! Block size, audio format and secure-store key names used when creating and
//! reading containers. Defaults match mono 16-bit 44.1 kHz recordings cut into
//! 100 KB blocks (roughly 1.16 seconds each).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::DEFAULT_BLOCK_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// PCM format written into the WAV header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn mono_16bit(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono_16bit(44_100)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Size of each block produced by segmentation, in bytes.
    pub block_size: usize,
    pub audio: AudioFormat,
    /// Secure-store key holding the Ed25519 signing key.
    pub signing_key_name: String,
    /// Secure-store key holding the public key identifier.
    pub public_key_id_name: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            audio: AudioFormat::default(),
            signing_key_name: "private_key".to_string(),
            public_key_id_name: "public_key_id".to_string(),
        }
    }
}

impl ContainerConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: ContainerConfig = serde_json::from_slice(&data)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be non-zero".into()));
        }
        if self.block_size > u32::MAX as usize {
            return Err(ConfigError::Invalid("block_size exceeds u32 range".into()));
        }
        if self.audio.bits_per_sample == 0 || self.audio.bits_per_sample % 8 != 0 {
            return Err(ConfigError::Invalid(format!(
                "unsupported bits_per_sample {}",
                self.audio.bits_per_sample
            )));
        }
        if self.audio.channels == 0 || self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("empty audio format".into()));
        }
        Ok(())
    }
}
