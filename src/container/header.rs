//! The canonical 44-byte WAV header
//!
//! ```text
//!  0 "RIFF"   4 ChunkSize    8 "WAVE"
//! 12 "fmt "  16 16          20 AudioFormat=1  22 NumChannels
//! 24 SampleRate              28 ByteRate      32 BlockAlign  34 BitsPerSample
//! 36 "data"  40 Subchunk2Size
//! ```

use super::ContainerError;
use crate::config::AudioFormat;

pub const HEADER_LEN: usize = 44;
/// Offset of the first sub-chunk after "RIFF" <size> "WAVE".
pub const RIFF_PREAMBLE_LEN: usize = 12;

const PCM_FORMAT: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavHeader {
    pub format: AudioFormat,
    /// RIFF ChunkSize: file length minus 8.
    pub riff_size: u32,
    /// Length of the `data` chunk payload.
    pub data_size: u32,
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl WavHeader {
    /// Header for a file that holds only a `data` chunk of `data_size` bytes.
    pub fn new(format: AudioFormat, data_size: u32) -> Self {
        Self {
            format,
            riff_size: (HEADER_LEN as u32 - 8).saturating_add(data_size),
            data_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&self.riff_size.to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&PCM_FORMAT.to_le_bytes());
        header[22..24].copy_from_slice(&self.format.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.format.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&self.format.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&self.format.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&self.format.bits_per_sample.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        header
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::NotRiff(format!(
                "{} bytes is shorter than a WAV header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(ContainerError::NotRiff("missing RIFF/WAVE magic".into()));
        }
        if &bytes[12..16] != b"fmt " {
            return Err(ContainerError::NotRiff("first chunk is not 'fmt '".into()));
        }

        Ok(Self {
            format: AudioFormat {
                sample_rate: u32_at(bytes, 24),
                channels: u16_at(bytes, 22),
                bits_per_sample: u16_at(bytes, 34),
            },
            riff_size: u32_at(bytes, 4),
            data_size: u32_at(bytes, 40),
        })
    }
}

/// Rewrite the RIFF ChunkSize field to match the buffer length.
pub fn patch_riff_size(bytes: &mut [u8]) {
    if bytes.len() >= 8 {
        let riff_size = (bytes.len() - 8) as u32;
        bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());
    }
}

/// Rewrite the canonical `data` size field at offset 40.
pub fn patch_data_size(bytes: &mut [u8], data_size: u32) {
    if bytes.len() >= HEADER_LEN {
        bytes[40..44].copy_from_slice(&data_size.to_le_bytes());
    }
}
