//! Recording metadata
//!
//! Device and environment information captured once at recording time and
//! stored in the `meta` chunk. The library only carries this struct; collecting
//! it is the job of a platform-specific `MetadataProvider`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingMetadata {
    pub device_id: String,
    pub device_name: String,
    pub manufacturer: String,
    pub model: String,
    pub brand: String,
    pub product: String,
    pub hardware: String,
    pub os_version: String,
    pub sdk_version: String,
    pub app_version: String,
    pub app_package: String,
    pub locale: String,
    pub timezone: String,
    pub recorded_at: Option<DateTime<Utc>>,
    /// `{width}x{height}@{dpi}dpi`
    pub display_metrics: String,
    pub cpu_abis: Vec<String>,
    pub build_fingerprint: String,
    /// Anything a provider wants to attach that has no dedicated field.
    pub extra: BTreeMap<String, String>,
}

impl RecordingMetadata {
    /// Metadata for a recording made now on an otherwise unknown device.
    pub fn now(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            recorded_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Encode for the `meta` chunk.
    pub fn to_cbor(&self) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, String> {
        ciborium::from_reader(data).map_err(|e| e.to_string())
    }
}

/// Supplies metadata at recording time.
pub trait MetadataProvider {
    fn collect(&self) -> RecordingMetadata;
}

/// Provider for hosts without platform device APIs: a stable generated id,
/// the host name, the OS family and architecture, and the current time.
pub struct HostMetadataProvider {
    device_id: Uuid,
}

impl HostMetadataProvider {
    pub fn new(device_id: Uuid) -> Self {
        Self { device_id }
    }

    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl MetadataProvider for HostMetadataProvider {
    fn collect(&self) -> RecordingMetadata {
        let mut metadata = RecordingMetadata::now(self.device_id.to_string());
        metadata.device_name = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        metadata.os_version = std::env::consts::OS.to_string();
        metadata.cpu_abis = vec![std::env::consts::ARCH.to_string()];
        metadata.app_package = env!("CARGO_PKG_NAME").to_string();
        metadata.app_version = env!("CARGO_PKG_VERSION").to_string();
        metadata
    }
}
