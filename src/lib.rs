// Trustwav - Tamper-evident, editable audio containers

pub mod block;
pub mod config;
pub mod container;
pub mod crypto;
pub mod editor;
pub mod history;
pub mod merkle;
pub mod metadata;
pub mod signature;

pub use block::{Block, BlockHash};
pub use config::{AudioFormat, ContainerConfig};
pub use container::{Container, ContainerError};
pub use editor::{EditError, EditSession};
pub use history::{EditEntry, EditHistory, EditState, EditorIdentity, Inversion};
pub use merkle::MerkleStatus;
pub use metadata::{MetadataProvider, RecordingMetadata};
pub use signature::{verify_container, ContainerSigner, SignatureBlock};
