//! trustwav - create, inspect, verify and edit tamper-evident audio containers
//!
//! ```bash
//! # Wrap a WAV (or raw 16-bit mono PCM) into a signed container
//! trustwav create take1.wav take1.twav --keystore ~/.trustwav/keys.json
//!
//! # Check the Merkle root and signature
//! trustwav verify take1.twav --keystore ~/.trustwav/keys.json
//!
//! # Delete block 3, encrypting its audio
//! trustwav delete take1.twav 3 --password hunter2
//!
//! # Write a plain WAV of what a listener would hear
//! trustwav playable take1.twav take1-listen.wav
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::VerifyingKey;

use trustwav::container::{describe_chunks, locate_data_chunk};
use trustwav::crypto::decrypt_deleted_blocks;
use trustwav::metadata::HostMetadataProvider;
use trustwav::signature::{FileKeyStore, StaticKeyResolver};
use trustwav::{
    verify_container, Container, ContainerConfig, ContainerSigner, EditSession, EditorIdentity,
    MetadataProvider,
};

#[derive(Parser, Debug)]
#[command(name = "trustwav")]
#[command(about = "Tamper-evident, editable audio containers", long_about = None)]
struct Cli {
    /// JSON container configuration (block size, audio format, key names)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment audio into a new container
    Create {
        /// WAV file or raw PCM
        input: PathBuf,
        output: PathBuf,
        /// Sign with the key in this keystore, provisioning one if needed
        #[arg(long, value_name = "FILE")]
        keystore: Option<PathBuf>,
    },
    /// Print the chunk layout, blocks and edit history
    Inspect { file: PathBuf },
    /// Check the Merkle root and, if present, the signature
    Verify {
        file: PathBuf,
        /// Trust the signing key held in this keystore
        #[arg(long, value_name = "FILE")]
        keystore: Option<PathBuf>,
        /// Trust a hex-encoded Ed25519 public key (repeatable)
        #[arg(long, value_name = "HEX")]
        trust: Vec<String>,
    },
    /// Delete a block by original index and encrypt it
    Delete {
        file: PathBuf,
        index: u32,
        #[arg(long)]
        password: String,
        /// Defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(long, default_value = "trustwav-cli")]
        device: String,
    },
    /// Decrypt deleted blocks in place
    Decrypt {
        file: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a plain WAV of the visible blocks in play order
    Playable { file: PathBuf, output: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ContainerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ContainerConfig::default(),
    };

    match cli.command {
        Command::Create {
            input,
            output,
            keystore,
        } => create(&config, &input, &output, keystore.as_deref()),
        Command::Inspect { file } => inspect(&config, &file),
        Command::Verify {
            file,
            keystore,
            trust,
        } => verify(&config, &file, keystore.as_deref(), &trust),
        Command::Delete {
            file,
            index,
            password,
            output,
            user,
            device,
        } => {
            let container = load(&config, &file)?;
            let mut session = EditSession::open(container, EditorIdentity::new(user, device));
            session.delete_block(index)?;
            let exported = session.export(Some(&password))?;
            let target = output.unwrap_or(file);
            exported.save(&target)?;
            println!("Deleted block {} -> {}", index, target.display());
            Ok(())
        }
        Command::Decrypt {
            file,
            password,
            output,
        } => {
            let mut container = load(&config, &file)?;
            container.blocks = decrypt_deleted_blocks(&container.blocks, &password)?;
            container.signature = None;
            let target = output.unwrap_or(file);
            container.save(&target)?;
            println!("Decrypted -> {}", target.display());
            Ok(())
        }
        Command::Playable { file, output } => {
            let container = load(&config, &file)?;
            std::fs::write(&output, container.playable_bytes()?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "Wrote {} visible blocks to {}",
                container.visible_blocks().len(),
                output.display()
            );
            Ok(())
        }
    }
}

fn load(config: &ContainerConfig, path: &Path) -> Result<Container> {
    Container::load(path, config).with_context(|| format!("reading {}", path.display()))
}

fn create(
    config: &ContainerConfig,
    input: &Path,
    output: &Path,
    keystore: Option<&Path>,
) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let pcm = if bytes.starts_with(b"RIFF") {
        let (offset, len) = locate_data_chunk(&bytes)?;
        &bytes[offset..offset + len]
    } else {
        &bytes[..]
    };

    let metadata = HostMetadataProvider::generate().collect();
    let container = Container::create(pcm, Some(metadata), config)?;

    let written = match keystore {
        Some(path) => {
            let mut store = FileKeyStore::open(path)?;
            let signer = ContainerSigner::provision(&mut store, config)?;
            let (bytes, block) = signer.sign_container(&container)?;
            println!("Signed as {}", block.public_key_id);
            bytes
        }
        None => container.to_bytes()?,
    };
    std::fs::write(output, written).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Created {} with {} blocks",
        output.display(),
        container.blocks.len()
    );
    Ok(())
}

fn inspect(config: &ContainerConfig, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    println!("Chunks:");
    for line in describe_chunks(&bytes)? {
        println!("  {}", line);
    }

    let container = Container::from_bytes(&bytes, config)?;
    println!("Decoding: {:?}", container.decoding);
    println!(
        "Merkle root: {}",
        container
            .merkle_root
            .map(hex::encode)
            .unwrap_or_else(|| "(none)".to_string())
    );

    println!("Blocks:");
    for block in &container.blocks {
        println!(
            "  #{:<4} pos {:<4} {:>8} bytes{}{}",
            block.original_index,
            block.current_index,
            block.payload.len(),
            if block.is_deleted { "  deleted" } else { "" },
            if block.is_encrypted { " (encrypted)" } else { "" },
        );
    }

    println!("History ({} entries):", container.edit_history.len());
    for entry in container.edit_history.entries() {
        println!(
            "  {} {:?} by {}@{} {:?}",
            entry.timestamp.to_rfc3339(),
            entry.change_type,
            entry.user_id,
            entry.device_id,
            entry.details
        );
    }

    if let Some(metadata) = &container.metadata {
        println!("Recorded by device {} ({})", metadata.device_id, metadata.os_version);
    }
    match &container.signature {
        Some(signature) => println!(
            "Signed by {} at {}",
            signature.public_key_id,
            signature.signed_at.to_rfc3339()
        ),
        None => println!("Unsigned"),
    }
    Ok(())
}

fn verify(
    config: &ContainerConfig,
    file: &Path,
    keystore: Option<&Path>,
    trust: &[String],
) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let container = Container::from_bytes(&bytes, config)?;

    let mut resolver = StaticKeyResolver::new();
    if let Some(path) = keystore {
        let store = FileKeyStore::open(path)?;
        resolver.insert(ContainerSigner::from_store(&store, config)?.verifying_key());
    }
    for key in trust {
        resolver.insert(parse_public_key(key)?);
    }

    let root_ok = container.verify_merkle_root();
    println!("Merkle root: {:?}", container.merkle_status());

    let signature_ok = match &container.signature {
        Some(_) => {
            let valid = verify_container(&bytes, &resolver);
            println!("Signature: {}", if valid { "valid" } else { "INVALID" });
            valid
        }
        None => {
            println!("Signature: none");
            true
        }
    };

    if !(root_ok && signature_ok) {
        bail!("{} failed verification", file.display());
    }
    Ok(())
}

fn parse_public_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(hex_key)
        .context("public key is not hex")?
        .try_into()
        .map_err(|_| anyhow::anyhow!("public key must be 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).context("invalid Ed25519 public key")
}
