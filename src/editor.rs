//! Interactive editing of an opened container
//!
//! An `EditSession` owns the live `EditState` and the growing history. Every
//! forward operation validates its input, derives the next state through the
//! same `apply_entry` used for replay, and appends the entry stamped with the
//! session's editor identity. Nothing is written until `to_container` or
//! `export`.

use thiserror::Error;

use crate::block::Block;
use crate::container::Container;
use crate::crypto::{encrypt_deleted_blocks, CryptoError};
use crate::history::{
    apply_entry, reverse_all, undo_last, EditEntry, EditHistory, EditState, EditorIdentity,
    Inversion, ReverseResult,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EditError {
    #[error("No block with original index {0}")]
    UnknownBlock(u32),

    #[error("Block {0} is already deleted")]
    AlreadyDeleted(u32),

    #[error("Block {0} is not deleted")]
    NotDeleted(u32),

    #[error("Block {0} is encrypted; decrypt the container before restoring it")]
    Encrypted(u32),

    #[error("Position {position} out of range ({visible} visible blocks)")]
    PositionOutOfRange { position: usize, visible: usize },

    #[error("{0} entry does not apply to the current state")]
    NotApplicable(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub struct EditSession {
    editor: EditorIdentity,
    base: Container,
    state: EditState,
    history: EditHistory,
}

impl EditSession {
    /// Start editing `container`. Its existing history is continued.
    pub fn open(container: Container, editor: EditorIdentity) -> Self {
        let state = EditState::new(container.blocks.clone());
        let history = container.edit_history.clone();
        Self {
            editor,
            base: container,
            state,
            history,
        }
    }

    pub fn editor(&self) -> &EditorIdentity {
        &self.editor
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    fn block(&self, original_index: u32) -> Result<&Block, EditError> {
        self.state
            .blocks
            .iter()
            .find(|b| b.original_index == original_index)
            .ok_or(EditError::UnknownBlock(original_index))
    }

    /// Why `entry` did not apply to the live state.
    fn rejection(&self, entry: &EditEntry) -> EditError {
        if let Some((from, to)) = entry.moved_positions() {
            let visible = self.state.visible().len();
            let position = if from >= visible { from } else { to };
            return EditError::PositionOutOfRange { position, visible };
        }
        match entry.block_index() {
            Some(index) if self.state.is_encrypted(index) => EditError::Encrypted(index),
            Some(index) => EditError::UnknownBlock(index),
            None => EditError::NotApplicable(format!("{:?}", entry.change_type)),
        }
    }

    fn record(&mut self, entry: EditEntry) -> Result<(), EditError> {
        let next = apply_entry(&self.state, &entry).ok_or_else(|| self.rejection(&entry))?;
        log::debug!("Applied {:?} {:?}", entry.change_type, entry.details);
        self.state = next;
        self.history.append(entry);
        Ok(())
    }

    pub fn delete_block(&mut self, original_index: u32) -> Result<(), EditError> {
        self.block(original_index)?;
        if self.state.is_deleted(original_index) {
            return Err(EditError::AlreadyDeleted(original_index));
        }
        self.record(EditEntry::delete_block(&self.editor, original_index))
    }

    pub fn restore_block(&mut self, original_index: u32) -> Result<(), EditError> {
        let block = self.block(original_index)?;
        if block.is_encrypted {
            return Err(EditError::Encrypted(original_index));
        }
        if !self.state.is_deleted(original_index) {
            return Err(EditError::NotDeleted(original_index));
        }
        self.record(EditEntry::restore_block(&self.editor, original_index))
    }

    /// Restore every deleted block. Recorded without a block index, so undoing
    /// it is lossy.
    pub fn restore_all(&mut self) -> Result<(), EditError> {
        if let Some(block) = self
            .state
            .blocks
            .iter()
            .find(|b| b.is_encrypted && self.state.is_deleted(b.original_index))
        {
            return Err(EditError::Encrypted(block.original_index));
        }
        self.record(EditEntry::restore_all(&self.editor))
    }

    /// Move the visible block at position `from` to position `to`.
    pub fn move_block(&mut self, from: usize, to: usize) -> Result<(), EditError> {
        let visible = self.state.visible().len();
        if let Some(&position) = [from, to].iter().find(|&&p| p >= visible) {
            return Err(EditError::PositionOutOfRange { position, visible });
        }
        self.record(EditEntry::reorder_block(&self.editor, from, to))
    }

    /// Put every block back at its original position.
    pub fn restore_order(&mut self) -> Result<(), EditError> {
        self.record(EditEntry::restore_order(&self.editor))
    }

    /// Undo the most recent entry. Deletions whose blocks were encrypted by
    /// an earlier export are `Skipped` and stay in the history.
    pub fn undo(&mut self) -> Inversion {
        let result = undo_last(&self.state, &self.history);
        self.state = result.state;
        self.history = result.history;
        result.inversion
    }

    /// The state with every entry inverted, newest first. The session itself
    /// is left untouched.
    pub fn reverse_all(&self) -> ReverseResult {
        reverse_all(&self.state, &self.history)
    }

    /// Blocks with their deletion flags synced to the live deleted set.
    pub fn materialized_blocks(&self) -> Vec<Block> {
        self.state
            .blocks
            .iter()
            .map(|block| {
                match (self.state.is_deleted(block.original_index), block.is_deleted) {
                    (true, false) => block.mark_deleted(),
                    (false, true) => block.unmark_deleted().unwrap_or_else(|| {
                        log::warn!(
                            "Block {} is encrypted and stays deleted",
                            block.original_index
                        );
                        block.clone()
                    }),
                    _ => block.clone(),
                }
            })
            .collect()
    }

    /// The edited container, keeping the original Merkle root. Any signature is
    /// dropped since the bytes have changed.
    pub fn to_container(&self) -> Container {
        Container {
            blocks: self.materialized_blocks(),
            edit_history: self.history.clone(),
            signature: None,
            ..self.base.clone()
        }
    }

    /// `to_container`, with deleted blocks encrypted when a password is given.
    pub fn export(&self, password: Option<&str>) -> Result<Container, EditError> {
        let mut container = self.to_container();
        if let Some(password) = password {
            container.blocks = encrypt_deleted_blocks(&container.blocks, password)?;
        }
        Ok(container)
    }
}
