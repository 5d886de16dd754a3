//! Append-only edit history
//!
//! Every user edit is recorded as an `EditEntry`. Entries are records of what
//! the user did, with free-form string details, so they are never validated on
//! append. `inversion` turns them back into state changes for undo, full
//! reversal and forward replay.

pub mod inversion;

pub use inversion::{
    apply_entry, replay_to_state, reverse_all, undo_last, Inversion, ReverseResult, UndoResult,
};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::Block;

pub const DETAIL_BLOCK_INDEX: &str = "blockIndex";
pub const DETAIL_MOVED_BLOCK: &str = "Moved Block";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    DeleteBlock,
    RestoreBlock,
    ReorderBlock,
    RestoreOrder,
}

/// Who performs edits in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorIdentity {
    pub user_id: String,
    pub device_id: String,
}

impl EditorIdentity {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
        }
    }
}

/// One recorded change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditEntry {
    pub change_type: ChangeType,
    pub user_id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl EditEntry {
    pub fn new(change_type: ChangeType, editor: &EditorIdentity) -> Self {
        Self {
            change_type,
            user_id: editor.user_id.clone(),
            device_id: editor.device_id.clone(),
            timestamp: Utc::now(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn delete_block(editor: &EditorIdentity, original_index: u32) -> Self {
        Self::new(ChangeType::DeleteBlock, editor)
            .with_detail(DETAIL_BLOCK_INDEX, original_index.to_string())
    }

    pub fn restore_block(editor: &EditorIdentity, original_index: u32) -> Self {
        Self::new(ChangeType::RestoreBlock, editor)
            .with_detail(DETAIL_BLOCK_INDEX, original_index.to_string())
    }

    /// Restore every deleted block at once.
    pub fn restore_all(editor: &EditorIdentity) -> Self {
        Self::new(ChangeType::RestoreBlock, editor)
    }

    /// Positions are in the visible (non-deleted) sequence.
    pub fn reorder_block(editor: &EditorIdentity, from: usize, to: usize) -> Self {
        Self::new(ChangeType::ReorderBlock, editor)
            .with_detail(DETAIL_MOVED_BLOCK, format!("from {} to {}", from, to))
    }

    pub fn restore_order(editor: &EditorIdentity) -> Self {
        Self::new(ChangeType::RestoreOrder, editor)
    }

    pub fn block_index(&self) -> Option<u32> {
        self.details.get(DETAIL_BLOCK_INDEX)?.trim().parse().ok()
    }

    /// Parse a `"from X to Y"` move detail.
    pub fn moved_positions(&self) -> Option<(usize, usize)> {
        let moved = self.details.get(DETAIL_MOVED_BLOCK)?;
        let rest = &moved[moved.find("from ")? + "from ".len()..];
        let (from, to) = rest.split_once(" to ")?;
        let to: String = to.chars().take_while(|c| c.is_ascii_digit()).collect();
        Some((from.trim().parse().ok()?, to.parse().ok()?))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistory {
    pub entries: Vec<EditEntry>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: EditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[EditEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&EditEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode for the `edhi` chunk.
    pub fn to_cbor(&self) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| e.to_string())?;
        Ok(buf)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, String> {
        ciborium::from_reader(data).map_err(|e| e.to_string())
    }
}

/// Live editing state: the blocks (kept in `original_index` order) plus the
/// set of original indices currently deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditState {
    pub blocks: Vec<Block>,
    pub deleted: BTreeSet<u32>,
}

impl EditState {
    /// Build from blocks as read from a container; flagged blocks seed the
    /// deleted set.
    pub fn new(mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.original_index);
        let deleted = blocks
            .iter()
            .filter(|b| b.is_deleted)
            .map(|b| b.original_index)
            .collect();
        Self { blocks, deleted }
    }

    pub(crate) fn with_blocks(&self, mut blocks: Vec<Block>) -> Self {
        blocks.sort_by_key(|b| b.original_index);
        Self {
            blocks,
            deleted: self.deleted.clone(),
        }
    }

    pub fn contains_block(&self, original_index: u32) -> bool {
        self.blocks.iter().any(|b| b.original_index == original_index)
    }

    pub fn is_deleted(&self, original_index: u32) -> bool {
        self.deleted.contains(&original_index)
    }

    /// Whether the block's payload is ciphertext from an earlier export.
    pub fn is_encrypted(&self, original_index: u32) -> bool {
        self.blocks
            .iter()
            .any(|b| b.original_index == original_index && b.is_encrypted)
    }

    /// Non-deleted blocks in play order.
    pub fn visible(&self) -> Vec<&Block> {
        let mut visible: Vec<&Block> = self
            .blocks
            .iter()
            .filter(|b| !self.deleted.contains(&b.original_index))
            .collect();
        visible.sort_by_key(|b| (b.current_index, b.original_index));
        visible
    }

    /// Original indices of the visible blocks in play order.
    pub fn play_order(&self) -> Vec<u32> {
        self.visible().iter().map(|b| b.original_index).collect()
    }
}
