//! Forward replay, single-step undo and full reversal of edit entries
//!
//! All functions take a state by reference and return a new one. Entries that
//! cannot be parsed or applied leave the state untouched (fail-soft): history
//! details are free-form strings and may come from another app version.
//! Blocks encrypted by an earlier export cannot be brought back this way, so
//! entries that would un-delete them are skipped as well.

use super::{ChangeType, EditEntry, EditHistory, EditState};
use crate::block::Block;

/// How faithfully an entry was inverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inversion {
    /// The prior state was reconstructed exactly.
    Exact,
    /// Best effort: the entry does not carry enough information to rebuild
    /// the prior state (restore-all, restore-order). Play order was reset to
    /// the original order.
    Lossy,
    /// The entry could not be parsed or applied; nothing changed.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UndoResult {
    pub state: EditState,
    pub history: EditHistory,
    pub inversion: Inversion,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverseResult {
    pub state: EditState,
    pub lossy: usize,
    pub skipped: usize,
}

impl ReverseResult {
    pub fn is_exact(&self) -> bool {
        self.lossy == 0 && self.skipped == 0
    }
}

/// Move the visible block at `from` to `to`.
///
/// Positions count only non-deleted blocks in play order. Deleted blocks keep
/// their slots in the full ordering, so moves never disturb them, and every
/// `current_index` is renumbered 0..n afterwards.
pub(crate) fn move_visible(state: &EditState, from: usize, to: usize) -> Option<EditState> {
    let mut full: Vec<&Block> = state.blocks.iter().collect();
    full.sort_by_key(|b| (b.current_index, b.original_index));

    let slots: Vec<usize> = full
        .iter()
        .enumerate()
        .filter(|(_, b)| !state.deleted.contains(&b.original_index))
        .map(|(slot, _)| slot)
        .collect();
    if from >= slots.len() || to >= slots.len() {
        return None;
    }

    let mut visible: Vec<&Block> = slots.iter().map(|&slot| full[slot]).collect();
    let moved = visible.remove(from);
    visible.insert(to, moved);
    for (&slot, block) in slots.iter().zip(visible) {
        full[slot] = block;
    }

    let renumbered = full
        .iter()
        .enumerate()
        .map(|(position, b)| b.with_current_index(position as u32))
        .collect();
    Some(state.with_blocks(renumbered))
}

fn reset_order(state: &EditState) -> EditState {
    let blocks = state
        .blocks
        .iter()
        .map(|b| b.with_current_index(b.original_index))
        .collect();
    state.with_blocks(blocks)
}

fn with_deleted(state: &EditState, original_index: u32, deleted: bool) -> EditState {
    let mut next = state.clone();
    if deleted {
        next.deleted.insert(original_index);
    } else {
        next.deleted.remove(&original_index);
    }
    next
}

/// Apply an entry forward. `None` when it cannot be applied.
pub fn apply_entry(state: &EditState, entry: &EditEntry) -> Option<EditState> {
    match entry.change_type {
        ChangeType::DeleteBlock => {
            let index = entry.block_index().filter(|i| state.contains_block(*i))?;
            Some(with_deleted(state, index, true))
        }
        ChangeType::RestoreBlock => match entry.block_index() {
            Some(index) if state.contains_block(index) && !state.is_encrypted(index) => {
                Some(with_deleted(state, index, false))
            }
            Some(_) => None,
            None => {
                let mut next = state.clone();
                next.deleted.retain(|&i| state.is_encrypted(i));
                Some(next)
            }
        },
        ChangeType::ReorderBlock => {
            let (from, to) = entry.moved_positions()?;
            move_visible(state, from, to)
        }
        ChangeType::RestoreOrder => Some(reset_order(state)),
    }
}

/// Invert a single entry against the current state.
fn invert_entry(state: &EditState, entry: &EditEntry) -> (EditState, Inversion) {
    let inverted = match entry.change_type {
        ChangeType::DeleteBlock => entry
            .block_index()
            .filter(|&i| state.contains_block(i) && !state.is_encrypted(i))
            .map(|i| (with_deleted(state, i, false), Inversion::Exact)),
        ChangeType::RestoreBlock => match entry.block_index() {
            Some(i) if state.contains_block(i) => Some((with_deleted(state, i, true), Inversion::Exact)),
            Some(_) => None,
            // Restore-all cannot be undone without the prior deletion set
            None => Some((reset_order(state), Inversion::Lossy)),
        },
        ChangeType::ReorderBlock => entry
            .moved_positions()
            .and_then(|(from, to)| move_visible(state, to, from))
            .map(|s| (s, Inversion::Exact)),
        ChangeType::RestoreOrder => Some((reset_order(state), Inversion::Lossy)),
    };

    match inverted {
        Some(result) => result,
        None => {
            log::warn!(
                "Cannot invert {:?} entry with details {:?}; leaving state unchanged",
                entry.change_type,
                entry.details
            );
            (state.clone(), Inversion::Skipped)
        }
    }
}

/// Pop the most recent entry and invert only that one.
///
/// When the entry cannot be inverted, the input state and history are returned
/// unchanged.
pub fn undo_last(state: &EditState, history: &EditHistory) -> UndoResult {
    let Some(last) = history.last() else {
        return UndoResult {
            state: state.clone(),
            history: history.clone(),
            inversion: Inversion::Skipped,
        };
    };

    let (next, inversion) = invert_entry(state, last);
    if inversion == Inversion::Skipped {
        return UndoResult {
            state: state.clone(),
            history: history.clone(),
            inversion,
        };
    }
    if inversion == Inversion::Lossy {
        log::warn!("Undo of {:?} is best-effort: prior state not recorded", last.change_type);
    }

    let mut remaining = history.clone();
    remaining.entries.pop();
    UndoResult {
        state: next,
        history: remaining,
        inversion,
    }
}

/// Invert every entry newest-first without touching the history itself.
pub fn reverse_all(state: &EditState, history: &EditHistory) -> ReverseResult {
    let mut current = state.clone();
    let mut lossy = 0;
    let mut skipped = 0;

    for entry in history.entries().iter().rev() {
        let (next, inversion) = invert_entry(&current, entry);
        match inversion {
            Inversion::Exact => {}
            Inversion::Lossy => lossy += 1,
            Inversion::Skipped => skipped += 1,
        }
        current = next;
    }

    log::debug!(
        "Reversed {} entries ({} lossy, {} skipped)",
        history.len(),
        lossy,
        skipped
    );
    ReverseResult {
        state: current,
        lossy,
        skipped,
    }
}

/// Rebuild the live state from the original segmentation by applying every
/// entry in order. Entries that do not apply are skipped.
pub fn replay_to_state(original_blocks: &[Block], entries: &[EditEntry]) -> EditState {
    let mut state = EditState::new(original_blocks.to_vec());
    for entry in entries {
        match apply_entry(&state, entry) {
            Some(next) => state = next,
            None => log::warn!("Skipping unreplayable {:?} entry", entry.change_type),
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::segment;
    use crate::history::{EditorIdentity, DETAIL_MOVED_BLOCK};

    fn editor() -> EditorIdentity {
        EditorIdentity::new("tester", "device")
    }

    fn original(count: usize) -> EditState {
        let pcm: Vec<u8> = (0..count * 10).map(|i| i as u8).collect();
        EditState::new(segment(&pcm, 10).unwrap())
    }

    /// Apply entries forward, recording them in history.
    fn edit(state: &EditState, entries: Vec<EditEntry>) -> (EditState, EditHistory) {
        let mut history = EditHistory::new();
        let mut current = state.clone();
        for entry in entries {
            current = apply_entry(&current, &entry).unwrap();
            history.append(entry);
        }
        (current, history)
    }

    #[test]
    fn test_move_visible_keeps_deleted_slots() {
        let start = original(5);
        let deleted = apply_entry(&start, &EditEntry::delete_block(&editor(), 2)).unwrap();
        let moved = move_visible(&deleted, 0, 3).unwrap();

        assert_eq!(moved.play_order(), vec![1, 3, 4, 0]);
        // Block 2 stays in its slot of the full ordering
        let b2 = moved.blocks.iter().find(|b| b.original_index == 2).unwrap();
        assert_eq!(b2.current_index, 2);
    }

    #[test]
    fn test_move_out_of_range() {
        assert!(move_visible(&original(3), 0, 3).is_none());
        assert!(move_visible(&original(3), 5, 0).is_none());
    }

    #[test]
    fn test_undo_inverts_exactly_one_step() {
        let start = original(5);
        let (edited, history) = edit(
            &start,
            vec![
                EditEntry::delete_block(&editor(), 2),
                EditEntry::reorder_block(&editor(), 0, 3),
            ],
        );
        assert_eq!(edited.play_order(), vec![1, 3, 4, 0]);

        let first = undo_last(&edited, &history);
        assert_eq!(first.inversion, Inversion::Exact);
        assert_eq!(first.history.len(), 1);
        assert!(first.state.is_deleted(2));
        assert_eq!(first.state.play_order(), vec![0, 1, 3, 4]);

        let second = undo_last(&first.state, &first.history);
        assert_eq!(second.inversion, Inversion::Exact);
        assert!(second.history.is_empty());
        assert_eq!(second.state, start);
    }

    #[test]
    fn test_undo_on_empty_history() {
        let start = original(2);
        let result = undo_last(&start, &EditHistory::new());
        assert_eq!(result.inversion, Inversion::Skipped);
        assert_eq!(result.state, start);
    }

    #[test]
    fn test_undo_unparsable_entry_is_noop() {
        let start = original(3);
        let mut history = EditHistory::new();
        history.append(
            EditEntry::new(ChangeType::ReorderBlock, &editor())
                .with_detail(DETAIL_MOVED_BLOCK, "sideways"),
        );

        let result = undo_last(&start, &history);
        assert_eq!(result.inversion, Inversion::Skipped);
        assert_eq!(result.state, start);
        assert_eq!(result.history, history);
    }

    #[test]
    fn test_undo_out_of_range_reorder_is_noop() {
        let start = original(3);
        let mut history = EditHistory::new();
        history.append(EditEntry::reorder_block(&editor(), 0, 9));

        let result = undo_last(&start, &history);
        assert_eq!(result.inversion, Inversion::Skipped);
        assert_eq!(result.history.len(), 1);
    }

    #[test]
    fn test_undo_restore_order_is_lossy() {
        let start = original(4);
        let (edited, history) = edit(
            &start,
            vec![
                EditEntry::reorder_block(&editor(), 3, 0),
                EditEntry::restore_order(&editor()),
            ],
        );
        assert_eq!(edited.play_order(), vec![0, 1, 2, 3]);

        let result = undo_last(&edited, &history);
        assert_eq!(result.inversion, Inversion::Lossy);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.state.play_order(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_undo_restore_block_redeletes() {
        let start = original(4);
        let (edited, history) = edit(
            &start,
            vec![
                EditEntry::delete_block(&editor(), 1),
                EditEntry::restore_block(&editor(), 1),
            ],
        );
        assert!(!edited.is_deleted(1));

        let result = undo_last(&edited, &history);
        assert_eq!(result.inversion, Inversion::Exact);
        assert!(result.state.is_deleted(1));
    }

    /// State as reopened from an export that encrypted `index`.
    fn with_encrypted(state: &EditState, index: u32) -> EditState {
        let blocks = state
            .blocks
            .iter()
            .map(|b| {
                if b.original_index == index {
                    Block {
                        is_encrypted: true,
                        ..b.mark_deleted()
                    }
                } else {
                    b.clone()
                }
            })
            .collect();
        EditState::new(blocks)
    }

    #[test]
    fn test_undo_delete_of_encrypted_block_is_skipped() {
        let (_, history) = edit(&original(4), vec![EditEntry::delete_block(&editor(), 2)]);
        let reopened = with_encrypted(&original(4), 2);

        let result = undo_last(&reopened, &history);
        assert_eq!(result.inversion, Inversion::Skipped);
        assert_eq!(result.state, reopened);
        assert_eq!(result.history, history);
        assert!(result.state.is_deleted(2));

        let reversed = reverse_all(&reopened, &history);
        assert_eq!(reversed.skipped, 1);
        assert!(reversed.state.is_deleted(2));
    }

    #[test]
    fn test_restore_skips_encrypted_blocks() {
        let mut reopened = with_encrypted(&original(4), 2);
        reopened.deleted.insert(0);

        assert!(apply_entry(&reopened, &EditEntry::restore_block(&editor(), 2)).is_none());
        let restored = apply_entry(&reopened, &EditEntry::restore_all(&editor())).unwrap();
        assert_eq!(restored.deleted.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_reverse_all_reaches_original() {
        let start = original(6);
        let (edited, history) = edit(
            &start,
            vec![
                EditEntry::delete_block(&editor(), 4),
                EditEntry::reorder_block(&editor(), 0, 4),
                EditEntry::delete_block(&editor(), 1),
                EditEntry::reorder_block(&editor(), 3, 0),
                EditEntry::reorder_block(&editor(), 1, 2),
            ],
        );
        assert_ne!(edited, start);

        let reversed = reverse_all(&edited, &history);
        assert!(reversed.is_exact());
        assert_eq!(reversed.state, start);
        // History stays intact as an audit trail
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn test_reverse_all_counts_lossy_and_skipped() {
        let start = original(3);
        let mut history = EditHistory::new();
        history.append(EditEntry::restore_all(&editor()));
        history.append(EditEntry::new(ChangeType::DeleteBlock, &editor()));

        let reversed = reverse_all(&start, &history);
        assert_eq!(reversed.lossy, 1);
        assert_eq!(reversed.skipped, 1);
        assert!(!reversed.is_exact());
    }

    #[test]
    fn test_replay_matches_live_edits() {
        let start = original(5);
        let entries = vec![
            EditEntry::delete_block(&editor(), 0),
            EditEntry::reorder_block(&editor(), 2, 0),
            EditEntry::restore_block(&editor(), 0),
            EditEntry::delete_block(&editor(), 3),
        ];
        let (live, history) = edit(&start, entries);

        let replayed = replay_to_state(&start.blocks, history.entries());
        assert_eq!(replayed, live);
    }

    #[test]
    fn test_replay_skips_bad_entries() {
        let start = original(2);
        let entries = vec![
            EditEntry::delete_block(&editor(), 7),
            EditEntry::delete_block(&editor(), 1),
        ];
        let replayed = replay_to_state(&start.blocks, &entries);
        assert_eq!(replayed.deleted.iter().copied().collect::<Vec<_>>(), vec![1]);
    }
}
