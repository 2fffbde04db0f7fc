use crate::DocumentState;
use std::collections::VecDeque;

/// Undo/redo stacks of whole document snapshots.
///
/// Snapshots are cheap enough (pages plus overlays, no pixels) that storing
/// them beats computing inverse operations.
#[derive(Debug, Clone)]
pub struct EditHistory {
    undo_stack: VecDeque<DocumentState>,
    redo_stack: Vec<DocumentState>,
    limit: usize,
}

impl EditHistory {
    pub fn new(limit: usize) -> Self {
        Self { undo_stack: VecDeque::new(), redo_stack: Vec::new(), limit: limit.max(1) }
    }

    /// Records the state an edit replaced. Clears the redo stack.
    pub fn record(&mut self, previous: DocumentState) {
        self.undo_stack.push_back(previous);
        while self.undo_stack.len() > self.limit {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Returns the state to restore, pushing `current` onto the redo stack.
    /// The restored state keeps `current`'s id mint.
    pub fn undo(&mut self, current: &DocumentState) -> Option<DocumentState> {
        let previous = self.undo_stack.pop_back()?;
        self.redo_stack.push(current.clone());
        Some(previous.carry_id_mint(current))
    }

    pub fn redo(&mut self, current: &DocumentState) -> Option<DocumentState> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push_back(current.clone());
        Some(next.carry_id_mint(current))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PageTemplate, SourceId, SourceRef};

    #[test]
    fn undo_then_redo_walks_snapshots() {
        let mut history = EditHistory::default();
        let first = DocumentState::load(SourceId(1), 2).expect("load");
        let id = first.page_ids()[0];
        let second = first.rotate_page(id, 90).expect("rotate");

        history.record(first.clone());
        let restored = history.undo(&second).expect("undo available");
        assert_eq!(restored, first);
        assert!(history.can_redo());

        let replayed = history.redo(&restored).expect("redo available");
        assert_eq!(replayed, second);
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_never_rewinds_page_ids() {
        let mut history = EditHistory::default();
        let base = DocumentState::load(SourceId(1), 2).expect("load");
        let extra = || vec![PageTemplate::new(SourceRef::new(SourceId(1), 0))];

        let grown = base.insert_pages(2, extra()).expect("insert");
        let minted = grown.page_ids()[2];
        history.record(base.clone());

        let restored = history.undo(&grown).expect("undo available");
        assert_eq!(restored.page_ids(), base.page_ids());

        let regrown = restored.insert_pages(2, extra()).expect("insert");
        let reminted = regrown.page_ids()[2];
        assert_ne!(reminted, minted);
        assert!(!base.page_ids().contains(&reminted));

        // Redo keeps the newer mint as well.
        history.record(restored);
        let back = history.undo(&regrown).expect("undo available");
        let forward = history.redo(&back).expect("redo available");
        let newest = forward.insert_pages(0, extra()).expect("insert").page_ids()[0];
        assert!(![minted, reminted].contains(&newest));
    }

    #[test]
    fn new_edit_discards_redo_stack() {
        let mut history = EditHistory::default();
        let state = DocumentState::load(SourceId(1), 1).expect("load");

        history.record(state.clone());
        history.undo(&state);
        history.record(state.clone());

        assert!(!history.can_redo());
    }

    #[test]
    fn limit_drops_oldest_snapshots() {
        let mut history = EditHistory::new(2);
        let state = DocumentState::load(SourceId(1), 1).expect("load");

        for _ in 0..5 {
            history.record(state.clone());
        }

        assert_eq!(history.undo_depth(), 2);
    }
}
