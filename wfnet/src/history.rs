use std::collections::VecDeque;

use tracing::trace;

use crate::net::Net;

/// Undo/redo stacks of whole-net snapshots.
pub struct UndoHistory {
    undo: VecDeque<Net>,
    redo: Vec<Net>,
    depth: usize,
}

impl UndoHistory {
    pub fn new(depth: usize) -> Self {
        UndoHistory { undo: VecDeque::new(), redo: Vec::new(), depth }
    }

    /// Remember the state before an edit. Drops the oldest snapshot beyond the configured depth
    /// and invalidates everything that could be redone.
    pub fn record(&mut self, snapshot: Net) {
        self.redo.clear();
        if self.depth == 0 {
            return;
        }
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Restore the previous snapshot into `net`. Returns false if there is nothing to undo.
    pub fn undo(&mut self, net: &mut Net) -> bool {
        let Some(previous) = self.undo.pop_back() else { return false };
        let current = net.replace_with(previous);
        self.redo.push(current);
        trace!(undo = self.undo.len(), redo = self.redo.len(), "Undo.");
        true
    }

    /// Re-apply the last undone snapshot. Returns false if there is nothing to redo.
    pub fn redo(&mut self, net: &mut Net) -> bool {
        let Some(next) = self.redo.pop() else { return false };
        let current = net.replace_with(next);
        self.undo.push_back(current);
        trace!(undo = self.undo.len(), redo = self.redo.len(), "Redo.");
        true
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
