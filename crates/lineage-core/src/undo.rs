//! Undo/redo engine (C11): a bounded history of reversible edits plus an
//! unsaved-changes counter that drives the save prompt.

use std::collections::VecDeque;

use crate::experiment::Experiment;

const HISTORY_CAPACITY: usize = 50;

/// A reversible edit against an [`Experiment`]. Both directions return a
/// short human-readable description of what happened, suitable for a
/// status bar.
pub trait UndoableAction: std::fmt::Debug {
    fn do_action(&mut self, experiment: &mut Experiment) -> String;
    fn undo_action(&mut self, experiment: &mut Experiment) -> String;
}

pub struct UndoRedo {
    undo_stack: VecDeque<Box<dyn UndoableAction>>,
    redo_stack: VecDeque<Box<dyn UndoableAction>>,
    unsaved_changes: i64,
}

impl Default for UndoRedo {
    fn default() -> Self {
        UndoRedo { undo_stack: VecDeque::new(), redo_stack: VecDeque::new(), unsaved_changes: 0 }
    }
}

impl UndoRedo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Performs `action`, pushes it to the undo history (evicting the
    /// oldest entry past capacity), clears the redo history, and
    /// increments the unsaved-changes counter.
    pub fn do_action(&mut self, experiment: &mut Experiment, mut action: Box<dyn UndoableAction>) -> String {
        let message = action.do_action(experiment);
        self.undo_stack.push_back(action);
        if self.undo_stack.len() > HISTORY_CAPACITY {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
        self.unsaved_changes += 1;
        message
    }

    pub fn undo(&mut self, experiment: &mut Experiment) -> Option<String> {
        let mut action = self.undo_stack.pop_back()?;
        let message = action.undo_action(experiment);
        self.redo_stack.push_back(action);
        if self.redo_stack.len() > HISTORY_CAPACITY {
            self.redo_stack.pop_front();
        }
        self.unsaved_changes -= 1;
        Some(message)
    }

    pub fn redo(&mut self, experiment: &mut Experiment) -> Option<String> {
        let mut action = self.redo_stack.pop_back()?;
        let message = action.do_action(experiment);
        self.undo_stack.push_back(action);
        if self.undo_stack.len() > HISTORY_CAPACITY {
            self.undo_stack.pop_front();
        }
        self.unsaved_changes += 1;
        Some(message)
    }

    /// Zeroes the unsaved-changes counter. Further undos can drive it
    /// negative, at which point [`Self::has_unsaved_changes`] is true
    /// again — there is no way back to a "clean" state except saving
    /// again at the new position in history.
    pub fn mark_saved(&mut self) {
        self.unsaved_changes = 0;
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes != 0
    }

    /// Forces the save prompt on exit regardless of what follows.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.unsaved_changes = i64::MAX / 2;
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }
}
