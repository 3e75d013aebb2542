//! Undo/redo history of user actions.

use std::collections::VecDeque;
use std::fmt;

use ferry_core::{FileSystem, TransferItem};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::error::PoolError;
use crate::pool::Submission;

/// The kind of a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MoveBatch,
    CopyBatch,
    CreateItem,
    RenameItem,
}

/// What an action may use while being undone or redone.
pub trait HistoryContext {
    /// The filesystem collaborator.
    fn fs(&self) -> &dyn FileSystem;

    /// Start a transfer that is not recorded as a new action.
    fn transfer(
        &mut self,
        items: Vec<TransferItem>,
        delete_source: bool,
    ) -> Result<Submission, PoolError>;
}

/// A reversible user action.
///
/// Implementations check filesystem state before each sub-step and skip the
/// ones that no longer apply instead of failing.
pub trait Action: Send + fmt::Debug {
    fn kind(&self) -> ActionKind;

    /// Human-readable description, e.g. "Move 3 items to /tmp".
    fn description(&self) -> String;

    fn undo(&mut self, cx: &mut dyn HistoryContext);

    fn redo(&mut self, cx: &mut dyn HistoryContext);
}

/// Two-stack undo/redo history with a bounded depth.
#[derive(Debug)]
pub struct ActionLog {
    undo_stack: VecDeque<Box<dyn Action>>,
    redo_stack: Vec<Box<dyn Action>>,
    max_entries: usize,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ActionLog {
    /// Create a log keeping at most `max_entries` undoable actions.
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(max_entries.min(1000)),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Record a new action. Clears the redo stack.
    pub fn add(&mut self, action: Box<dyn Action>) {
        debug!(action = %action.kind(), description = action.description(), "recorded");
        self.redo_stack.clear();
        self.push_undo(action);
    }

    /// Undo the most recent action.
    ///
    /// Returns its description, or `None` if there is nothing to undo.
    pub fn undo(&mut self, cx: &mut dyn HistoryContext) -> Option<String> {
        let mut action = self.undo_stack.pop_back()?;
        let description = action.description();
        debug!(action = %action.kind(), description, "undo");
        action.undo(cx);
        self.redo_stack.push(action);
        Some(description)
    }

    /// Redo the most recently undone action.
    pub fn redo(&mut self, cx: &mut dyn HistoryContext) -> Option<String> {
        let mut action = self.redo_stack.pop()?;
        let description = action.description();
        debug!(action = %action.kind(), description, "redo");
        action.redo(cx);
        self.push_undo(action);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Description of the action [`Self::undo`] would revert.
    pub fn peek_undo(&self) -> Option<String> {
        self.undo_stack.back().map(|a| a.description())
    }

    /// Description of the action [`Self::redo`] would re-apply.
    pub fn peek_redo(&self) -> Option<String> {
        self.redo_stack.last().map(|a| a.description())
    }

    /// Clear both stacks.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, action: Box<dyn Action>) {
        // Remove oldest entry if at capacity
        if self.undo_stack.len() >= self.max_entries {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(action);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ferry_core::LocalFileSystem;

    /// A history context over the local filesystem that records transfers
    /// instead of running them.
    #[derive(Default)]
    pub struct RecordingContext {
        pub fs: LocalFileSystem,
        pub transfers: Vec<(Vec<TransferItem>, bool)>,
    }

    impl HistoryContext for RecordingContext {
        fn fs(&self) -> &dyn FileSystem {
            &self.fs
        }

        fn transfer(
            &mut self,
            items: Vec<TransferItem>,
            delete_source: bool,
        ) -> Result<Submission, PoolError> {
            self.transfers.push((items, delete_source));
            Ok(Submission::Immediate {
                id: crate::pool::RequestId(self.transfers.len() as u64),
            })
        }
    }
}
