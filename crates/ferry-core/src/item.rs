//! Transfer data model shared by the worker, the pool and the action log.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How a destination name collision is resolved for one item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the existing destination alone and record the item as skipped.
    Skip,
    /// Permanently delete the existing destination, then copy.
    Replace,
    /// Copy under a fresh, non-colliding name.
    KeepBoth,
}

/// One source → destination triple of a transfer request.
///
/// A `None` policy means the collision has not been decided yet; the worker
/// halts on it and reports `item_already_exist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub policy: Option<ConflictPolicy>,
}

impl TransferItem {
    /// Create an item with an unresolved conflict policy.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            policy: None,
        }
    }

    /// Set the conflict policy.
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the item that places `source` inside `directory` under its own name.
    pub fn into_directory(source: impl Into<PathBuf>, directory: &Path) -> Self {
        let source = source.into();
        let destination = directory.join(source.file_name().unwrap_or_default());
        Self::new(source, destination)
    }

    /// The source/destination pair of this item.
    pub fn pair(&self) -> TransferPair {
        TransferPair::new(self.source.clone(), self.destination.clone())
    }
}

/// A realized (or skipped) source → destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferPair {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TransferPair {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// The same pair with source and destination swapped.
    pub fn reversed(&self) -> Self {
        Self::new(self.destination.clone(), self.source.clone())
    }

    /// File name of the destination, lossily converted.
    pub fn destination_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// How a transfer request ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeTag {
    /// Every item was attempted.
    FinishedAll,
    /// Halted on a destination collision without a policy.
    ItemAlreadyExist,
    /// Halted on a failed copy or delete.
    PasteError,
    /// Halted because a stop was requested.
    ForcedToStop,
}

/// The item a transfer halted on and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltedItem {
    pub path: PathBuf,
    pub message: String,
}

/// Result of one transfer request, produced exactly once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Items copied (and, for moves, whose source was removed).
    pub pasted: Vec<TransferPair>,
    /// Items left alone under the `skip` policy.
    pub skipped: Vec<TransferPair>,
    /// Items whose copy was a no-op (source and destination are the same path).
    pub not_pasted: Vec<TransferPair>,
    pub tag: OutcomeTag,
    /// Set for `item_already_exist` and `paste_error`.
    pub halted: Option<HaltedItem>,
    /// Items not attempted, starting with the halted one.
    pub remaining: Vec<TransferItem>,
    pub bytes_transferred: u64,
}

impl TransferOutcome {
    /// An outcome with no recorded pairs.
    pub fn empty(tag: OutcomeTag) -> Self {
        Self {
            pasted: Vec::new(),
            skipped: Vec::new(),
            not_pasted: Vec::new(),
            tag,
            halted: None,
            remaining: Vec::new(),
            bytes_transferred: 0,
        }
    }

    /// Outcome of a request stopped before any item ran.
    pub fn stopped_before_start(items: Vec<TransferItem>) -> Self {
        Self {
            remaining: items,
            ..Self::empty(OutcomeTag::ForcedToStop)
        }
    }

    /// Check if every item was attempted.
    pub fn is_finished(&self) -> bool {
        self.tag == OutcomeTag::FinishedAll
    }

    /// Get a human-readable summary of the outcome.
    pub fn summary(&self, moved: bool) -> String {
        let action = if moved { "Moved" } else { "Copied" };
        let mut text = format!("{} {} items", action, self.pasted.len());
        if !self.skipped.is_empty() {
            text.push_str(&format!(", {} skipped", self.skipped.len()));
        }
        match self.tag {
            OutcomeTag::FinishedAll => {}
            OutcomeTag::ForcedToStop => {
                text.push_str(&format!(", stopped with {} left", self.remaining.len()));
            }
            OutcomeTag::ItemAlreadyExist | OutcomeTag::PasteError => {
                if let Some(halted) = &self.halted {
                    text.push_str(&format!(
                        ", halted at {}: {}",
                        halted.path.display(),
                        halted.message
                    ));
                }
            }
        }
        text
    }
}
