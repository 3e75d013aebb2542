//! Conflict detection and resolution for transfers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use ferry_core::{ConflictPolicy, FileSystem, FsError, TransferItem, TransferOutcome};
use serde::{Deserialize, Serialize};

/// A conflict detected before or during a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The source path being transferred.
    pub source: PathBuf,
    /// The destination path where the conflict exists.
    pub destination: PathBuf,
    /// The kind of conflict.
    pub kind: ConflictKind,
}

impl Conflict {
    /// Create a new conflict.
    pub fn new(source: PathBuf, destination: PathBuf, kind: ConflictKind) -> Self {
        Self {
            source,
            destination,
            kind,
        }
    }

    /// Classify the conflict of `item` by looking at its destination.
    pub fn for_item(fs: &dyn FileSystem, item: &TransferItem) -> Self {
        let kind = if fs.is_dir(&item.destination) {
            ConflictKind::DirectoryExists
        } else {
            ConflictKind::FileExists
        };
        Self::new(item.source.clone(), item.destination.clone(), kind)
    }
}

/// The kind of conflict encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    /// A file already exists at the destination.
    FileExists,
    /// A directory already exists at the destination.
    DirectoryExists,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileExists => write!(f, "File already exists"),
            Self::DirectoryExists => write!(f, "Directory already exists"),
        }
    }
}

/// Identifier of a pending conflict prompt.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PromptId(pub u64);

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who started a transfer. Only user transfers are recorded for undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferOrigin {
    /// A paste, drop or cut-paste requested by the user.
    User,
    /// A transfer replayed by undo or redo.
    History,
}

/// How the user answered a conflict prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Apply one policy to every conflict ("apply to all").
    All(ConflictPolicy),
    /// Per-destination policies; conflicts missing from the map are skipped.
    Each(HashMap<PathBuf, ConflictPolicy>),
    /// Drop the transfer.
    Cancel,
}

/// A batch of conflicts awaiting a [`Resolution`].
#[derive(Debug, Clone)]
pub struct ConflictPrompt {
    pub id: PromptId,
    pub conflicts: Vec<Conflict>,
    /// Every item of the pending transfer, conflicting or not.
    pub items: Vec<TransferItem>,
    pub delete_source: bool,
    pub origin: TransferOrigin,
}

impl ConflictPrompt {
    /// Build a prompt for the item a transfer halted on.
    ///
    /// Returns `None` if the outcome has nothing left to resume.
    pub fn from_halted(
        id: PromptId,
        fs: &dyn FileSystem,
        outcome: &TransferOutcome,
        delete_source: bool,
        origin: TransferOrigin,
    ) -> Option<Self> {
        let halted = outcome.remaining.first()?;
        Some(Self {
            id,
            conflicts: vec![Conflict::for_item(fs, halted)],
            items: outcome.remaining.clone(),
            delete_source,
            origin,
        })
    }

    /// Apply `resolution`, returning the items to submit (or `None` on cancel).
    pub fn resolve(self, resolution: Resolution) -> Option<Vec<TransferItem>> {
        let conflicting: HashSet<&Path> = self
            .conflicts
            .iter()
            .map(|c| c.destination.as_path())
            .collect();

        match resolution {
            Resolution::Cancel => None,
            Resolution::All(policy) => Some(
                self.items
                    .iter()
                    .cloned()
                    .map(|mut item| {
                        if item.policy.is_none() || conflicting.contains(item.destination.as_path())
                        {
                            item.policy = Some(policy);
                        }
                        item
                    })
                    .collect(),
            ),
            Resolution::Each(policies) => Some(
                self.items
                    .iter()
                    .cloned()
                    .map(|mut item| {
                        if conflicting.contains(item.destination.as_path()) {
                            let policy = policies
                                .get(&item.destination)
                                .copied()
                                .unwrap_or(ConflictPolicy::Skip);
                            item.policy = Some(policy);
                        }
                        item
                    })
                    .collect(),
            ),
        }
    }
}

/// Find the unresolved items whose destination already exists.
///
/// Each destination directory is listed once.
pub fn detect_conflicts(
    fs: &dyn FileSystem,
    items: &[TransferItem],
) -> Result<Vec<Conflict>, FsError> {
    let mut listings: HashMap<PathBuf, HashSet<String>> = HashMap::new();
    let mut conflicts = Vec::new();

    for item in items.iter().filter(|item| item.policy.is_none()) {
        let Some(parent) = item.destination.parent() else {
            continue;
        };
        if !listings.contains_key(parent) {
            let names = if fs.exists(parent) {
                fs.list_directory(parent)?.into_iter().collect()
            } else {
                HashSet::new()
            };
            listings.insert(parent.to_path_buf(), names);
        }

        let name = item
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if listings.get(parent).is_some_and(|names| names.contains(&name)) {
            conflicts.push(Conflict::for_item(fs, item));
        }
    }

    Ok(conflicts)
}
