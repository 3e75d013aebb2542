//! Undoable rename.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_core::{FileSystem, FsError, validate_name};
use tracing::warn;

use crate::host::ActionHost;
use crate::undo::{Action, ActionKind, HistoryContext};

/// An item renamed inside its directory.
pub struct RenameItem {
    dir: PathBuf,
    prev_name: String,
    new_name: String,
    host: Arc<dyn ActionHost>,
}

impl RenameItem {
    /// Record a rename that already happened. The new name is validated.
    pub fn new(
        dir: impl Into<PathBuf>,
        prev_name: impl Into<String>,
        new_name: impl Into<String>,
        host: Arc<dyn ActionHost>,
    ) -> Result<Self, FsError> {
        let new_name = new_name.into();
        validate_name(&new_name)?;
        Ok(Self {
            dir: dir.into(),
            prev_name: prev_name.into(),
            new_name,
            host,
        })
    }

    /// Rename `source` to `new_name` and return the action recording it.
    pub fn perform(
        fs: &dyn FileSystem,
        source: &Path,
        new_name: &str,
        host: Arc<dyn ActionHost>,
    ) -> Result<Self, FsError> {
        let dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let prev_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let action = Self::new(dir, prev_name, new_name, host)?;
        fs.rename_item(source, &action.dir.join(&action.new_name))?;
        Ok(action)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prev_name(&self) -> &str {
        &self.prev_name
    }

    pub fn new_name(&self) -> &str {
        &self.new_name
    }

    /// Rename `from` to `to` inside the directory if `to` is free.
    fn rename(&self, fs: &dyn FileSystem, from: &str, to: &str) {
        let source = self.dir.join(from);
        let target = self.dir.join(to);
        if !fs.exists(&source) {
            warn!(path = %source.display(), "rename source is gone, skipping");
            return;
        }
        if fs.exists(&target) {
            warn!(path = %target.display(), "rename target is taken, skipping");
            return;
        }
        if let Err(error) = fs.rename_item(&source, &target) {
            warn!(path = %source.display(), %error, "rename failed");
            return;
        }
        self.host.refresh_all();
        self.host.select_items_in_path(&self.dir, &[to.to_string()]);
    }
}

impl Action for RenameItem {
    fn kind(&self) -> ActionKind {
        ActionKind::RenameItem
    }

    fn description(&self) -> String {
        format!("Rename '{}' to '{}'", self.prev_name, self.new_name)
    }

    fn undo(&mut self, cx: &mut dyn HistoryContext) {
        self.rename(cx.fs(), &self.new_name, &self.prev_name);
    }

    fn redo(&mut self, cx: &mut dyn HistoryContext) {
        self.rename(cx.fs(), &self.prev_name, &self.new_name);
    }
}

impl fmt::Debug for RenameItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameItem")
            .field("dir", &self.dir)
            .field("prev_name", &self.prev_name)
            .field("new_name", &self.new_name)
            .finish_non_exhaustive()
    }
}
