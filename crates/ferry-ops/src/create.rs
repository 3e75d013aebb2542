//! Undoable creation of files and directories.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_core::{FileSystem, FsError, validate_name};
use tracing::{debug, warn};

use crate::host::ActionHost;
use crate::undo::{Action, ActionKind, HistoryContext};

/// A file or directory created from the UI.
pub struct CreateItem {
    path: PathBuf,
    is_dir: bool,
    host: Arc<dyn ActionHost>,
}

impl CreateItem {
    /// Record an item that was already created.
    pub fn new(path: impl Into<PathBuf>, is_dir: bool, host: Arc<dyn ActionHost>) -> Self {
        Self {
            path: path.into(),
            is_dir,
            host,
        }
    }

    /// Create the item and return the action recording it.
    pub fn perform(
        fs: &dyn FileSystem,
        path: impl Into<PathBuf>,
        is_dir: bool,
        host: Arc<dyn ActionHost>,
    ) -> Result<Self, FsError> {
        let path = path.into();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            validate_name(name)?;
        }
        create(fs, &path, is_dir)?;
        Ok(Self::new(path, is_dir, host))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

fn create(fs: &dyn FileSystem, path: &Path, is_dir: bool) -> Result<(), FsError> {
    if is_dir {
        fs.create_dir(path)
    } else {
        fs.create_file(path)
    }
}

impl Action for CreateItem {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateItem
    }

    fn description(&self) -> String {
        let what = if self.is_dir { "directory" } else { "file" };
        format!("Create {} '{}'", what, self.name())
    }

    fn undo(&mut self, cx: &mut dyn HistoryContext) {
        let fs = cx.fs();
        if !fs.exists(&self.path) {
            debug!(path = %self.path.display(), "created item already gone");
            return;
        }
        if let Err(error) = fs.move_to_trash(&self.path) {
            warn!(path = %self.path.display(), %error, "could not trash created item");
        }
        self.host.refresh_all();
    }

    fn redo(&mut self, cx: &mut dyn HistoryContext) {
        let fs = cx.fs();
        if fs.exists(&self.path) {
            debug!(path = %self.path.display(), "item already exists, not recreating");
            return;
        }
        if let Err(error) = create(fs, &self.path, self.is_dir) {
            warn!(path = %self.path.display(), %error, "could not recreate item");
            return;
        }
        self.host.refresh_all();
        if let Some(parent) = self.path.parent() {
            self.host.select_items_in_path(parent, &[self.name()]);
        }
    }
}

impl fmt::Debug for CreateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateItem")
            .field("path", &self.path)
            .field("is_dir", &self.is_dir)
            .finish_non_exhaustive()
    }
}
