//! The UI-side collaborator notified after transfers and history steps.

use std::path::Path;

/// Receives view updates from the engine and from actions.
pub trait ActionHost: Send + Sync {
    /// Select `names` in the view of directory `path`.
    fn select_items_in_path(&self, path: &Path, names: &[String]);

    /// Reload every open view.
    fn refresh_all(&self);
}

/// An [`ActionHost`] that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl ActionHost for NoopHost {
    fn select_items_in_path(&self, _path: &Path, _names: &[String]) {}

    fn refresh_all(&self) {}
}
