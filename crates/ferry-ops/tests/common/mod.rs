#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use ferry_core::{CopyStatus, FileSystem, FsError, LocalFileSystem};
use ferry_ops::ActionHost;
use tokio_util::sync::CancellationToken;

/// Host recording every notification.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub refreshes: AtomicUsize,
    pub selections: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl ActionHost for RecordingHost {
    fn select_items_in_path(&self, path: &Path, names: &[String]) {
        self.selections
            .lock()
            .unwrap()
            .push((path.to_path_buf(), names.to_vec()));
    }

    fn refresh_all(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Local filesystem whose copies block until the gate opens.
///
/// Tracks how many copies run at once.
#[derive(Debug, Default)]
pub struct GatedFs {
    inner: LocalFileSystem,
    open: Mutex<bool>,
    opened: Condvar,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub entered: AtomicUsize,
    pub order: Mutex<Vec<PathBuf>>,
}

impl GatedFs {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl FileSystem for GatedFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn copy_item(&self, source: &Path, destination: &Path) -> Result<CopyStatus, FsError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.entered.fetch_add(1, Ordering::SeqCst);

        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);

        self.order.lock().unwrap().push(source.to_path_buf());
        let result = self.inner.copy_item(source, destination);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn delete_item(&self, path: &Path) -> Result<(), FsError> {
        self.inner.delete_item(path)
    }

    fn move_to_trash(&self, path: &Path) -> Result<(), FsError> {
        self.inner.move_to_trash(path)
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<String>, FsError> {
        self.inner.list_directory(path)
    }

    fn rename_item(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.rename_item(from, to)
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_file(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_dir(path)
    }
}

/// What [`ScriptedFs`] does on the copy of a given source name.
#[derive(Debug, Clone)]
pub enum Script {
    /// Cancel the token while copying, then finish the copy.
    Cancel(CancellationToken),
    /// Fail the copy.
    Fail,
    /// Panic inside the copy.
    Panic,
    /// Fail the removal of the source after copying.
    FailDelete,
}

/// Local filesystem with scripted behavior for named sources.
#[derive(Debug, Default)]
pub struct ScriptedFs {
    inner: LocalFileSystem,
    scripts: Mutex<Vec<(String, Script)>>,
}

impl ScriptedFs {
    pub fn on(self, name: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().push((name.to_string(), script));
        self
    }

    fn script_for(&self, path: &Path) -> Option<Script> {
        let name = path.file_name()?.to_string_lossy().to_string();
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| s.clone())
    }
}

impl FileSystem for ScriptedFs {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn copy_item(&self, source: &Path, destination: &Path) -> Result<CopyStatus, FsError> {
        match self.script_for(source) {
            Some(Script::Cancel(token)) => {
                token.cancel();
                self.inner.copy_item(source, destination)
            }
            Some(Script::Fail) => Err(FsError::Io {
                path: source.to_path_buf(),
                source: std::io::Error::other("disk full"),
            }),
            Some(Script::Panic) => panic!("copy exploded"),
            _ => self.inner.copy_item(source, destination),
        }
    }

    fn delete_item(&self, path: &Path) -> Result<(), FsError> {
        if let Some(Script::FailDelete) = self.script_for(path) {
            return Err(FsError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        self.inner.delete_item(path)
    }

    fn move_to_trash(&self, path: &Path) -> Result<(), FsError> {
        self.inner.move_to_trash(path)
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<String>, FsError> {
        self.inner.list_directory(path)
    }

    fn rename_item(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.inner.rename_item(from, to)
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_file(path)
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        self.inner.create_dir(path)
    }
}

/// Spin until `condition` holds, failing the test after five seconds.
pub fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Create `names` as small files under `dir`.
pub fn make_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        })
        .collect()
}
