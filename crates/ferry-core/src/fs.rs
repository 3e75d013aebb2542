//! The filesystem collaborator consumed by the transfer engine.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FsError;
use crate::naming::keep_both_name;

/// What a copy actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    /// The item was copied; `bytes` is the total file size written.
    Copied { bytes: u64 },
    /// Nothing to do: source and destination are the same path.
    Unchanged,
}

/// Filesystem primitives the engine treats as black boxes.
///
/// Implementations must be shareable across worker threads.
pub trait FileSystem: Send + Sync {
    /// Check whether anything (including a dangling symlink) exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Check whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Copy a file or a directory tree to `destination`.
    fn copy_item(&self, source: &Path, destination: &Path) -> Result<CopyStatus, FsError>;

    /// Permanently delete a file or directory tree.
    fn delete_item(&self, path: &Path) -> Result<(), FsError>;

    /// Move an item somewhere it can be recovered from.
    fn move_to_trash(&self, path: &Path) -> Result<(), FsError>;

    /// Names of the entries directly inside `path`.
    fn list_directory(&self, path: &Path) -> Result<Vec<String>, FsError>;

    /// Rename `from` to `to`; fails if `to` exists.
    fn rename_item(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Create an empty file; fails if it exists.
    fn create_file(&self, path: &Path) -> Result<(), FsError>;

    /// Create a directory; fails if it exists.
    fn create_dir(&self, path: &Path) -> Result<(), FsError>;
}

/// [`FileSystem`] over `std::fs`.
///
/// Trash goes to the platform trash unless a staging directory is set.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    trash_dir: Option<PathBuf>,
}

impl LocalFileSystem {
    /// Create a filesystem that trashes to the platform trash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filesystem that trashes into `dir` instead of the platform trash.
    pub fn with_trash_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            trash_dir: Some(dir.into()),
        }
    }

    /// The staging trash directory, if one is set.
    pub fn trash_dir(&self) -> Option<&Path> {
        self.trash_dir.as_deref()
    }

    fn stage_in_trash(&self, dir: &Path, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(dir).map_err(|e| FsError::io(dir, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let existing = self.list_directory(dir)?;
        let target = dir.join(keep_both_name(&existing, &name, path.is_dir()));

        // Rename first (same filesystem), fall back to copy + delete
        if fs::rename(path, &target).is_ok() {
            return Ok(());
        }
        self.copy_item(path, &target)?;
        self.delete_item(path)
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn copy_item(&self, source: &Path, destination: &Path) -> Result<CopyStatus, FsError> {
        if source == destination {
            return Ok(CopyStatus::Unchanged);
        }

        let metadata = fs::metadata(source).map_err(|e| FsError::io(source, e))?;
        if metadata.is_dir() {
            if destination.starts_with(source) {
                return Err(FsError::SourceIsAncestor {
                    source_path: source.to_path_buf(),
                    destination: destination.to_path_buf(),
                });
            }
            let bytes = copy_dir_recursive(source, destination)?;
            Ok(CopyStatus::Copied { bytes })
        } else {
            let bytes = fs::copy(source, destination).map_err(|e| FsError::io(source, e))?;
            Ok(CopyStatus::Copied { bytes })
        }
    }

    fn delete_item(&self, path: &Path) -> Result<(), FsError> {
        let metadata = fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).map_err(|e| FsError::io(path, e))
        } else {
            fs::remove_file(path).map_err(|e| FsError::io(path, e))
        }
    }

    fn move_to_trash(&self, path: &Path) -> Result<(), FsError> {
        if !self.exists(path) {
            return Err(FsError::NotFound {
                path: path.to_path_buf(),
            });
        }

        match &self.trash_dir {
            Some(dir) => self.stage_in_trash(dir, path),
            None => {
                debug!(path = %path.display(), "moving to platform trash");
                trash::delete(path).map_err(|e| FsError::Trash {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn list_directory(&self, path: &Path) -> Result<Vec<String>, FsError> {
        let entries = fs::read_dir(path).map_err(|e| FsError::io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }

    fn rename_item(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        if self.exists(to) {
            return Err(FsError::AlreadyExists {
                path: to.to_path_buf(),
            });
        }
        fs::rename(from, to).map_err(|e| FsError::io(from, e))
    }

    fn create_file(&self, path: &Path) -> Result<(), FsError> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| FsError::io(path, e))
    }

    fn create_dir(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir(path).map_err(|e| FsError::io(path, e))
    }
}

/// Recursively copy a directory, returning the number of bytes written.
fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<u64, FsError> {
    fs::create_dir_all(dest).map_err(|e| FsError::io(dest, e))?;

    let mut total_bytes = 0u64;

    let entries = fs::read_dir(source).map_err(|e| FsError::io(source, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| FsError::io(source, e))?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| FsError::io(&path, e))?;

        if file_type.is_symlink() {
            copy_symlink(&path, &dest_path)?;
        } else if file_type.is_dir() {
            total_bytes += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_bytes += fs::copy(&path, &dest_path).map_err(|e| FsError::io(&path, e))?;
        }
    }

    Ok(total_bytes)
}

/// Recreate the link at `source` as `dest` without following it.
fn copy_symlink(source: &Path, dest: &Path) -> Result<(), FsError> {
    let target = fs::read_link(source).map_err(|e| FsError::io(source, e))?;

    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(&target, dest);
    #[cfg(windows)]
    let result = if source.is_dir() {
        std::os::windows::fs::symlink_dir(&target, dest)
    } else {
        std::os::windows::fs::symlink_file(&target, dest)
    };
    #[cfg(not(any(unix, windows)))]
    let result = fs::copy(source, dest).map(|_| ());

    result.map_err(|e| FsError::io(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_same_path_is_unchanged() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let status = LocalFileSystem::new().copy_item(&file, &file).unwrap();
        assert_eq!(status, CopyStatus::Unchanged);
    }

    #[test]
    fn test_copy_dir_into_itself_refused() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir(&dir).unwrap();

        let err = LocalFileSystem::new()
            .copy_item(&dir, &dir.join("dir"))
            .unwrap_err();
        assert!(matches!(err, FsError::SourceIsAncestor { .. }));
    }

    #[test]
    fn test_staging_trash_keeps_both() {
        let temp = TempDir::new().unwrap();
        let trash = temp.path().join("trash");
        let fs_impl = LocalFileSystem::with_trash_dir(&trash);

        for _ in 0..2 {
            let file = temp.path().join("gone.txt");
            fs::write(&file, "x").unwrap();
            fs_impl.move_to_trash(&file).unwrap();
            assert!(!file.exists());
        }

        let mut names = fs_impl.list_directory(&trash).unwrap();
        names.sort();
        assert_eq!(names, vec!["gone 2.txt", "gone.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_dir_keeps_symlinks_as_links() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("file.txt"), "abc").unwrap();
        // A link back to its own parent would recurse forever if followed
        std::os::unix::fs::symlink("..", src.join("loop")).unwrap();

        let dst = temp.path().join("dst");
        let status = LocalFileSystem::new().copy_item(&src, &dst).unwrap();

        assert_eq!(status, CopyStatus::Copied { bytes: 3 });
        let link = fs::symlink_metadata(dst.join("loop")).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(fs::read_link(dst.join("loop")).unwrap(), Path::new(".."));
    }
}
