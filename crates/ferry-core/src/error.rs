//! Error types for filesystem and configuration operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the filesystem collaborator.
#[derive(Debug, Error)]
pub enum FsError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Something already occupies the target path.
    #[error("Already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The item could not be moved to the recoverable trash.
    #[error("Failed to move {path} to trash: {message}")]
    Trash { path: PathBuf, message: String },

    /// A file name that cannot be used on this platform.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A directory cannot be copied into itself.
    #[error("Cannot copy {source_path} into itself ({destination})")]
    SourceIsAncestor {
        source_path: PathBuf,
        destination: PathBuf,
    },

    /// Replacing the destination would delete the source inside it.
    #[error("Cannot replace {destination}: it contains {source_path}")]
    DestinationIsAncestor {
        source_path: PathBuf,
        destination: PathBuf,
    },
}

impl FsError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// The path the error refers to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::PermissionDenied { path }
            | Self::NotFound { path }
            | Self::AlreadyExists { path }
            | Self::Io { path, .. }
            | Self::Trash { path, .. } => Some(path),
            Self::SourceIsAncestor { source_path, .. }
            | Self::DestinationIsAncestor { source_path, .. } => Some(source_path),
            Self::InvalidName { .. } => None,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}
