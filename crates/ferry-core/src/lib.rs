//! Core types and traits for ferry.
//!
//! This crate provides the transfer data model, the filesystem collaborator
//! trait with its local implementation, keep-both naming and configuration.

mod config;
mod error;
mod fs;
mod item;
mod naming;

pub use config::{EngineConfig, EngineConfigBuilder, EngineConfigBuilderError};
pub use error::{ConfigError, FsError};
pub use fs::{CopyStatus, FileSystem, LocalFileSystem};
pub use item::{
    ConflictPolicy, HaltedItem, OutcomeTag, TransferItem, TransferOutcome, TransferPair,
};
pub use naming::{keep_both_name, keep_both_path, validate_name};
