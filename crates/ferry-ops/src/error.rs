//! Error types for the pool and the engine.

use ferry_core::FsError;
use thiserror::Error;

use crate::conflict::PromptId;

/// Errors returned when submitting work to the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The backlog reached its configured bound; the request was dropped.
    #[error("Transfer backlog is full ({capacity} requests waiting)")]
    BacklogFull { capacity: usize },

    /// The pool has been torn down.
    #[error("Transfer pool is shut down")]
    ShutDown,

    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Fs(#[from] FsError),

    /// The prompt was already resolved or never existed.
    #[error("No pending conflict prompt with id {id}")]
    UnknownPrompt { id: PromptId },
}
