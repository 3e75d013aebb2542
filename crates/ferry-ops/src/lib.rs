//! Transfer engine for ferry.
//!
//! This crate runs batch copy/move requests on a fixed pool of worker
//! threads, queues overflow in a FIFO backlog, turns name collisions into
//! conflict prompts and records completed transfers in an undo/redo log.

mod batch;
mod conflict;
mod create;
mod engine;
mod error;
mod host;
mod pool;
mod progress;
mod rename;
mod request;
mod slot;
mod undo;
mod worker;

pub use batch::{CopyBatch, MoveBatch};
pub use conflict::{
    Conflict, ConflictKind, ConflictPrompt, PromptId, Resolution, TransferOrigin, detect_conflicts,
};
pub use create::CreateItem;
pub use engine::{Engine, EngineEvent, PasteStatus};
pub use error::{EngineError, PoolError};
pub use host::{ActionHost, NoopHost};
pub use pool::{RequestId, Submission, TransferPool};
pub use progress::TransferStatus;
pub use rename::RenameItem;
pub use request::{CompletionCallback, TransferRequest};
pub use slot::{SlotId, SlotStatus, WorkerSlot};
pub use undo::{Action, ActionKind, ActionLog, HistoryContext};
pub use worker::TransferWorker;
