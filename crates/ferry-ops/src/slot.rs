//! Worker slots: one dedicated OS thread per unit of concurrency.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use ferry_core::{FileSystem, TransferItem, TransferOutcome};
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pool::RequestId;
use crate::request::CompletionCallback;
use crate::worker::TransferWorker;

/// Index of a worker slot, `0..pool_size`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle of a slot: `Idle → Locked → Running → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SlotStatus {
    /// Free to take a request.
    Idle = 0,
    /// Claimed by the pool, job not yet picked up by the thread.
    Locked = 1,
    /// The thread is executing a request.
    Running = 2,
}

impl SlotStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Locked,
            2 => Self::Running,
            _ => Self::Idle,
        }
    }
}

/// Work handed to a slot thread.
pub(crate) struct Job {
    pub id: RequestId,
    pub items: Vec<TransferItem>,
    pub delete_source: bool,
    pub stop: CancellationToken,
    pub progress: Arc<AtomicUsize>,
}

/// One outcome message, posted exactly once per request.
///
/// `slot` is `None` for requests completed without a worker (empty,
/// cancelled while queued, discarded at teardown).
pub(crate) struct WorkerEvent {
    pub slot: Option<SlotId>,
    pub id: RequestId,
    pub outcome: TransferOutcome,
}

/// Supervisor-side bookkeeping for the request a slot is running.
pub(crate) struct ActiveTransfer {
    pub id: RequestId,
    pub description: String,
    pub total: usize,
    pub progress: Arc<AtomicUsize>,
    pub stop: CancellationToken,
    pub on_complete: Option<CompletionCallback>,
}

/// Reports the slot thread's exit when dropped, panics included.
struct ExitSignal {
    id: SlotId,
    exited: std_mpsc::Sender<SlotId>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.exited.send(self.id);
    }
}

/// A unit of bounded concurrency owning a named worker thread.
pub struct WorkerSlot {
    id: SlotId,
    status: Arc<AtomicU8>,
    jobs: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
    active: Option<ActiveTransfer>,
}

impl WorkerSlot {
    /// Start the slot thread. Outcomes are posted to `events`; the slot id
    /// is sent on `exited` when the thread ends.
    pub(crate) fn spawn(
        id: SlotId,
        fs: Arc<dyn FileSystem>,
        events: mpsc::UnboundedSender<WorkerEvent>,
        exited: std_mpsc::Sender<SlotId>,
    ) -> io::Result<Self> {
        let (jobs_tx, mut jobs_rx) = mpsc::unbounded_channel::<Job>();
        let status = Arc::new(AtomicU8::new(SlotStatus::Idle as u8));
        let thread_status = Arc::clone(&status);

        let thread = thread::Builder::new()
            .name(format!("ferry-{}", id))
            .spawn(move || {
                let _signal = ExitSignal { id, exited };
                while let Some(job) = jobs_rx.blocking_recv() {
                    let _ = thread_status.compare_exchange(
                        SlotStatus::Locked as u8,
                        SlotStatus::Running as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    debug!(slot = %id, request = %job.id, items = job.items.len(), "running");

                    let worker = TransferWorker::new(Arc::clone(&fs))
                        .with_stop(job.stop)
                        .with_progress(job.progress);
                    let outcome = worker.run(job.items, job.delete_source);

                    let event = WorkerEvent {
                        slot: Some(id),
                        id: job.id,
                        outcome,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                debug!(slot = %id, "worker thread exiting");
            })?;

        Ok(Self {
            id,
            status,
            jobs: Some(jobs_tx),
            thread: Some(thread),
            active: None,
        })
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn status(&self) -> SlotStatus {
        SlotStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Claim the slot if it is idle.
    pub(crate) fn try_lock(&self) -> bool {
        self.status
            .compare_exchange(
                SlotStatus::Idle as u8,
                SlotStatus::Locked as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Hand a job to the locked slot's thread.
    ///
    /// Returns the job back if the thread is gone.
    pub(crate) fn start(&mut self, job: Job, active: ActiveTransfer) -> Result<(), Job> {
        self.active = Some(active);
        match &self.jobs {
            Some(jobs) => jobs.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    /// Release the slot after its outcome was delivered.
    pub(crate) fn finish(&mut self) -> Option<ActiveTransfer> {
        self.status.store(SlotStatus::Idle as u8, Ordering::Release);
        self.active.take()
    }

    pub(crate) fn active(&self) -> Option<&ActiveTransfer> {
        self.active.as_ref()
    }

    /// Request a cooperative stop of the running request.
    pub(crate) fn stop_current(&self) {
        if let Some(active) = &self.active {
            active.stop.cancel();
        }
    }

    /// Close the job channel so the thread exits after its current job.
    pub(crate) fn close(&mut self) {
        self.jobs = None;
    }

    /// Join the thread once it signalled its exit; otherwise leave it detached.
    pub(crate) fn join(&mut self, exited: bool) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if !exited && !thread.is_finished() {
            warn!(slot = %self.id, "worker did not stop in time, detaching");
            return;
        }
        if thread.join().is_err() {
            warn!(slot = %self.id, "worker thread panicked");
        }
    }
}

impl fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("request", &self.active.as_ref().map(|a| a.id))
            .finish()
    }
}
