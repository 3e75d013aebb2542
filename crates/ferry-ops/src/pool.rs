//! Bounded pool of worker slots with a FIFO backlog.
//!
//! All methods run on the supervisory thread. Workers post outcomes to a
//! single channel; [`TransferPool::poll_completions`] and
//! [`TransferPool::next_completion`] drain it, release slots, invoke request
//! callbacks and feed the backlog.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use ferry_core::{EngineConfig, FileSystem, HaltedItem, OutcomeTag, TransferOutcome};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::progress::TransferStatus;
use crate::request::{CompletionCallback, TransferRequest};
use crate::slot::{ActiveTransfer, Job, SlotId, SlotStatus, WorkerEvent, WorkerSlot};

/// Identifier assigned to each submitted request.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a submitted request went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A slot was free; the request is running.
    Dispatched { id: RequestId, slot: SlotId },
    /// Every slot is busy; the request waits in the backlog (0 = next).
    Queued { id: RequestId, position: usize },
    /// Nothing to transfer; completes with `finished_all` on the next poll.
    Immediate { id: RequestId },
}

impl Submission {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Dispatched { id, .. } | Self::Queued { id, .. } | Self::Immediate { id } => *id,
        }
    }
}

struct Pending {
    id: RequestId,
    request: TransferRequest,
}

/// Fixed-size pool of worker slots.
pub struct TransferPool {
    slots: Vec<WorkerSlot>,
    backlog: VecDeque<Pending>,
    max_backlog: Option<usize>,
    shutdown_timeout: Duration,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    /// Exit notices of slot threads, waited on at teardown.
    exits_rx: std_mpsc::Receiver<SlotId>,
    /// Callbacks of requests completed without a worker, awaiting their event.
    detached: HashMap<RequestId, Option<CompletionCallback>>,
    next_id: u64,
    shut_down: bool,
}

impl TransferPool {
    /// Create a pool sized by `config.workers`.
    pub fn new(fs: Arc<dyn FileSystem>, config: &EngineConfig) -> Result<Self, PoolError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (exits_tx, exits_rx) = std_mpsc::channel();

        let mut slots = Vec::with_capacity(config.workers);
        for index in 0..config.workers.max(1) {
            let slot = WorkerSlot::spawn(
                SlotId(index),
                Arc::clone(&fs),
                events_tx.clone(),
                exits_tx.clone(),
            )
            .map_err(|source| PoolError::Spawn { source })?;
            slots.push(slot);
        }
        debug!(workers = slots.len(), "transfer pool started");

        Ok(Self {
            slots,
            backlog: VecDeque::new(),
            max_backlog: config.max_backlog,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            events_tx,
            events_rx,
            exits_rx,
            detached: HashMap::new(),
            next_id: 1,
            shut_down: false,
        })
    }

    /// Create a pool with `workers` slots and default settings otherwise.
    pub fn with_workers(fs: Arc<dyn FileSystem>, workers: usize) -> Result<Self, PoolError> {
        let config = EngineConfig {
            workers,
            ..EngineConfig::default()
        };
        Self::new(fs, &config)
    }

    /// Submit a request: run it on a free slot or queue it.
    pub fn submit(&mut self, request: TransferRequest) -> Result<Submission, PoolError> {
        if self.shut_down {
            return Err(PoolError::ShutDown);
        }

        if request.is_empty() {
            let id = self.next_request_id();
            let parts = request.into_parts();
            self.complete_detached(
                id,
                parts.on_complete,
                TransferOutcome::empty(OutcomeTag::FinishedAll),
            );
            return Ok(Submission::Immediate { id });
        }

        if let Some(slot) = self.slots.iter().find(|s| s.try_lock()).map(|s| s.id()) {
            let id = self.next_request_id();
            self.dispatch(slot, id, request);
            return Ok(Submission::Dispatched { id, slot });
        }

        if let Some(capacity) = self.max_backlog {
            if self.backlog.len() >= capacity {
                warn!(capacity, "backlog full, rejecting transfer");
                return Err(PoolError::BacklogFull { capacity });
            }
        }

        let id = self.next_request_id();
        info!(request = %id, description = request.description(), "all workers busy, queued");
        self.backlog.push_back(Pending { id, request });
        Ok(Submission::Queued {
            id,
            position: self.backlog.len() - 1,
        })
    }

    /// Request a stop. Running requests halt at their next item boundary;
    /// queued requests complete with `forced_to_stop` right away.
    ///
    /// Returns false if the request is not running or queued.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        if let Some(slot) = self
            .slots
            .iter()
            .find(|s| s.active().is_some_and(|a| a.id == id))
        {
            info!(request = %id, slot = %slot.id(), "stopping transfer");
            slot.stop_current();
            return true;
        }

        if let Some(position) = self.backlog.iter().position(|p| p.id == id) {
            if let Some(pending) = self.backlog.remove(position) {
                info!(request = %id, "removed queued transfer");
                let parts = pending.request.into_parts();
                self.complete_detached(
                    id,
                    parts.on_complete,
                    TransferOutcome::stopped_before_start(parts.items),
                );
                return true;
            }
        }

        false
    }

    /// Handle every outcome already posted, without blocking.
    ///
    /// Returns the number of outcomes handled.
    pub fn poll_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next outcome and handle it.
    ///
    /// Returns `None` immediately when nothing is running, queued or pending.
    pub async fn next_completion(&mut self) -> Option<RequestId> {
        if self.is_idle() {
            return None;
        }
        let event = self.events_rx.recv().await?;
        let id = event.id;
        self.handle_event(event);
        Some(id)
    }

    /// Stop everything and release the worker threads.
    ///
    /// Queued requests complete with `forced_to_stop`; running ones are asked
    /// to stop and waited for up to the shutdown timeout. Outcomes of workers
    /// that stopped in time are delivered before this returns.
    pub fn teardown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!(
            running = self.slots.iter().filter(|s| s.active().is_some()).count(),
            queued = self.backlog.len(),
            "tearing down transfer pool"
        );

        while let Some(pending) = self.backlog.pop_front() {
            let parts = pending.request.into_parts();
            self.complete_detached(
                pending.id,
                parts.on_complete,
                TransferOutcome::stopped_before_start(parts.items),
            );
        }

        for slot in &mut self.slots {
            slot.stop_current();
            slot.close();
        }

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut exited = HashSet::new();
        while exited.len() < self.slots.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.exits_rx.recv_timeout(remaining) {
                Ok(slot) => {
                    exited.insert(slot);
                }
                Err(_) => break,
            }
        }

        for slot in &mut self.slots {
            let has_exited = exited.contains(&slot.id());
            slot.join(has_exited);
        }

        self.poll_completions();
    }

    pub fn pool_size(&self) -> usize {
        self.slots.len()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn slot_statuses(&self) -> Vec<(SlotId, SlotStatus)> {
        self.slots.iter().map(|s| (s.id(), s.status())).collect()
    }

    /// Snapshot of every running request.
    pub fn active_transfers(&self) -> Vec<TransferStatus> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.active().map(|active| TransferStatus {
                    slot: slot.id(),
                    id: active.id,
                    description: active.description.clone(),
                    items_done: active.progress.load(Ordering::Relaxed).min(active.total),
                    items_total: active.total,
                })
            })
            .collect()
    }

    /// Check if no request is running, queued or awaiting delivery.
    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty()
            && self.detached.is_empty()
            && self.slots.iter().all(|s| s.active().is_none())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Start `request` on a slot that was already locked.
    fn dispatch(&mut self, slot: SlotId, id: RequestId, request: TransferRequest) {
        let parts = request.into_parts();
        info!(request = %id, slot = %slot, description = parts.description, "dispatching");

        let stop = CancellationToken::new();
        let progress = Arc::new(AtomicUsize::new(0));
        let active = ActiveTransfer {
            id,
            description: parts.description,
            total: parts.items.len(),
            progress: Arc::clone(&progress),
            stop: stop.clone(),
            on_complete: parts.on_complete,
        };
        let job = Job {
            id,
            items: parts.items,
            delete_source: parts.delete_source,
            stop,
            progress,
        };

        if let Err(job) = self.slots[slot.0].start(job, active) {
            warn!(slot = %slot, "worker thread is gone, failing request");
            let outcome = TransferOutcome {
                tag: OutcomeTag::PasteError,
                halted: job.items.first().map(|item| HaltedItem {
                    path: item.source.clone(),
                    message: "worker thread is not running".to_string(),
                }),
                remaining: job.items,
                ..TransferOutcome::empty(OutcomeTag::PasteError)
            };
            let _ = self.events_tx.send(WorkerEvent {
                slot: Some(slot),
                id,
                outcome,
            });
        }
    }

    /// Complete a request that never reached a worker. The callback runs when
    /// the event is drained, like any other completion.
    fn complete_detached(
        &mut self,
        id: RequestId,
        on_complete: Option<CompletionCallback>,
        outcome: TransferOutcome,
    ) {
        self.detached.insert(id, on_complete);
        let _ = self.events_tx.send(WorkerEvent {
            slot: None,
            id,
            outcome,
        });
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event.slot {
            Some(slot) => self.on_worker_done(slot, event.id, event.outcome),
            None => {
                if let Some(Some(callback)) = self.detached.remove(&event.id) {
                    callback(event.outcome);
                }
            }
        }
    }

    /// Release `slot`, deliver the outcome and feed the backlog.
    fn on_worker_done(&mut self, slot: SlotId, id: RequestId, outcome: TransferOutcome) {
        let Some(worker_slot) = self.slots.get_mut(slot.0) else {
            return;
        };
        let active = worker_slot.finish();
        info!(request = %id, slot = %slot, tag = %outcome.tag, pasted = outcome.pasted.len(), "transfer done");

        if let Some(callback) = active.and_then(|a| a.on_complete) {
            callback(outcome);
        }

        if self.shut_down {
            return;
        }
        if let Some(next) = self.backlog.pop_front() {
            if self.slots[slot.0].try_lock() {
                self.dispatch(slot, next.id, next.request);
            } else {
                self.backlog.push_front(next);
            }
        }
    }
}

impl Drop for TransferPool {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for TransferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferPool")
            .field("slots", &self.slots)
            .field("backlog", &self.backlog.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
