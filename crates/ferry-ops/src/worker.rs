//! The per-request transfer loop.
//!
//! A [`TransferWorker`] walks the items of one request in order, applying the
//! conflict policy of each item, and produces exactly one
//! [`TransferOutcome`]. It never returns an error: every failure becomes a
//! halting outcome tag.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferry_core::{
    ConflictPolicy, CopyStatus, FileSystem, FsError, HaltedItem, OutcomeTag, TransferItem,
    TransferOutcome, TransferPair, keep_both_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why the loop stopped before exhausting its items.
struct Halt {
    tag: OutcomeTag,
    path: PathBuf,
    message: String,
    /// Whether the halted item goes back into `remaining`.
    retry: bool,
}

impl Halt {
    fn conflict(item: &TransferItem) -> Self {
        Self {
            tag: OutcomeTag::ItemAlreadyExist,
            path: item.destination.clone(),
            message: "destination already exists".to_string(),
            retry: true,
        }
    }

    fn failed(path: &Path, error: FsError, retry: bool) -> Self {
        Self {
            tag: OutcomeTag::PasteError,
            path: path.to_path_buf(),
            message: error.to_string(),
            retry,
        }
    }
}

/// Executes the items of one transfer request sequentially.
pub struct TransferWorker {
    fs: Arc<dyn FileSystem>,
    stop: CancellationToken,
    progress: Arc<AtomicUsize>,
}

impl TransferWorker {
    /// Create a worker with a fresh stop token and progress counter.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            stop: CancellationToken::new(),
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use `stop` to request a halt at the next item boundary.
    pub fn with_stop(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    /// Publish the number of items attempted through `progress`.
    pub fn with_progress(mut self, progress: Arc<AtomicUsize>) -> Self {
        self.progress = progress;
        self
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Transfer `items` in order. Moves when `delete_source` is set.
    pub fn run(&self, items: Vec<TransferItem>, delete_source: bool) -> TransferOutcome {
        let mut outcome = TransferOutcome::empty(OutcomeTag::FinishedAll);
        let mut items = items.into_iter();

        while let Some(item) = items.next() {
            if self.stop.is_cancelled() {
                debug!(item = %item.source.display(), "stop requested, halting");
                outcome.tag = OutcomeTag::ForcedToStop;
                outcome.remaining = std::iter::once(item).chain(items).collect();
                return outcome;
            }

            let step = panic::catch_unwind(AssertUnwindSafe(|| {
                self.transfer_one(&item, delete_source, &mut outcome)
            }))
            .unwrap_or_else(|payload| {
                Err(Halt {
                    tag: OutcomeTag::PasteError,
                    path: item.source.clone(),
                    message: format!("worker panicked: {}", panic_message(payload.as_ref())),
                    retry: true,
                })
            });

            self.progress.fetch_add(1, Ordering::Relaxed);

            if let Err(halt) = step {
                outcome.tag = halt.tag;
                outcome.halted = Some(HaltedItem {
                    path: halt.path,
                    message: halt.message,
                });
                outcome.remaining = if halt.retry {
                    std::iter::once(item).chain(items).collect()
                } else {
                    items.collect()
                };
                return outcome;
            }
        }

        outcome
    }

    fn transfer_one(
        &self,
        item: &TransferItem,
        delete_source: bool,
        outcome: &mut TransferOutcome,
    ) -> Result<(), Halt> {
        let fs = self.fs.as_ref();
        let source = &item.source;

        if !fs.exists(source) {
            debug!(source = %source.display(), "source vanished, skipping");
            return Ok(());
        }

        let source_is_dir = fs.is_dir(source);
        if source_is_dir && item.destination != *source && item.destination.starts_with(source) {
            let error = FsError::SourceIsAncestor {
                source_path: source.clone(),
                destination: item.destination.clone(),
            };
            warn!(%error, "refusing to copy a directory into itself");
            return Err(Halt::failed(source, error, true));
        }

        let mut destination = item.destination.clone();
        if fs.exists(&destination) {
            match item.policy {
                None => {
                    debug!(destination = %destination.display(), "unresolved conflict, halting");
                    return Err(Halt::conflict(item));
                }
                Some(ConflictPolicy::Skip) => {
                    outcome.skipped.push(item.pair());
                    return Ok(());
                }
                Some(ConflictPolicy::KeepBoth) => {
                    destination = keep_both_path(fs, &destination, source_is_dir)
                        .map_err(|e| Halt::failed(&item.destination, e, true))?;
                    debug!(destination = %destination.display(), "keeping both");
                }
                Some(ConflictPolicy::Replace) => {
                    if destination == *source {
                        outcome.not_pasted.push(item.pair());
                        return Ok(());
                    }
                    if source.starts_with(&destination) {
                        let error = FsError::DestinationIsAncestor {
                            source_path: source.clone(),
                            destination: destination.clone(),
                        };
                        warn!(%error, "refusing to replace a parent of the source");
                        return Err(Halt::failed(source, error, true));
                    }
                    fs.delete_item(&destination)
                        .map_err(|e| Halt::failed(&destination, e, true))?;
                }
            }
        }

        match fs.copy_item(source, &destination) {
            Ok(CopyStatus::Copied { bytes }) => outcome.bytes_transferred += bytes,
            Ok(CopyStatus::Unchanged) => {
                outcome
                    .not_pasted
                    .push(TransferPair::new(source.clone(), destination));
                return Ok(());
            }
            Err(error) => {
                warn!(source = %source.display(), %error, "copy failed");
                return Err(Halt::failed(source, error, true));
            }
        }

        outcome
            .pasted
            .push(TransferPair::new(source.clone(), destination));

        if delete_source {
            if let Err(error) = fs.delete_item(source) {
                warn!(source = %source.display(), %error, "copied but could not remove source");
                return Err(Halt::failed(source, error, false));
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
