//! Supervisory-side orchestration of transfers, conflicts and history.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use ferry_core::{
    ConflictPolicy, EngineConfig, FileSystem, LocalFileSystem, OutcomeTag, TransferItem,
    TransferOutcome,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::batch::{CopyBatch, MoveBatch};
use crate::conflict::{ConflictPrompt, PromptId, Resolution, TransferOrigin, detect_conflicts};
use crate::error::{EngineError, PoolError};
use crate::host::ActionHost;
use crate::pool::{RequestId, Submission, TransferPool};
use crate::request::TransferRequest;
use crate::undo::{Action, ActionLog, HistoryContext};

/// Result of a paste or of a resolved prompt.
#[derive(Debug)]
pub enum PasteStatus {
    /// The transfer was handed to the pool.
    Submitted(Submission),
    /// Conflicts must be resolved with [`Engine::resolve`] first.
    NeedsResolution(ConflictPrompt),
    /// There was nothing to paste.
    Nothing,
    /// The prompt was resolved with [`Resolution::Cancel`].
    Cancelled,
}

/// Notifications produced while pumping completions.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A request finished, whatever its tag.
    Completed {
        id: RequestId,
        outcome: TransferOutcome,
        moved: bool,
    },
    /// A transfer halted on a conflict; answer with [`Engine::resolve`].
    ConflictsDetected(ConflictPrompt),
    /// A transfer halted on a failed copy or delete.
    TransferFailed {
        id: RequestId,
        item: PathBuf,
        message: String,
    },
}

struct Completion {
    id: Arc<OnceLock<RequestId>>,
    outcome: TransferOutcome,
    delete_source: bool,
    origin: TransferOrigin,
}

/// The pool plus what history actions need to replay transfers.
struct EngineCore {
    pool: TransferPool,
    fs: Arc<dyn FileSystem>,
    completions_tx: mpsc::UnboundedSender<Completion>,
}

impl EngineCore {
    fn submit(
        &mut self,
        items: Vec<TransferItem>,
        delete_source: bool,
        origin: TransferOrigin,
    ) -> Result<Submission, PoolError> {
        let id = Arc::new(OnceLock::new());
        let callback_id = Arc::clone(&id);
        let tx = self.completions_tx.clone();

        let request = TransferRequest::new(items, delete_source).on_complete(move |outcome| {
            let _ = tx.send(Completion {
                id: callback_id,
                outcome,
                delete_source,
                origin,
            });
        });

        let submission = self.pool.submit(request)?;
        let _ = id.set(submission.id());
        Ok(submission)
    }
}

impl HistoryContext for EngineCore {
    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    fn transfer(
        &mut self,
        items: Vec<TransferItem>,
        delete_source: bool,
    ) -> Result<Submission, PoolError> {
        self.submit(items, delete_source, TransferOrigin::History)
    }
}

/// Runs transfers on a [`TransferPool`], turns halts into conflict prompts
/// and records completed user transfers in an [`ActionLog`].
pub struct Engine {
    core: EngineCore,
    host: Arc<dyn ActionHost>,
    history: ActionLog,
    prompts: HashMap<PromptId, ConflictPrompt>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    next_prompt: u64,
    default_policy: Option<ConflictPolicy>,
}

impl Engine {
    /// Create an engine over the local filesystem.
    pub fn new(config: &EngineConfig, host: Arc<dyn ActionHost>) -> Result<Self, EngineError> {
        let fs = match &config.trash_dir {
            Some(dir) => LocalFileSystem::with_trash_dir(dir),
            None => LocalFileSystem::new(),
        };
        Self::with_fs(Arc::new(fs), config, host)
    }

    /// Create an engine over any filesystem collaborator.
    pub fn with_fs(
        fs: Arc<dyn FileSystem>,
        config: &EngineConfig,
        host: Arc<dyn ActionHost>,
    ) -> Result<Self, EngineError> {
        let pool = TransferPool::new(Arc::clone(&fs), config)?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            core: EngineCore {
                pool,
                fs,
                completions_tx,
            },
            host,
            history: ActionLog::new(config.history_limit),
            prompts: HashMap::new(),
            completions_rx,
            next_prompt: 1,
            default_policy: config.default_policy,
        })
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.core.fs)
    }

    pub fn host(&self) -> Arc<dyn ActionHost> {
        Arc::clone(&self.host)
    }

    pub fn pool(&self) -> &TransferPool {
        &self.core.pool
    }

    pub fn history(&self) -> &ActionLog {
        &self.history
    }

    /// Prompts waiting for a resolution.
    pub fn pending_prompts(&self) -> impl Iterator<Item = &ConflictPrompt> {
        self.prompts.values()
    }

    /// Paste `sources` into `destination`, moving them if `delete_source`.
    ///
    /// Items pasted into their own directory are duplicated under a fresh
    /// name; a move into its own directory is skipped.
    pub fn paste(
        &mut self,
        sources: &[PathBuf],
        destination: &Path,
        delete_source: bool,
    ) -> Result<PasteStatus, EngineError> {
        let items: Vec<TransferItem> = sources
            .iter()
            .map(|source| {
                let item = TransferItem::into_directory(source.clone(), destination);
                if source.parent() != Some(destination) {
                    item
                } else if delete_source {
                    item.with_policy(ConflictPolicy::Skip)
                } else {
                    item.with_policy(ConflictPolicy::KeepBoth)
                }
            })
            .collect();
        self.submit_items(items, delete_source)
    }

    /// Submit precomputed items, prompting first if any destination exists.
    pub fn submit_items(
        &mut self,
        mut items: Vec<TransferItem>,
        delete_source: bool,
    ) -> Result<PasteStatus, EngineError> {
        if items.is_empty() {
            return Ok(PasteStatus::Nothing);
        }

        let conflicts = detect_conflicts(self.core.fs.as_ref(), &items)?;
        if !conflicts.is_empty() {
            match self.default_policy {
                Some(policy) => {
                    debug!(%policy, conflicts = conflicts.len(), "applying default policy");
                    for item in items.iter_mut().filter(|item| item.policy.is_none()) {
                        item.policy = Some(policy);
                    }
                }
                None => {
                    debug!(conflicts = conflicts.len(), "asking for resolution");
                    let prompt = ConflictPrompt {
                        id: self.next_prompt_id(),
                        conflicts,
                        items,
                        delete_source,
                        origin: TransferOrigin::User,
                    };
                    self.prompts.insert(prompt.id, prompt.clone());
                    return Ok(PasteStatus::NeedsResolution(prompt));
                }
            }
        }

        let submission = self
            .core
            .submit(items, delete_source, TransferOrigin::User)?;
        Ok(PasteStatus::Submitted(submission))
    }

    /// Answer a pending prompt and submit what remains.
    pub fn resolve(
        &mut self,
        id: PromptId,
        resolution: Resolution,
    ) -> Result<PasteStatus, EngineError> {
        let prompt = self
            .prompts
            .remove(&id)
            .ok_or(EngineError::UnknownPrompt { id })?;
        let delete_source = prompt.delete_source;
        let origin = prompt.origin;

        match prompt.resolve(resolution) {
            None => {
                info!(prompt = %id, "paste cancelled");
                Ok(PasteStatus::Cancelled)
            }
            Some(items) => {
                let submission = self.core.submit(items, delete_source, origin)?;
                Ok(PasteStatus::Submitted(submission))
            }
        }
    }

    /// Stop a running or queued transfer.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        self.core.pool.cancel(id)
    }

    /// Undo the most recent action, returning its description.
    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.core)
    }

    /// Redo the most recently undone action.
    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.core)
    }

    /// Record an action performed outside the engine (create, rename).
    pub fn record(&mut self, action: Box<dyn Action>) {
        self.history.add(action);
    }

    /// Handle finished transfers without blocking.
    pub fn pump(&mut self) -> Vec<EngineEvent> {
        self.core.pool.poll_completions();
        self.drain_completions()
    }

    /// Wait until no transfer is running or queued.
    ///
    /// Transfers started by undo/redo in the meantime are waited for too.
    pub async fn wait_idle(&mut self) -> Vec<EngineEvent> {
        let mut events = self.pump();
        while self.core.pool.next_completion().await.is_some() {
            events.extend(self.drain_completions());
        }
        events
    }

    /// Tear the pool down and report the last outcomes.
    pub fn shutdown(&mut self) -> Vec<EngineEvent> {
        self.core.pool.teardown();
        let events = self.drain_completions();
        self.prompts.clear();
        events
    }

    fn next_prompt_id(&mut self) -> PromptId {
        let id = PromptId(self.next_prompt);
        self.next_prompt += 1;
        id
    }

    fn drain_completions(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.on_completion(completion, &mut events);
        }
        events
    }

    fn on_completion(&mut self, completion: Completion, events: &mut Vec<EngineEvent>) {
        let Completion {
            id,
            outcome,
            delete_source,
            origin,
        } = completion;
        let id = id.get().copied().unwrap_or_default();

        self.host.refresh_all();
        self.select_pasted(&outcome);

        if origin == TransferOrigin::User && !outcome.pasted.is_empty() {
            let pairs = outcome.pasted.clone();
            let action: Box<dyn Action> = if delete_source {
                Box::new(MoveBatch::new(pairs, Arc::clone(&self.host)))
            } else {
                Box::new(CopyBatch::new(pairs, Arc::clone(&self.host)))
            };
            self.history.add(action);
        }

        let follow_up = match outcome.tag {
            OutcomeTag::ItemAlreadyExist => {
                let prompt_id = self.next_prompt_id();
                ConflictPrompt::from_halted(
                    prompt_id,
                    self.core.fs.as_ref(),
                    &outcome,
                    delete_source,
                    origin,
                )
                .map(|prompt| {
                    self.prompts.insert(prompt.id, prompt.clone());
                    EngineEvent::ConflictsDetected(prompt)
                })
            }
            OutcomeTag::PasteError => {
                outcome
                    .halted
                    .as_ref()
                    .map(|halted| EngineEvent::TransferFailed {
                        id,
                        item: halted.path.clone(),
                        message: halted.message.clone(),
                    })
            }
            OutcomeTag::FinishedAll | OutcomeTag::ForcedToStop => None,
        };

        events.push(EngineEvent::Completed {
            id,
            outcome,
            moved: delete_source,
        });
        events.extend(follow_up);
    }

    /// Select the pasted names in each destination directory.
    fn select_pasted(&self, outcome: &TransferOutcome) {
        let mut by_dir: BTreeMap<&Path, Vec<String>> = BTreeMap::new();
        for pair in &outcome.pasted {
            if let Some(dir) = pair.destination.parent() {
                by_dir.entry(dir).or_default().push(pair.destination_name());
            }
        }
        for (dir, names) in by_dir {
            self.host.select_items_in_path(dir, &names);
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pool", &self.core.pool)
            .field("history", &self.history)
            .field("prompts", &self.prompts.len())
            .finish_non_exhaustive()
    }
}
