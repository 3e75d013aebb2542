//! Undoable transfer batches.
//!
//! A batch owns the realized pairs of one completed transfer. Destinations
//! renamed by keep-both are recorded as realized, so undo restores the
//! original names.

use std::fmt;
use std::sync::Arc;

use ferry_core::{ConflictPolicy, FileSystem, TransferItem, TransferPair};
use tracing::{debug, warn};

use crate::host::ActionHost;
use crate::undo::{Action, ActionKind, HistoryContext};

fn target_dir(pairs: &[TransferPair]) -> String {
    pairs
        .first()
        .and_then(|p| p.destination.parent())
        .map(|dir| dir.display().to_string())
        .unwrap_or_default()
}

/// Pairs whose source is present and whose destination is free.
fn replayable(
    fs: &dyn FileSystem,
    pairs: impl Iterator<Item = TransferPair>,
) -> Vec<TransferItem> {
    pairs
        .filter(|pair| fs.exists(&pair.source) && !fs.exists(&pair.destination))
        .map(|pair| {
            TransferItem::new(pair.source, pair.destination).with_policy(ConflictPolicy::Skip)
        })
        .collect()
}

fn submit(cx: &mut dyn HistoryContext, items: Vec<TransferItem>, delete_source: bool) {
    if items.is_empty() {
        debug!("nothing left to replay");
        return;
    }
    if let Err(error) = cx.transfer(items, delete_source) {
        warn!(%error, "could not start history transfer");
    }
}

/// Items moved by one transfer.
pub struct MoveBatch {
    pairs: Vec<TransferPair>,
    host: Arc<dyn ActionHost>,
}

impl MoveBatch {
    pub fn new(pairs: Vec<TransferPair>, host: Arc<dyn ActionHost>) -> Self {
        Self { pairs, host }
    }

    pub fn pairs(&self) -> &[TransferPair] {
        &self.pairs
    }
}

impl Action for MoveBatch {
    fn kind(&self) -> ActionKind {
        ActionKind::MoveBatch
    }

    fn description(&self) -> String {
        format!("Move {} items to {}", self.pairs.len(), target_dir(&self.pairs))
    }

    fn undo(&mut self, cx: &mut dyn HistoryContext) {
        let items = replayable(cx.fs(), self.pairs.iter().map(TransferPair::reversed));
        submit(cx, items, true);
        self.host.refresh_all();
    }

    fn redo(&mut self, cx: &mut dyn HistoryContext) {
        let items = replayable(cx.fs(), self.pairs.iter().cloned());
        submit(cx, items, true);
        self.host.refresh_all();
    }
}

/// Items copied by one transfer.
pub struct CopyBatch {
    pairs: Vec<TransferPair>,
    host: Arc<dyn ActionHost>,
}

impl CopyBatch {
    pub fn new(pairs: Vec<TransferPair>, host: Arc<dyn ActionHost>) -> Self {
        Self { pairs, host }
    }

    pub fn pairs(&self) -> &[TransferPair] {
        &self.pairs
    }
}

impl Action for CopyBatch {
    fn kind(&self) -> ActionKind {
        ActionKind::CopyBatch
    }

    fn description(&self) -> String {
        format!("Copy {} items to {}", self.pairs.len(), target_dir(&self.pairs))
    }

    /// Sends every realized copy to the trash.
    fn undo(&mut self, cx: &mut dyn HistoryContext) {
        let fs = cx.fs();
        for pair in &self.pairs {
            if !fs.exists(&pair.destination) {
                debug!(path = %pair.destination.display(), "copy already gone");
                continue;
            }
            if let Err(error) = fs.move_to_trash(&pair.destination) {
                warn!(path = %pair.destination.display(), %error, "could not trash copy");
            }
        }
        self.host.refresh_all();
    }

    fn redo(&mut self, cx: &mut dyn HistoryContext) {
        let items = replayable(cx.fs(), self.pairs.iter().cloned());
        submit(cx, items, false);
        self.host.refresh_all();
    }
}

impl fmt::Debug for MoveBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveBatch")
            .field("pairs", &self.pairs)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for CopyBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyBatch")
            .field("pairs", &self.pairs)
            .finish_non_exhaustive()
    }
}
