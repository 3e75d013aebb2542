//! Transfer requests submitted to the pool.

use std::fmt;

use ferry_core::{TransferItem, TransferOutcome};

/// Callback receiving the outcome of a request. Runs on the supervisory thread.
pub type CompletionCallback = Box<dyn FnOnce(TransferOutcome) + Send>;

/// A batch of items transferred together by one worker.
///
/// Immutable once built; [`crate::TransferPool::submit`] consumes it.
pub struct TransferRequest {
    items: Vec<TransferItem>,
    delete_source: bool,
    on_complete: Option<CompletionCallback>,
    description: String,
}

impl TransferRequest {
    /// Create a request. `delete_source` turns the copy into a move.
    pub fn new(items: Vec<TransferItem>, delete_source: bool) -> Self {
        let description = describe(&items, delete_source);
        Self {
            items,
            delete_source,
            on_complete: None,
            description,
        }
    }

    /// Set the callback receiving the outcome.
    pub fn on_complete(mut self, callback: impl FnOnce(TransferOutcome) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Replace the generated description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn delete_source(&self) -> bool {
        self.delete_source
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn into_parts(self) -> RequestParts {
        RequestParts {
            items: self.items,
            delete_source: self.delete_source,
            on_complete: self.on_complete,
            description: self.description,
        }
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("items", &self.items)
            .field("delete_source", &self.delete_source)
            .field("on_complete", &self.on_complete.is_some())
            .field("description", &self.description)
            .finish()
    }
}

pub(crate) struct RequestParts {
    pub items: Vec<TransferItem>,
    pub delete_source: bool,
    pub on_complete: Option<CompletionCallback>,
    pub description: String,
}

fn describe(items: &[TransferItem], delete_source: bool) -> String {
    let action = if delete_source { "Moving" } else { "Copying" };
    match items.first().and_then(|item| item.destination.parent()) {
        Some(dir) => format!("{} {} items to {}", action, items.len(), dir.display()),
        None => format!("{} {} items", action, items.len()),
    }
}
