use std::sync::Arc;

use crate::jobs::{JobSubmitter, NotesQueue, QueueStore};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (both fields share the same store handle).
#[derive(Clone)]
pub struct AppState {
    /// Deduplicating job submission.
    pub submitter: JobSubmitter,
    /// Typed store access for status reads and stream subscriptions.
    pub queue: NotesQueue,
}

impl AppState {
    /// Builds handler state over an injected store handle.
    pub fn new(store: Arc<dyn QueueStore>, namespace: &str) -> Self {
        let queue = NotesQueue::new(store, namespace);
        Self {
            submitter: JobSubmitter::new(queue.clone()),
            queue,
        }
    }
}
