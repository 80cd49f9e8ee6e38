//! In-process implementation of the queue store contract.
//!
//! Backs the test suite and single-process development runs where no Redis
//! server is available. Semantics mirror the Redis backend: FIFO list pop,
//! expiring keys, and best-effort broadcast that silently drops a message
//! when nobody is subscribed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tracing::warn;

use super::store::{QueueStore, StoreError, Subscription, SUBSCRIPTION_BUFFER};

/// In-memory queue store.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    lists: Mutex<HashMap<String, ListState>>,
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

/// One named list plus the wakeup signal for its blocked poppers.
///
/// Each list gets its own `Notify` so a push can never wake a popper
/// blocked on a different list.
#[derive(Default)]
struct ListState {
    items: VecDeque<String>,
    signal: Arc<Notify>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, list: &str, payload: &str) -> Result<(), StoreError> {
        let signal = {
            let mut lists = self.inner.lists.lock().await;
            let state = lists.entry(list.to_string()).or_default();
            state.items.push_back(payload.to_string());
            state.signal.clone()
        };
        signal.notify_one();
        Ok(())
    }

    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Check under the lock and take this list's signal handle in
            // one go: a push landing after the check stores a wakeup
            // permit on exactly this signal, so nothing is missed.
            let signal = {
                let mut lists = self.inner.lists.lock().await;
                let state = lists.entry(list.to_string()).or_default();
                if let Some(payload) = state.items.pop_front() {
                    return Ok(Some(payload));
                }
                state.signal.clone()
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            tokio::select! {
                _ = signal.notified() => {}
                _ = tokio::time::sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.inner.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.inner.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut channels = self.inner.channels.lock().await;
        if let Some(sender) = channels.get(channel) {
            if sender.send(payload.to_string()).is_err() {
                // Last subscriber is gone; drop the channel entry.
                channels.remove(channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let mut rx = {
            let mut channels = self.inner.channels.lock().await;
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
                .subscribe()
        };

        let (tx, out) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    result = rx.recv() => match result {
                        Ok(payload) => {
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber lagged; progress messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(Subscription::new(out))
    }
}
