//! Storage contract for the notes queue.
//!
//! Every piece of state the pipeline shares between processes goes through
//! four primitives:
//!
//! - push / blocking pop on a named list (the job queue)
//! - get / set-with-expiry on string keys (status, results, dedup bindings)
//! - publish / subscribe on named channels (progress events)
//!
//! [`RedisStore`](super::RedisStore) implements the contract for
//! production; [`MemoryStore`](super::MemoryStore) implements it in-process
//! for the test suite and single-process development. Store handles are
//! constructed explicitly and injected into whichever component needs them.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Buffer depth for per-subscriber message channels.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 64;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the backing store.
    #[error("store connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to encode or decode a stored payload.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The wire contract satisfied by every queue store backend.
///
/// Any store offering these four primitives (list, key-value with TTL,
/// pub/sub) can carry the pipeline. All methods are cancel-safe apart from
/// [`pop_blocking`](QueueStore::pop_blocking), which may consume an element
/// that is then dropped if the future is cancelled mid-pop.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Pushes a payload onto the named list.
    async fn push(&self, list: &str, payload: &str) -> Result<(), StoreError>;

    /// Pops the oldest payload from the named list, blocking up to
    /// `timeout`.
    ///
    /// The pop is atomic and destructive: concurrent consumers never
    /// receive the same payload. Returns `None` when the timeout expires
    /// with the list still empty.
    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Reads the value stored under a key, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value under a key with a time-to-live.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Publishes a payload on a named channel.
    ///
    /// Fire-and-forget: with no subscriber currently listening the payload
    /// is dropped. This is a best-effort broadcast, not a durable log.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Opens a private subscription to a named channel.
    ///
    /// Each call creates an independent subscriber, so one client's
    /// teardown never interferes with another's. Dropping the returned
    /// handle releases the backend's subscriber resources.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError>;
}

/// A private subscription to one channel.
///
/// Raw payloads arrive in publish order on an internal message channel
/// owned by this handle. Dropping the handle closes the channel; the
/// backend's feeder task notices and shuts down.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    /// Wraps a receiver fed by a backend's subscriber task.
    pub(crate) fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Waits for the next payload; `None` once the subscription is closed.
    pub async fn next_payload(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
