//! Redis implementation of the queue store contract.
//!
//! Command mapping:
//!
//! - `push` / `pop_blocking` → `LPUSH` / `BRPOP` (FIFO list order, atomic
//!   destructive pop)
//! - `get` / `set_ex` → `GET` / `SET .. EX`
//! - `publish` / `subscribe` → `PUBLISH` / `SUBSCRIBE`
//!
//! Regular commands go through a shared [`ConnectionManager`], which
//! reconnects automatically. Every subscription opens its own dedicated
//! connection, because a Redis connection in subscriber mode cannot issue
//! regular commands and each relay must be able to tear down independently.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::store::{QueueStore, StoreError, Subscription, SUBSCRIPTION_BUFFER};

/// Redis-backed queue store.
///
/// Cheap to clone; clones share the underlying connection manager.
#[derive(Clone)]
pub struct RedisStore {
    /// Client kept for opening dedicated subscriber connections.
    client: redis::Client,
    /// Shared connection for regular commands (handles reconnection).
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis and returns a ready store handle.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, manager })
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, list: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.lpush::<_, _, ()>(list, payload).await?;
        Ok(())
    }

    async fn pop_blocking(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        // BRPOP replies with (list, element) or nil on timeout.
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(list)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|(_, payload)| payload))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, StoreError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = channel.to_string();

        // Bridge the pub/sub connection onto the subscription channel.
        // Quits when the server side ends or the subscriber is dropped;
        // dropping the message stream closes the dedicated connection,
        // which unsubscribes server-side.
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    maybe = messages.next() => {
                        let Some(msg) = maybe else { break };
                        match msg.get_payload::<String>() {
                            Ok(payload) => {
                                if tx.send(payload).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                warn!(channel = %channel, error = %err, "dropping undecodable pub/sub payload");
                            }
                        }
                    }
                }
            }
            debug!(channel = %channel, "subscriber bridge closed");
        });

        Ok(Subscription::new(rx))
    }
}
