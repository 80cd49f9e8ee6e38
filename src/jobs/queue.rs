//! Typed facade over the queue store.
//!
//! `NotesQueue` owns the key layout and TTL policy and translates between
//! domain types and the store's string payloads. All keys live under one
//! namespace (default `notes`):
//!
//! - `{ns}:queue`: the job list
//! - `{ns}:status:{jobId}`: persisted status string
//! - `{ns}:data:{jobId}`: cached result payload
//! - `{ns}:job:{fingerprint}`: dedup binding to an existing job
//! - `{ns}:events:{jobId}`: progress pub/sub channel

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use super::job::{JobStatus, NotesJob, NotesResult, ProgressEvent};
use super::store::{QueueStore, StoreError, Subscription};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "notes";

/// TTL for non-terminal status entries (one day).
pub const ACTIVE_STATUS_TTL: Duration = Duration::from_secs(86_400);

/// TTL for fingerprint dedup bindings (one day).
pub const DEDUP_TTL: Duration = Duration::from_secs(86_400);

/// TTL for terminal status entries and cached results (one hour).
pub const RESULT_TTL: Duration = Duration::from_secs(3_600);

/// Typed access to the job queue, per-job state and progress channels.
///
/// Cheap to clone; clones share the injected store handle.
#[derive(Clone)]
pub struct NotesQueue {
    store: Arc<dyn QueueStore>,
    namespace: String,
    queue_key: String,
}

impl NotesQueue {
    /// Creates a queue facade over an injected store handle.
    pub fn new(store: Arc<dyn QueueStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            queue_key: format!("{}:queue", namespace),
        }
    }

    fn status_key(&self, job_id: Uuid) -> String {
        format!("{}:status:{}", self.namespace, job_id)
    }

    fn result_key(&self, job_id: Uuid) -> String {
        format!("{}:data:{}", self.namespace, job_id)
    }

    fn dedup_key(&self, fingerprint: &str) -> String {
        format!("{}:job:{}", self.namespace, fingerprint)
    }

    fn channel(&self, job_id: Uuid) -> String {
        format!("{}:events:{}", self.namespace, job_id)
    }

    /// Pushes a job onto the queue list.
    pub async fn enqueue(&self, job: &NotesJob) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        self.store.push(&self.queue_key, &payload).await
    }

    /// Pops the next job, blocking up to `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout expires with the queue empty. A
    /// payload that does not decode as a job surfaces as a serialization
    /// error; the payload is already off the list, so the caller can log
    /// and move on without wedging the queue.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<NotesJob>, StoreError> {
        match self.store.pop_blocking(&self.queue_key, timeout).await? {
            Some(payload) => {
                let job: NotesJob = serde_json::from_str(&payload)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Reads a job's persisted status.
    ///
    /// Missing, expired and unrecognized entries all read as `None`.
    pub async fn status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        let Some(raw) = self.store.get(&self.status_key(job_id)).await? else {
            return Ok(None);
        };
        let status = JobStatus::parse(&raw);
        if status.is_none() {
            warn!(job_id = %job_id, value = %raw, "unrecognized status string in store");
        }
        Ok(status)
    }

    /// Persists a job's status with the TTL appropriate to its state.
    pub async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        let ttl = if status.is_terminal() {
            RESULT_TTL
        } else {
            ACTIVE_STATUS_TTL
        };
        self.store
            .set_ex(&self.status_key(job_id), status.as_str(), ttl)
            .await
    }

    /// Reads a job's cached result, `None` when absent or expired.
    pub async fn result(&self, job_id: Uuid) -> Result<Option<NotesResult>, StoreError> {
        match self.store.get(&self.result_key(job_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Writes a job's final result.
    pub async fn store_result(
        &self,
        job_id: Uuid,
        result: &NotesResult,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(result)?;
        self.store
            .set_ex(&self.result_key(job_id), &payload, RESULT_TTL)
            .await
    }

    /// Looks up the job currently bound to a parameter fingerprint.
    pub async fn bound_job(&self, fingerprint: &str) -> Result<Option<Uuid>, StoreError> {
        let Some(raw) = self.store.get(&self.dedup_key(fingerprint)).await? else {
            return Ok(None);
        };
        match raw.parse::<Uuid>() {
            Ok(job_id) => Ok(Some(job_id)),
            Err(_) => {
                warn!(fingerprint = %fingerprint, value = %raw, "unparseable dedup binding in store");
                Ok(None)
            }
        }
    }

    /// Binds a parameter fingerprint to a job id.
    pub async fn bind_fingerprint(
        &self,
        fingerprint: &str,
        job_id: Uuid,
    ) -> Result<(), StoreError> {
        self.store
            .set_ex(
                &self.dedup_key(fingerprint),
                &job_id.to_string(),
                DEDUP_TTL,
            )
            .await
    }

    /// Publishes a progress event on its job's channel.
    pub async fn publish_event(&self, event: &ProgressEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        self.store.publish(&self.channel(event.job_id), &payload).await
    }

    /// Opens a private, typed subscription to a job's progress channel.
    pub async fn subscribe(&self, job_id: Uuid) -> Result<ProgressStream, StoreError> {
        let subscription = self.store.subscribe(&self.channel(job_id)).await?;
        Ok(ProgressStream::new(subscription))
    }
}

/// Typed view over a job's progress channel.
///
/// Decodes each payload into a [`ProgressEvent`]; payloads that do not
/// decode are logged and skipped so one bad message cannot wedge a client
/// stream. Dropping the stream tears the underlying subscription down.
#[derive(Debug)]
pub struct ProgressStream {
    subscription: Subscription,
}

impl ProgressStream {
    fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// Waits for the next decodable event; `None` once the channel closes.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        while let Some(payload) = self.subscription.next_payload().await {
            match serde_json::from_str(&payload) {
                Ok(event) => return Some(event),
                Err(err) => {
                    warn!(error = %err, "skipping undecodable progress payload");
                }
            }
        }
        None
    }
}
