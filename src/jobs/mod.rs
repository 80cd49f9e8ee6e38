//! Job queue, worker and progress streaming for notes generation.
//!
//! This module holds the long-running half of the system:
//!
//! - **JobSubmitter**: deduplicating submission onto the queue
//! - **NotesQueue**: typed facade over the shared store (list, status keys,
//!   result cache, pub/sub channels)
//! - **NotesWorker**: the long-lived loop running the two-phase pipeline
//! - **QueueStore**: the four-primitive store contract, with Redis and
//!   in-memory implementations
//!
//! # Architecture
//!
//! ```text
//!    ┌────────────┐  enqueue   ┌──────────────┐  blocking pop  ┌────────────┐
//!    │  Submitter │───────────▶│ Queue Store  │───────────────▶│   Worker   │
//!    │ (HTTP API) │            │ (Redis list) │                │  (process) │
//!    └────────────┘            └──────┬───────┘                └─────┬──────┘
//!                                     │ status / result keys         │
//!                                     │◀──────────────────────────────┘
//!                                     │ publish per-job channel
//!                              ┌──────▼───────┐
//!                              │ Stream Relay │──▶ SSE to each client
//!                              └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use noteforge::jobs::{JobSubmitter, NotesQueue, NotesWorker, RedisStore, DEFAULT_NAMESPACE};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::broadcast;
//!
//! let store = Arc::new(RedisStore::connect("redis://localhost:6379").await?);
//! let queue = NotesQueue::new(store, DEFAULT_NAMESPACE);
//!
//! // Submit a job (idempotent per subject/topic within the dedup TTL)
//! let submitter = JobSubmitter::new(queue.clone());
//! let submission = submitter.submit("Biology", "Mitosis").await?;
//!
//! // Run a worker until shutdown
//! let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//! let worker = NotesWorker::new(queue, generator, shutdown_rx, Duration::from_secs(5));
//! let handle = tokio::spawn(worker.run());
//! ```
//!
//! # Delivery guarantees
//!
//! - **At-least-once queue**: the queue pop is atomic and destructive, so a
//!   job is processed by exactly one worker instance
//! - **Best-effort events**: progress publishes are dropped when nobody is
//!   subscribed; late clients recover through the persisted status snapshot
//! - **Single writer**: after submission only the worker writes a job's
//!   status and result

pub mod job;
pub mod memory;
pub mod queue;
pub mod redis;
pub mod store;
pub mod submit;
pub mod worker;

// Re-export main types for convenience
pub use job::{
    fingerprint, JobPhase, JobStatus, NotesJob, NotesResult, ProgressEvent, SubtopicNote,
    SubtopicOutline,
};
pub use memory::MemoryStore;
pub use queue::{NotesQueue, ProgressStream, DEFAULT_NAMESPACE};
pub use redis::RedisStore;
pub use store::{QueueStore, StoreError, Subscription};
pub use submit::{JobSubmitter, Submission};
pub use worker::{NotesWorker, WorkerError};
