//! noteforge: AI-assisted lesson-notes generation backend.
//!
//! This library provides the job queue, worker pipeline and progress
//! streaming behind the notes generator: submissions are deduplicated and
//! queued through a shared store, a detached worker runs a two-phase
//! generation pipeline, and per-client SSE relays forward live progress.

// Core modules
pub mod api;
pub mod cli;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod prompts;
pub mod utils;

// Re-export commonly used error types
pub use error::LlmError;
pub use jobs::{StoreError, WorkerError};
