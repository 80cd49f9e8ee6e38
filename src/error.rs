//! Error types shared across noteforge subsystems.
//!
//! Subsystem-local errors (`StoreError`, `WorkerError`, `ApiError`) are
//! defined next to the code that produces them; the LLM error lives here
//! because both the client and the worker pipeline speak it.

use thiserror::Error;

/// Errors that can occur during content-generation calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse model response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}
