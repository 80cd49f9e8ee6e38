//! LLM integration for noteforge.
//!
//! This module provides the client used for AI-assisted lesson-content
//! generation. The [`ContentGenerator`] trait is the seam between the worker
//! pipeline and the model backend:
//!
//! ```ignore
//! use noteforge::llm::{ContentGenerator, GeminiClient};
//!
//! let client = GeminiClient::from_env()?;
//! let outline = client.generate("List the key subtopics of ...").await?;
//! ```
//!
//! Production uses [`GeminiClient`]; tests substitute scripted generators.

pub mod gemini;

pub use gemini::{ContentGenerator, GeminiClient, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
