//! HTTP API for the notes generator.
//!
//! Exposes the three lifecycle endpoints plus a health probe:
//!
//! - `POST /api/notes/start` — submit (or reuse) a generation job
//! - `GET /api/notes/status?jobId=...` — poll persisted status and result
//! - `GET /api/notes/stream?jobId=...` — SSE relay of live progress events
//! - `GET /health` — liveness probe
//!
//! Handlers share an [`AppState`] holding the submitter and the queue
//! facade; the worker process runs separately and communicates with the
//! API only through the store.

pub mod error;
pub mod health;
pub mod notes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{build_app_router, serve};
pub use state::AppState;
