//! Handlers for the `/api/notes` resource.
//!
//! Three endpoints cover the job lifecycle: `start` submits (or reuses) a
//! job, `status` polls persisted state, and `stream` relays live progress
//! events as SSE. The stream handler is the per-client relay: it opens its
//! own subscription, replays persisted state for late clients, then
//! forwards events until the job reaches a terminal state or the client
//! disconnects.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::jobs::{JobPhase, JobStatus, NotesQueue, NotesResult, ProgressEvent, StoreError};

/// Placeholder message for clients that connect before any live event.
const PENDING_MESSAGE: &str = "Job queued and waiting to be processed.";

/// Failure detail for clients that connect after a job already failed.
const PREVIOUSLY_FAILED_MESSAGE: &str = "Job previously failed.";

/// Request body for `POST /api/notes/start`.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub subject: String,
    pub topic: String,
}

/// Response body for `POST /api/notes/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: Uuid,
    /// Relative URL of the SSE stream for this job.
    pub stream_url: String,
}

/// Response body for `GET /api/notes/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Persisted status, or `null` for unknown and expired jobs.
    pub status: Option<JobStatus>,
    /// The cached result once `status` is `completed`, else `null`.
    pub data: Option<NotesResult>,
}

/// Query parameters for the status and stream endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub job_id: Uuid,
}

/// POST /api/notes/start
///
/// Submits a generation job. Repeated submissions for the same
/// subject/topic within the dedup window return the existing job instead
/// of enqueueing a new one; a fresh enqueue answers `202 Accepted`, a
/// reused job answers `200 OK`.
pub async fn start_notes(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<(StatusCode, Json<StartResponse>)> {
    if request.subject.trim().is_empty() {
        return Err(ApiError::BadRequest("subject is required".to_string()));
    }
    if request.topic.trim().is_empty() {
        return Err(ApiError::BadRequest("topic is required".to_string()));
    }

    let submission = state
        .submitter
        .submit(&request.subject, &request.topic)
        .await?;

    let status = if submission.reused {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(StartResponse {
            job_id: submission.job_id,
            stream_url: format!("/api/notes/stream?jobId={}", submission.job_id),
        }),
    ))
}

/// GET /api/notes/status?jobId=...
///
/// Polling alternative to the stream.
pub async fn notes_status(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state.queue.status(query.job_id).await?;
    let data = match status {
        Some(JobStatus::Completed) => state.queue.result(query.job_id).await?,
        _ => None,
    };

    Ok(Json(StatusResponse { status, data }))
}

/// GET /api/notes/stream?jobId=...
///
/// Relays progress events for one job to one client as SSE `update`
/// events. The connection closes after a terminal event; dropping it
/// (client disconnect) tears down the subscription without touching the
/// job itself.
pub async fn stream_notes(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = query.job_id;

    // Subscribe before the snapshot read; an event published between the
    // two is buffered in the subscription instead of being lost.
    let mut events = state.queue.subscribe(job_id).await?;
    let snapshot = connect_snapshot(&state.queue, job_id).await?;

    let event_stream = stream! {
        let snapshot_terminal = snapshot.is_terminal();
        match encode_event(&snapshot) {
            Ok(sse) => yield Ok::<Event, Infallible>(sse),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to encode snapshot event");
                return;
            }
        }
        if snapshot_terminal {
            return;
        }

        while let Some(event) = events.next_event().await {
            let terminal = event.is_terminal();
            match encode_event(&event) {
                Ok(sse) => yield Ok(sse),
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to encode stream event");
                    break;
                }
            }
            if terminal {
                break;
            }
        }

        debug!(job_id = %job_id, "Stream closed");
    };

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()))
}

/// Builds the synthetic event a freshly connected client receives.
///
/// Jobs that already finished replay their terminal state from the store:
/// `completed` carries the cached result (or `null` if it expired),
/// `failed` carries a fixed error detail. Everything else, including jobs
/// the store no longer knows, gets a pending placeholder and the
/// connection stays open for live events.
async fn connect_snapshot(
    queue: &NotesQueue,
    job_id: Uuid,
) -> Result<ProgressEvent, StoreError> {
    let event = match queue.status(job_id).await? {
        Some(JobStatus::Completed) => {
            let result = queue.result(job_id).await?;
            ProgressEvent::new(job_id, 1.0, JobPhase::Completed { result })
        }
        Some(JobStatus::Failed) => ProgressEvent::new(
            job_id,
            0.0,
            JobPhase::Failed {
                error: PREVIOUSLY_FAILED_MESSAGE.to_string(),
            },
        ),
        _ => ProgressEvent::new(
            job_id,
            0.0,
            JobPhase::Pending {
                message: PENDING_MESSAGE.to_string(),
            },
        ),
    };

    Ok(event)
}

/// Encodes a progress event as an SSE `update` event.
fn encode_event(event: &ProgressEvent) -> Result<Event, axum::Error> {
    Event::default().event("update").json_data(event)
}

/// Budget for the request/response endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Mount the notes generator routes (intended under `/api/notes`).
///
/// The timeout layer only wraps the routes registered before it: the
/// stream route is added afterwards because an SSE connection is expected
/// to outlive any fixed request budget.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_notes))
        .route("/status", get(notes_status))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .route("/stream", get(stream_notes))
}
