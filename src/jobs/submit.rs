//! Idempotent job submission.
//!
//! The submitter deduplicates against an existing job for the same
//! parameters before enqueueing anything: within the dedup TTL, identical
//! requests converge on a single execution. A binding whose job already
//! failed, or whose status entry has expired, is treated as stale and
//! replaced by a fresh job.

use tracing::{debug, info};
use uuid::Uuid;

use super::job::{fingerprint, JobStatus, NotesJob};
use super::queue::NotesQueue;
use super::store::StoreError;

/// Outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub job_id: Uuid,
    /// Whether an existing job was reused instead of enqueueing a new one.
    pub reused: bool,
}

/// Accepts generation requests and turns them into queued jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    queue: NotesQueue,
}

impl JobSubmitter {
    /// Creates a submitter over the given queue facade.
    pub fn new(queue: NotesQueue) -> Self {
        Self { queue }
    }

    /// Submits a generation request.
    ///
    /// Reuses the job already bound to the parameter fingerprint when its
    /// status is readable and not `failed`; otherwise enqueues a fresh job
    /// and rebinds the fingerprint.
    ///
    /// # Errors
    ///
    /// Store unavailability propagates to the caller; nothing is retried
    /// here.
    pub async fn submit(&self, subject: &str, topic: &str) -> Result<Submission, StoreError> {
        let fingerprint = fingerprint(subject, topic);

        if let Some(existing) = self.queue.bound_job(&fingerprint).await? {
            match self.queue.status(existing).await? {
                Some(status) if status != JobStatus::Failed => {
                    debug!(job_id = %existing, status = %status, "reusing existing job");
                    return Ok(Submission {
                        job_id: existing,
                        reused: true,
                    });
                }
                Some(_) => {
                    info!(job_id = %existing, "bound job failed; submitting a replacement");
                }
                None => {
                    info!(job_id = %existing, "bound job status expired; submitting a replacement");
                }
            }
        }

        let job = NotesJob::new(subject, topic);
        let job_id = job.job_id;

        // The binding goes last; it must never point at a job the store
        // has no queue entry or status for.
        self.queue.enqueue(&job).await?;
        self.queue.set_status(job_id, JobStatus::Pending).await?;
        self.queue.bind_fingerprint(&fingerprint, job_id).await?;

        info!(job_id = %job_id, subject, topic, "job enqueued");
        Ok(Submission {
            job_id,
            reused: false,
        })
    }
}
