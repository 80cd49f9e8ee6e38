//! Worker loop for the notes generation pipeline.
//!
//! A [`NotesWorker`] blocks on the queue, pulls one job at a time and runs
//! the two-phase pipeline: one outline call, then one detail call per
//! subtopic, strictly in order. After each phase it persists the job status
//! and publishes a progress event. A failing job is marked `failed` and
//! never takes the loop down with it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::LlmError;
use crate::jobs::job::{JobPhase, JobStatus, NotesJob, NotesResult, ProgressEvent, SubtopicNote, SubtopicOutline};
use crate::jobs::queue::NotesQueue;
use crate::jobs::store::StoreError;
use crate::llm::ContentGenerator;
use crate::prompts::{subtopic_details_prompt, subtopics_prompt};
use crate::utils::json_extraction::{extract_json_array, JsonExtractionError};

/// Progress reported when a job is picked up.
const PROGRESS_STARTED: f64 = 0.0;
/// Progress reported while the outline call is in flight.
const PROGRESS_GENERATING_SUBTOPICS: f64 = 0.1;
/// Progress reported once the outline is parsed. Detail steps interpolate
/// linearly from here to 1.0.
const PROGRESS_SUBTOPICS_GENERATED: f64 = 0.2;

/// Delay before polling again after a queue error.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Errors that can occur while processing a single notes job.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The model backend failed to produce a completion.
    #[error("Content generation failed: {0}")]
    Generation(#[from] LlmError),

    /// The outline response contained no usable JSON array.
    #[error("Malformed outline response: {0}")]
    MalformedOutline(#[from] JsonExtractionError),

    /// The outline array did not match the expected `{name, description}`
    /// shape.
    #[error("Unexpected outline shape: {0}")]
    OutlineShape(#[from] serde_json::Error),

    /// The job store rejected a read or write.
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
}

/// A long-lived worker that consumes jobs from the queue.
pub struct NotesWorker {
    /// Queue the worker consumes jobs from and reports state through.
    queue: NotesQueue,
    /// Backend that generates outline and note content.
    generator: Arc<dyn ContentGenerator>,
    /// Receiver for shutdown signal.
    shutdown_rx: broadcast::Receiver<()>,
    /// Interval between poll attempts when the queue is empty.
    poll_interval: Duration,
}

impl NotesWorker {
    /// Creates a new worker.
    ///
    /// # Arguments
    ///
    /// * `queue` - Queue to consume jobs from
    /// * `generator` - Content-generation backend for both pipeline phases
    /// * `shutdown_rx` - Broadcast receiver signalling shutdown
    /// * `poll_interval` - How long each blocking pop waits before re-checking
    ///   for shutdown
    pub fn new(
        queue: NotesQueue,
        generator: Arc<dyn ContentGenerator>,
        shutdown_rx: broadcast::Receiver<()>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            generator,
            shutdown_rx,
            poll_interval,
        }
    }

    /// Main worker loop.
    ///
    /// Continuously polls for jobs and processes them until a shutdown
    /// signal is received. A job in flight when the signal arrives is
    /// finished before the loop exits.
    pub async fn run(mut self) {
        info!("Worker started, waiting for jobs");

        loop {
            // Check for shutdown signal (non-blocking)
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!("Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    // We missed some signals, but since it's shutdown, just check again
                    continue;
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    // No shutdown signal, continue processing
                }
            }

            // Try to dequeue a job
            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                }
                Ok(None) => {
                    // No job available, the dequeue already waited poll_interval
                    debug!("No jobs available");
                }
                Err(e) => {
                    error!(error = %e, "Failed to dequeue job");
                    // Wait before retrying on error
                    tokio::time::sleep(QUEUE_ERROR_BACKOFF).await;
                }
            }
        }

        info!("Worker stopped");
    }

    /// Processes a single job to a terminal state.
    ///
    /// Errors are contained here: a failing job is written as `failed` and
    /// the worker moves on to the next queue item.
    pub async fn process_job(&self, job: NotesJob) {
        let job_id = job.job_id;

        info!(
            job_id = %job_id,
            subject = %job.subject,
            topic = %job.topic,
            "Processing job"
        );

        match self.run_pipeline(&job).await {
            Ok(note_count) => {
                info!(job_id = %job_id, notes = note_count, "Job completed");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job failed");
                self.mark_failed(job_id, &e.to_string()).await;
            }
        }
    }

    /// Runs the two-phase pipeline for one job.
    ///
    /// Returns the number of notes generated on success.
    async fn run_pipeline(&self, job: &NotesJob) -> Result<usize, WorkerError> {
        let job_id = job.job_id;

        self.transition(ProgressEvent::new(job_id, PROGRESS_STARTED, JobPhase::Started))
            .await?;

        // Phase 1: outline generation
        self.transition(ProgressEvent::new(
            job_id,
            PROGRESS_GENERATING_SUBTOPICS,
            JobPhase::GeneratingSubtopics,
        ))
        .await?;

        let outline_response = self
            .generator
            .generate(&subtopics_prompt(&job.subject, &job.topic))
            .await?;
        let outline = parse_outline(&outline_response)?;
        let total = outline.len();

        self.transition(ProgressEvent::new(
            job_id,
            PROGRESS_SUBTOPICS_GENERATED,
            JobPhase::SubtopicsGenerated { count: total },
        ))
        .await?;

        // Phase 2: one detail call per subtopic, in outline order
        let mut notes = Vec::with_capacity(total);
        for (position, subtopic) in outline.into_iter().enumerate() {
            let index = position + 1;

            let content = self
                .generator
                .generate(&subtopic_details_prompt(&job.subject, &job.topic, &subtopic.name))
                .await?;

            let progress = PROGRESS_SUBTOPICS_GENERATED
                + (1.0 - PROGRESS_SUBTOPICS_GENERATED) * (index as f64 / total as f64);
            let event = ProgressEvent::new(
                job_id,
                progress,
                JobPhase::GeneratingDetails {
                    subtopic: subtopic.name.clone(),
                    index,
                    total,
                },
            );

            notes.push(SubtopicNote::from_outline(subtopic, content));
            self.transition(event).await?;
        }

        let result = NotesResult {
            subject: job.subject.clone(),
            topic: job.topic.clone(),
            notes,
        };

        // Result goes in before the terminal status so a relay that reads
        // `completed` always finds the payload behind it.
        self.queue.store_result(job_id, &result).await?;
        self.transition(ProgressEvent::new(
            job_id,
            1.0,
            JobPhase::Completed {
                result: Some(result),
            },
        ))
        .await?;

        Ok(total)
    }

    /// Persists the new status, then publishes the matching event.
    ///
    /// Status is written first so a subscriber that misses the publish
    /// still observes the current state on its snapshot read.
    async fn transition(&self, event: ProgressEvent) -> Result<(), WorkerError> {
        self.queue.set_status(event.job_id, event.status()).await?;
        self.queue.publish_event(&event).await?;
        Ok(())
    }

    /// Writes the terminal `failed` state, best effort.
    ///
    /// If the store itself is down even this write can fail; that is logged
    /// and swallowed so the loop can continue with the next job.
    async fn mark_failed(&self, job_id: Uuid, reason: &str) {
        if let Err(e) = self.queue.set_status(job_id, JobStatus::Failed).await {
            error!(job_id = %job_id, error = %e, "Failed to persist failed status");
        }

        let event = ProgressEvent::new(
            job_id,
            0.0,
            JobPhase::Failed {
                error: reason.to_string(),
            },
        );
        if let Err(e) = self.queue.publish_event(&event).await {
            error!(job_id = %job_id, error = %e, "Failed to publish failure event");
        }
    }
}

/// Parses the phase-1 response into outline items.
///
/// The model is told to answer with a bare JSON array, but responses wrapped
/// in markdown fences or surrounded by prose are tolerated.
fn parse_outline(response: &str) -> Result<Vec<SubtopicOutline>, WorkerError> {
    let array = extract_json_array(response)?;
    let outline = serde_json::from_str(&array)?;
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::memory::MemoryStore;
    use crate::jobs::queue::DEFAULT_NAMESPACE;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Generator that replays a fixed script of responses.
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.responses
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::RequestFailed("script exhausted".to_string())))
        }
    }

    const OUTLINE_TWO_ITEMS: &str = r#"[
        {"name": "Prophase", "description": "Chromosomes condense."},
        {"name": "Metaphase", "description": "Chromosomes align."}
    ]"#;

    fn test_queue() -> NotesQueue {
        NotesQueue::new(Arc::new(MemoryStore::new()), DEFAULT_NAMESPACE)
    }

    fn test_worker(queue: NotesQueue, responses: Vec<Result<String, LlmError>>) -> NotesWorker {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        NotesWorker::new(
            queue,
            Arc::new(ScriptedGenerator::new(responses)),
            shutdown_rx,
            Duration::from_millis(20),
        )
    }

    async fn collect_until_terminal(stream: &mut crate::jobs::queue::ProgressStream) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), stream.next_event())
                .await
                .expect("stream should produce an event")
                .expect("stream should stay open until terminal");
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn test_pipeline_happy_path() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![
                Ok(OUTLINE_TWO_ITEMS.to_string()),
                Ok("## Prophase notes".to_string()),
                Ok("## Metaphase notes".to_string()),
            ],
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let job_id = job.job_id;
        let mut stream = queue.subscribe(job_id).await.expect("subscribe");

        worker.process_job(job).await;

        assert_eq!(
            queue.status(job_id).await.expect("status read"),
            Some(JobStatus::Completed)
        );

        let result = queue
            .result(job_id)
            .await
            .expect("result read")
            .expect("result should be cached");
        assert_eq!(result.subject, "Biology");
        assert_eq!(result.notes.len(), 2);
        assert_eq!(result.notes[0].name, "Prophase");
        assert_eq!(result.notes[0].content, "## Prophase notes");
        assert_eq!(result.notes[1].name, "Metaphase");

        let events = collect_until_terminal(&mut stream).await;
        let statuses: Vec<JobStatus> = events.iter().map(|e| e.status()).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Started,
                JobStatus::GeneratingSubtopics,
                JobStatus::SubtopicsGenerated,
                JobStatus::GeneratingDetails,
                JobStatus::GeneratingDetails,
                JobStatus::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_pipeline_progress_is_monotonic_and_ends_at_one() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![
                Ok(OUTLINE_TWO_ITEMS.to_string()),
                Ok("first".to_string()),
                Ok("second".to_string()),
            ],
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let mut stream = queue.subscribe(job.job_id).await.expect("subscribe");

        worker.process_job(job).await;

        let events = collect_until_terminal(&mut stream).await;
        let progress: Vec<f64> = events.iter().map(|e| e.progress).collect();

        // Interpolated values are compared with a tolerance; 0.2 + 0.8 * 0.5
        // is not exactly 0.6 in floating point.
        let expected = [0.0, 0.1, 0.2, 0.6, 1.0, 1.0];
        assert_eq!(progress.len(), expected.len());
        for (got, want) in progress.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "progress was {:?}", progress);
        }

        for pair in progress.windows(2) {
            assert!(pair[1] >= pair[0], "progress regressed: {:?}", progress);
        }
        assert_eq!(events.last().expect("terminal event").progress, 1.0);
    }

    #[tokio::test]
    async fn test_pipeline_detail_events_carry_subtopic_and_index() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![
                Ok(OUTLINE_TWO_ITEMS.to_string()),
                Ok("first".to_string()),
                Ok("second".to_string()),
            ],
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let mut stream = queue.subscribe(job.job_id).await.expect("subscribe");

        worker.process_job(job).await;

        let events = collect_until_terminal(&mut stream).await;
        let details: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.phase {
                JobPhase::GeneratingDetails {
                    subtopic,
                    index,
                    total,
                } => Some((subtopic.clone(), *index, *total)),
                _ => None,
            })
            .collect();

        assert_eq!(
            details,
            vec![
                ("Prophase".to_string(), 1, 2),
                ("Metaphase".to_string(), 2, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_pipeline_empty_outline_completes_with_no_notes() {
        let queue = test_queue();
        let worker = test_worker(queue.clone(), vec![Ok("[]".to_string())]);

        let job = NotesJob::new("Biology", "Mitosis");
        let job_id = job.job_id;

        worker.process_job(job).await;

        assert_eq!(
            queue.status(job_id).await.expect("status read"),
            Some(JobStatus::Completed)
        );
        let result = queue
            .result(job_id)
            .await
            .expect("result read")
            .expect("result should be cached");
        assert!(result.notes.is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_malformed_outline_fails_job() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![Ok("Sorry, I cannot produce an outline.".to_string())],
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let job_id = job.job_id;
        let mut stream = queue.subscribe(job_id).await.expect("subscribe");

        worker.process_job(job).await;

        assert_eq!(
            queue.status(job_id).await.expect("status read"),
            Some(JobStatus::Failed)
        );
        assert!(queue.result(job_id).await.expect("result read").is_none());

        let events = collect_until_terminal(&mut stream).await;
        let last = events.last().expect("at least one event");
        match &last.phase {
            JobPhase::Failed { error } => assert!(!error.is_empty()),
            other => panic!("expected failed phase, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pipeline_detail_error_fails_job() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![
                Ok(OUTLINE_TWO_ITEMS.to_string()),
                Err(LlmError::RateLimited("slow down".to_string())),
            ],
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let job_id = job.job_id;

        worker.process_job(job).await;

        assert_eq!(
            queue.status(job_id).await.expect("status read"),
            Some(JobStatus::Failed)
        );
        assert!(queue.result(job_id).await.expect("result read").is_none());
    }

    #[tokio::test]
    async fn test_faulty_job_does_not_poison_the_next() {
        let queue = test_queue();
        let worker = test_worker(
            queue.clone(),
            vec![
                Ok("no outline here".to_string()),
                Ok(r#"[{"name": "Only", "description": "One item."}]"#.to_string()),
                Ok("notes".to_string()),
            ],
        );

        let bad = NotesJob::new("Biology", "Mitosis");
        let good = NotesJob::new("Physics", "Optics");
        let bad_id = bad.job_id;
        let good_id = good.job_id;

        worker.process_job(bad).await;
        worker.process_job(good).await;

        assert_eq!(
            queue.status(bad_id).await.expect("status read"),
            Some(JobStatus::Failed)
        );
        assert_eq!(
            queue.status(good_id).await.expect("status read"),
            Some(JobStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_run_processes_enqueued_job_and_stops_on_shutdown() {
        let queue = test_queue();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = NotesWorker::new(
            queue.clone(),
            Arc::new(ScriptedGenerator::new(vec![
                Ok(r#"[{"name": "Only", "description": "One item."}]"#.to_string()),
                Ok("notes".to_string()),
            ])),
            shutdown_rx,
            Duration::from_millis(20),
        );

        let job = NotesJob::new("Biology", "Mitosis");
        let job_id = job.job_id;
        queue.enqueue(&job).await.expect("enqueue");

        let handle = tokio::spawn(worker.run());

        let mut completed = false;
        for _ in 0..100 {
            if queue.status(job_id).await.expect("status read") == Some(JobStatus::Completed) {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(completed, "job never completed");

        shutdown_tx.send(()).expect("send shutdown");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop after shutdown")
            .expect("worker task should not panic");
    }

    #[test]
    fn test_parse_outline_tolerates_fenced_response() {
        let response = "Here you go:\n```json\n[{\"name\": \"A\", \"description\": \"B\"}]\n```";
        let outline = parse_outline(response).expect("outline should parse");

        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].name, "A");
    }

    #[test]
    fn test_parse_outline_rejects_wrong_shape() {
        let result = parse_outline(r#"[{"title": "A"}]"#);
        assert!(matches!(result, Err(WorkerError::OutlineShape(_))));
    }
}
