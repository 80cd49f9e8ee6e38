//! Job definitions for the notes pipeline.
//!
//! This module defines the core types shared by the submitter, the worker
//! and the stream relay:
//!
//! - `NotesJob`: a queued request to generate notes for a subject/topic pair
//! - `JobStatus`: the persisted lifecycle state machine
//! - `ProgressEvent` / `JobPhase`: the messages published on a job's channel
//! - `SubtopicOutline` / `SubtopicNote` / `NotesResult`: pipeline output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A queued request to generate lesson notes for a subject/topic pair.
///
/// Jobs are serialized onto the queue list by the submitter and picked up
/// by a worker. The payload is read-only after submission; all mutable
/// state lives under the status and result keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotesJob {
    /// Correlation key across the status key, result key and progress channel.
    pub job_id: Uuid,
    /// Subject area the notes belong to (e.g. "Biology").
    pub subject: String,
    /// Topic to generate notes for (e.g. "Mitosis").
    pub topic: String,
    /// When this job was submitted.
    pub created_at: DateTime<Utc>,
}

impl NotesJob {
    /// Creates a new job with a fresh id and the current timestamp.
    pub fn new(subject: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            subject: subject.into(),
            topic: topic.into(),
            created_at: Utc::now(),
        }
    }

    /// Deterministic fingerprint of this job's generation parameters.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.subject, &self.topic)
    }
}

/// Computes the deduplication fingerprint for a subject/topic pair.
///
/// Identical submissions within the dedup TTL hash to the same value and
/// converge on a single job. Fields are length-prefixed before hashing so
/// `("a:b", "c")` and `("a", "b:c")` cannot collide, and the hex digest is
/// safe to embed in store keys regardless of what the caller typed.
pub fn fingerprint(subject: &str, topic: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [subject, topic] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Lifecycle state of a job, persisted as a plain string under the status
/// key.
///
/// The success path is `pending → started → generating_subtopics →
/// subtopics_generated → generating_details → completed`; any non-terminal
/// state may transition to `failed`. `completed` and `failed` are terminal
/// and never transition further. `pending` is written by the submitter;
/// every later state is written by the worker alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Started,
    GeneratingSubtopics,
    SubtopicsGenerated,
    GeneratingDetails,
    Completed,
    Failed,
}

impl JobStatus {
    /// Stable string form used for persistence and the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Started => "started",
            JobStatus::GeneratingSubtopics => "generating_subtopics",
            JobStatus::SubtopicsGenerated => "subtopics_generated",
            JobStatus::GeneratingDetails => "generating_details",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a persisted status string; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "started" => Some(JobStatus::Started),
            "generating_subtopics" => Some(JobStatus::GeneratingSubtopics),
            "subtopics_generated" => Some(JobStatus::SubtopicsGenerated),
            "generating_details" => Some(JobStatus::GeneratingDetails),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns whether no further transitions can occur from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase payload carried by a [`ProgressEvent`].
///
/// Serialized adjacently tagged: the variant name becomes the `status`
/// field and the variant's fields become the `details` object, so each
/// status carries only the fields relevant to that phase. Variants without
/// fields omit `details` entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "details", rename_all = "snake_case")]
pub enum JobPhase {
    /// Synthetic placeholder emitted by the relay before any live event.
    Pending { message: String },
    Started,
    GeneratingSubtopics,
    SubtopicsGenerated { count: usize },
    GeneratingDetails {
        subtopic: String,
        /// 1-based position of the subtopic being generated.
        index: usize,
        total: usize,
    },
    /// The result is `None` only on relay-synthesized events whose cached
    /// payload already expired; worker events always carry it.
    Completed { result: Option<NotesResult> },
    Failed { error: String },
}

impl JobPhase {
    /// The status this phase corresponds to in the state machine.
    pub fn status(&self) -> JobStatus {
        match self {
            JobPhase::Pending { .. } => JobStatus::Pending,
            JobPhase::Started => JobStatus::Started,
            JobPhase::GeneratingSubtopics => JobStatus::GeneratingSubtopics,
            JobPhase::SubtopicsGenerated { .. } => JobStatus::SubtopicsGenerated,
            JobPhase::GeneratingDetails { .. } => JobStatus::GeneratingDetails,
            JobPhase::Completed { .. } => JobStatus::Completed,
            JobPhase::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// A progress message published on a job's channel.
///
/// Wire layout: `{"jobId", "progress", "status", "details"}` where `status`
/// and `details` come from the flattened [`JobPhase`]. Events are ephemeral;
/// a subscriber that connects after publication never sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: Uuid,
    /// Fraction of the pipeline completed, in `[0, 1]`.
    pub progress: f64,
    #[serde(flatten)]
    pub phase: JobPhase,
}

impl ProgressEvent {
    /// Creates an event for the given job and phase.
    pub fn new(job_id: Uuid, progress: f64, phase: JobPhase) -> Self {
        Self {
            job_id,
            progress,
            phase,
        }
    }

    /// The status carried by this event.
    pub fn status(&self) -> JobStatus {
        self.phase.status()
    }

    /// Returns whether this event ends the stream for its job.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// One outline entry produced by phase 1 of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtopicOutline {
    pub name: String,
    pub description: String,
}

/// One fully generated subtopic note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtopicNote {
    pub name: String,
    pub description: String,
    /// Markdown lesson notes for this subtopic.
    pub content: String,
}

impl SubtopicNote {
    /// Combines an outline entry with its generated content.
    pub fn from_outline(outline: SubtopicOutline, content: impl Into<String>) -> Self {
        Self {
            name: outline.name,
            description: outline.description,
            content: content.into(),
        }
    }
}

/// The complete output of a successful pipeline run.
///
/// Written once by the worker when the job completes and immutable
/// afterwards. `notes` preserves the outline order exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotesResult {
    pub subject: String,
    pub topic: String,
    pub notes: Vec<SubtopicNote>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new() {
        let job = NotesJob::new("Biology", "Mitosis");

        assert!(!job.job_id.is_nil());
        assert_eq!(job.subject, "Biology");
        assert_eq!(job.topic, "Mitosis");
    }

    #[test]
    fn test_job_serialization() {
        let job = NotesJob::new("Physics", "Optics");

        let json = serde_json::to_string(&job).expect("serialization should work");
        assert!(json.contains("\"jobId\""));
        assert!(json.contains("\"createdAt\""));

        let parsed: NotesJob = serde_json::from_str(&json).expect("deserialization should work");
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint("Biology", "Mitosis");
        let b = fingerprint("Biology", "Mitosis");
        let c = fingerprint("Biology", "Meiosis");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        // Length prefixing keeps shifted delimiters apart.
        assert_ne!(fingerprint("a:b", "c"), fingerprint("a", "b:c"));
        assert_ne!(fingerprint("ab", ""), fingerprint("a", "b"));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Started,
            JobStatus::GeneratingSubtopics,
            JobStatus::SubtopicsGenerated,
            JobStatus::GeneratingDetails,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("unknown"), None);
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::GeneratingDetails.is_terminal());
    }

    #[test]
    fn test_event_wire_format() {
        let job_id = Uuid::new_v4();
        let event = ProgressEvent::new(
            job_id,
            0.2,
            JobPhase::SubtopicsGenerated { count: 3 },
        );

        let value = serde_json::to_value(&event).expect("serialization should work");
        assert_eq!(value["jobId"], serde_json::json!(job_id));
        assert_eq!(value["status"], "subtopics_generated");
        assert_eq!(value["progress"], 0.2);
        assert_eq!(value["details"]["count"], 3);
    }

    #[test]
    fn test_event_unit_phase_omits_details() {
        let event = ProgressEvent::new(Uuid::new_v4(), 0.0, JobPhase::Started);

        let value = serde_json::to_value(&event).expect("serialization should work");
        assert_eq!(value["status"], "started");
        assert!(value.get("details").is_none());
    }

    #[test]
    fn test_event_completed_without_cached_result() {
        // Relay-synthesized completion for an expired result carries null.
        let event = ProgressEvent::new(Uuid::new_v4(), 1.0, JobPhase::Completed { result: None });

        let value = serde_json::to_value(&event).expect("serialization should work");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["details"]["result"], serde_json::Value::Null);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ProgressEvent::new(
            Uuid::new_v4(),
            0.6,
            JobPhase::GeneratingDetails {
                subtopic: "Cell division".to_string(),
                index: 2,
                total: 4,
            },
        );

        let json = serde_json::to_string(&event).expect("serialization should work");
        let parsed: ProgressEvent =
            serde_json::from_str(&json).expect("deserialization should work");
        assert_eq!(parsed, event);
        assert_eq!(parsed.status(), JobStatus::GeneratingDetails);
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_event_terminal() {
        let failed = ProgressEvent::new(
            Uuid::new_v4(),
            0.0,
            JobPhase::Failed {
                error: "upstream returned garbage".to_string(),
            },
        );
        assert!(failed.is_terminal());

        let completed = ProgressEvent::new(
            Uuid::new_v4(),
            1.0,
            JobPhase::Completed {
                result: Some(NotesResult {
                    subject: "Biology".to_string(),
                    topic: "Mitosis".to_string(),
                    notes: vec![],
                }),
            },
        );
        assert!(completed.is_terminal());
    }

    #[test]
    fn test_note_from_outline() {
        let outline = SubtopicOutline {
            name: "Prophase".to_string(),
            description: "First stage of mitosis".to_string(),
        };
        let note = SubtopicNote::from_outline(outline, "## Prophase\n...");

        assert_eq!(note.name, "Prophase");
        assert_eq!(note.description, "First stage of mitosis");
        assert_eq!(note.content, "## Prophase\n...");
    }
}
