//! # Job Record
//!
//! One pipeline run for a submitted URL: its status within the fixed stage
//! order, the progress of the current stage and, once finished, the
//! transcript and summary it produced.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use job_datastore::{ArchivedJob, StageTimings, TranscriptSegment, VideoMetadata};
use serde::{Deserialize, Serialize};

/// Status of a job, in required stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    FetchingMetadata,
    Confirmed,
    Downloading,
    Transcribing,
    Summarizing,
    Completed,
    Failed,
}

impl JobStatus {
    /// The three visible pipeline stages, indexed by their stage index.
    pub const PIPELINE_STAGES: [JobStatus; 3] = [
        JobStatus::Downloading,
        JobStatus::Transcribing,
        JobStatus::Summarizing,
    ];

    pub const ALL: [JobStatus; 8] = [
        JobStatus::Pending,
        JobStatus::FetchingMetadata,
        JobStatus::Confirmed,
        JobStatus::Downloading,
        JobStatus::Transcribing,
        JobStatus::Summarizing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::FetchingMetadata => "fetching_metadata",
            JobStatus::Confirmed => "confirmed",
            JobStatus::Downloading => "downloading",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Summarizing => "summarizing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Index used by clients to light up stage indicators.
    ///
    /// Everything before the pipeline maps to `-1`, the three stages to
    /// `0..=2`, success to `3` and failure to `-2`.
    pub fn stage_index(self) -> i8 {
        match self {
            JobStatus::Pending | JobStatus::FetchingMetadata | JobStatus::Confirmed => -1,
            JobStatus::Downloading => 0,
            JobStatus::Transcribing => 1,
            JobStatus::Summarizing => 2,
            JobStatus::Completed => 3,
            JobStatus::Failed => -2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    // position in the forward order; `Failed` sits outside of it
    fn rank(self) -> Option<u8> {
        match self {
            JobStatus::Pending => Some(0),
            JobStatus::FetchingMetadata => Some(1),
            JobStatus::Confirmed => Some(2),
            JobStatus::Downloading => Some(3),
            JobStatus::Transcribing => Some(4),
            JobStatus::Summarizing => Some(5),
            JobStatus::Completed => Some(6),
            JobStatus::Failed => None,
        }
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// Terminal statuses never move. `Failed` is reachable from any other
    /// status; everything else only moves forward.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next > current,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized job status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Looks up the stage index of a raw status string.
///
/// Returns `None` for anything outside the closed status enumeration.
pub fn stage_index(status: &str) -> Option<i8> {
    status.parse::<JobStatus>().ok().map(JobStatus::stage_index)
}

/// Opaque job identifier: 12 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(12);
        JobId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        JobId(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

/// Push channel payload, one per published job update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMessage {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub stage_detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub transcript_text: String,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub transcript_language: String,
    pub summary: String,
    pub timings: StageTimings,
    pub whisper_model: String,
    pub summarizer_model: String,
}

/// A single mutation of a job record.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// Move to a new non-terminal status, resetting stage progress
    Status {
        status: JobStatus,
        progress: u8,
        detail: String,
    },
    /// Progress within the current status
    Progress { progress: u8, detail: String },
    Metadata(VideoMetadata),
    Completed(JobOutput),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job {0} already reached terminal status '{1}'")]
    Terminal(JobId, JobStatus),
    #[error("job {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("job {0} not found")]
    NotFound(JobId),
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage_detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            url: url.into(),
            status: JobStatus::Pending,
            progress: 0,
            stage_detail: String::new(),
            error: None,
            metadata: None,
            output: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> ProgressMessage {
        ProgressMessage {
            status: self.status,
            progress: self.progress,
            stage_detail: self.stage_detail.clone(),
            error: self.error.clone(),
        }
    }

    /// Applies `update`, returning whether the pushed snapshot changed.
    pub fn apply(&mut self, update: JobUpdate) -> Result<bool, JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Terminal(self.id.clone(), self.status));
        }

        let before = self.snapshot();

        match update {
            JobUpdate::Status {
                status,
                progress,
                detail,
            } => {
                if status.is_terminal() || !self.status.can_advance_to(status) {
                    return Err(JobError::InvalidTransition {
                        id: self.id.clone(),
                        from: self.status,
                        to: status,
                    });
                }
                self.status = status;
                self.progress = progress.min(100);
                self.stage_detail = detail;
            }
            JobUpdate::Progress { progress, detail } => {
                // never move backwards within a stage
                self.progress = self.progress.max(progress.min(100));
                self.stage_detail = detail;
            }
            JobUpdate::Metadata(metadata) => {
                self.metadata = Some(metadata);
            }
            JobUpdate::Completed(output) => {
                if !self.status.can_advance_to(JobStatus::Completed) {
                    return Err(JobError::InvalidTransition {
                        id: self.id.clone(),
                        from: self.status,
                        to: JobStatus::Completed,
                    });
                }
                self.status = JobStatus::Completed;
                self.progress = 100;
                self.output = Some(output);
            }
            JobUpdate::Failed(error) => {
                self.status = JobStatus::Failed;
                self.stage_detail = error.clone();
                self.error = Some(error);
            }
        }

        self.updated_at = Utc::now();
        Ok(self.snapshot() != before)
    }

    /// Converts a completed job into its archived form.
    pub fn to_archived(&self) -> Option<ArchivedJob> {
        let output = self.output.as_ref()?;

        Some(ArchivedJob {
            id: self.id.to_string(),
            url: self.url.clone(),
            metadata: self.metadata.clone(),
            transcript_text: output.transcript_text.clone(),
            transcript_segments: output.transcript_segments.clone(),
            transcript_language: output.transcript_language.clone(),
            summary: output.summary.clone(),
            created_at: self.created_at,
            timings: output.timings,
            whisper_model: output.whisper_model.clone(),
            summarizer_model: output.summarizer_model.clone(),
        })
    }
}

impl From<ArchivedJob> for Job {
    fn from(archived: ArchivedJob) -> Self {
        Job {
            id: JobId::from(archived.id),
            url: archived.url,
            status: JobStatus::Completed,
            progress: 100,
            stage_detail: String::new(),
            error: None,
            metadata: archived.metadata,
            output: Some(JobOutput {
                transcript_text: archived.transcript_text,
                transcript_segments: archived.transcript_segments,
                transcript_language: archived.transcript_language,
                summary: archived.summary,
                timings: archived.timings,
                whisper_model: archived.whisper_model,
                summarizer_model: archived.summarizer_model,
            }),
            created_at: archived.created_at,
            updated_at: archived.created_at,
        }
    }
}
