use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Video details reported by `yt-dlp` before the pipeline starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    /// Length of the video in seconds
    pub duration: i64,
    pub channel: String,
    /// `YYYYMMDD`, as reported by youtube
    pub upload_date: String,
}

impl VideoMetadata {
    /// Formats the duration as `H:MM:SS`, or `M:SS` for videos under an hour
    pub fn duration_str(&self) -> String {
        format_timestamp(self.duration as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn start_str(&self) -> String {
        format_timestamp(self.start)
    }

    pub fn end_str(&self) -> String {
        format_timestamp(self.end)
    }
}

/// Wall-clock seconds spent in each pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub download_secs: f64,
    pub transcribe_secs: f64,
    pub summarize_secs: f64,
}

/// A finished job as persisted for result retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchivedJob {
    pub id: String,
    pub url: String,
    pub metadata: Option<VideoMetadata>,
    pub transcript_text: String,
    pub transcript_segments: Vec<TranscriptSegment>,
    pub transcript_language: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub timings: StageTimings,
    pub whisper_model: String,
    pub summarizer_model: String,
}

/// Lightweight row used by the history listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail: String,
    pub duration: i64,
    pub created_at: DateTime<Utc>,
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
