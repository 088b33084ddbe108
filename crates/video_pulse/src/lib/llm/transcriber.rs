use std::{fmt::Display, future::Future, path::PathBuf};

use job_datastore::TranscriptSegment;

use crate::progress::ProgressSink;

pub trait Transcriber {
    type Error: Into<anyhow::Error> + Display + Send;

    /// Name of the speech-to-text model, recorded with each finished job
    fn model_name(&self) -> &str;

    fn transcribe(
        &self,
        audio_input: AudioInput,
        progress: &dyn ProgressSink,
    ) -> impl Future<Output = Result<TranscribeResponse, Self::Error>> + Send;
}

#[derive(Debug, Clone)]
pub enum AudioInput {
    Chunked {
        chunk_duration_seconds: u16,
        chunks_dir_path: PathBuf,
        file_path: PathBuf,
    },
    File(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct TranscribeResponse {
    pub duration: f64,
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub language: String,
}
