pub mod builder;

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    time::Instant,
};

use futures::FutureExt;
use job_datastore::{DataStore, StageTimings, VideoMetadata};

use crate::{
    job::{JobOutput, JobStatus},
    progress::StageProgress,
    registry::JobHandle,
    yt::AudioHandler,
    AudioInput, Summarizer, Transcriber,
};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_duration_seconds: u16,
}

/// Something that can take a freshly created job through to a terminal
/// status.
pub trait Pipeline: Send + Sync + 'static {
    /// Looks up a video without creating a job.
    fn preview(&self, url: &str) -> impl Future<Output = anyhow::Result<VideoMetadata>> + Send;

    /// Resolves what is needed before the job is accepted, leaving it
    /// `confirmed` on success.
    fn prepare(&self, handle: &JobHandle) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Runs every stage. Always leaves the job `completed` or `failed`.
    fn run(&self, handle: JobHandle) -> impl Future<Output = ()> + Send;
}

/// Runs the download, transcribe and summarize stages for one job at a time,
/// publishing progress through the job's handle.
#[derive(Debug)]
pub struct JobProcessor<D, A, T, S>
where
    D: DataStore + Send + Sync + 'static,
    A: AudioHandler + Send + Sync + 'static,
    T: Transcriber + Send + Sync + 'static,
    S: Summarizer + Send + Sync + 'static,
{
    workdir: PathBuf,
    store: D,
    audio_handler: A,
    transcriber: T,
    summarizer: S,
    chunking_config: Option<ChunkingConfig>,
}

impl<D, A, T, S> JobProcessor<D, A, T, S>
where
    D: DataStore + Send + Sync + 'static,
    A: AudioHandler + Send + Sync + 'static,
    T: Transcriber + Send + Sync + 'static,
    S: Summarizer + Send + Sync + 'static,
{
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn job_dir(&self, handle: &JobHandle) -> PathBuf {
        self.workdir.join(handle.id().as_str())
    }

    #[tracing::instrument(skip_all, fields(job_id = %handle.id()))]
    async fn download(&self, handle: &JobHandle, job_dir: &Path) -> anyhow::Result<PathBuf> {
        handle.set_status(JobStatus::Downloading, "Downloading audio...")?;

        let url = handle.job().url;
        let progress = StageProgress::new(handle, JobStatus::Downloading);
        let audio_path = self
            .audio_handler
            .download(&url, job_dir, &progress)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, "Failed to download audio"))?;

        handle.report_progress(100, "Download complete")?;
        Ok(audio_path)
    }

    #[tracing::instrument(skip_all, fields(job_id = %handle.id()))]
    async fn transcribe(
        &self,
        handle: &JobHandle,
        job_dir: &Path,
        audio_path: PathBuf,
    ) -> anyhow::Result<crate::TranscribeResponse> {
        handle.set_status(JobStatus::Transcribing, "Preparing audio for transcription...")?;

        let audio_input = match self.chunking_config {
            Some(ChunkingConfig {
                chunk_duration_seconds,
            }) => AudioInput::Chunked {
                chunk_duration_seconds,
                chunks_dir_path: job_dir.join("chunks"),
                file_path: audio_path,
            },
            None => AudioInput::File(audio_path),
        };

        let progress = StageProgress::new(handle, JobStatus::Transcribing);
        let result = self
            .transcriber
            .transcribe(audio_input, &progress)
            .await
            .map_err(Into::<anyhow::Error>::into);

        // audio is no longer needed whatever the outcome
        remove_job_dir(job_dir).await;

        let response =
            result.inspect_err(|e| tracing::error!(error = ?e, "Failed to transcribe audio"))?;

        handle.report_progress(100, "Transcription complete")?;
        Ok(response)
    }

    #[tracing::instrument(skip_all, fields(job_id = %handle.id()))]
    async fn summarize(
        &self,
        handle: &JobHandle,
        transcript: &str,
    ) -> anyhow::Result<crate::SummaryResponse> {
        handle.set_status(JobStatus::Summarizing, "Generating summary...")?;
        // the backends give no incremental feedback
        handle.report_progress(50, "Generating summary...")?;

        let title = handle
            .job()
            .metadata
            .map(|m| m.title)
            .unwrap_or_else(|| "Unknown".into());

        let progress = StageProgress::new(handle, JobStatus::Summarizing);
        let response = self
            .summarizer
            .summarize(transcript, &title, &progress)
            .await
            .map_err(Into::<anyhow::Error>::into)
            .inspect_err(|e| tracing::error!(error = ?e, "Failed to summarize transcript"))?;

        handle.report_progress(100, "Summary complete")?;
        Ok(response)
    }

    async fn run_stages(&self, handle: &JobHandle) -> anyhow::Result<JobOutput> {
        let job_dir = self.job_dir(handle);
        let mut timings = StageTimings::default();

        let started = Instant::now();
        let audio_path = self.download(handle, &job_dir).await?;
        timings.download_secs = started.elapsed().as_secs_f64();

        let started = Instant::now();
        let transcript = self.transcribe(handle, &job_dir, audio_path).await?;
        timings.transcribe_secs = started.elapsed().as_secs_f64();

        let started = Instant::now();
        let summary = self.summarize(handle, &transcript.text).await?;
        timings.summarize_secs = started.elapsed().as_secs_f64();

        Ok(JobOutput {
            transcript_text: transcript.text,
            transcript_segments: transcript.segments,
            transcript_language: transcript.language,
            summary: summary.summary,
            timings,
            whisper_model: self.transcriber.model_name().to_string(),
            summarizer_model: summary.model,
        })
    }

    /// Persists the finished job. Failing to archive does not fail the job,
    /// it only stays unavailable once evicted from memory.
    async fn archive(&self, handle: &JobHandle, output: &JobOutput) {
        let mut job = handle.job();
        job.output = Some(output.clone());

        let Some(archived) = job.to_archived() else {
            return;
        };

        if let Err(e) = self.store.insert_job(&archived).await {
            tracing::error!(job_id = %handle.id(), error = ?e, "Failed to archive job");
        }
    }
}

impl<D, A, T, S> Pipeline for JobProcessor<D, A, T, S>
where
    D: DataStore + Send + Sync + 'static,
    A: AudioHandler + Send + Sync + 'static,
    T: Transcriber + Send + Sync + 'static,
    S: Summarizer + Send + Sync + 'static,
{
    async fn preview(&self, url: &str) -> anyhow::Result<VideoMetadata> {
        self.audio_handler.fetch_metadata(url).await
    }

    #[tracing::instrument(skip_all, fields(job_id = %handle.id()))]
    async fn prepare(&self, handle: &JobHandle) -> anyhow::Result<()> {
        handle.set_status(JobStatus::FetchingMetadata, "Fetching video info...")?;

        let url = handle.job().url;
        let metadata = self
            .audio_handler
            .fetch_metadata(&url)
            .await
            .inspect_err(|e| tracing::warn!(error = ?e, "Failed to fetch metadata"))?;

        tracing::info!(video_id = %metadata.video_id, title = %metadata.title, "Fetched video metadata");
        handle.set_metadata(metadata)?;
        handle.set_status(JobStatus::Confirmed, "Queued")?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(job_id = %handle.id()))]
    async fn run(&self, handle: JobHandle) {
        tracing::info!("Processing job");

        let outcome = AssertUnwindSafe(self.run_stages(&handle))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic.as_ref()))));

        // download may have failed half way
        remove_job_dir(&self.job_dir(&handle)).await;

        let result = match outcome {
            Ok(output) => {
                self.archive(&handle, &output).await;
                tracing::info!("Job completed");
                handle.complete(output)
            }
            Err(e) => {
                tracing::error!(error = ?e, "Job failed");
                handle.fail(e.to_string())
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to publish terminal status");
        }
    }
}

async fn remove_job_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = ?path, "Cleaned up job directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(error = ?e, path = ?path, "Failed to clean up job directory"),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let msg = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");

    format!("Internal error: {msg}")
}
