pub mod audio_handler;
pub mod url;

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use job_datastore::VideoMetadata;

use crate::progress::ProgressSink;

/// Fetches video details and downloads audio for a video URL.
pub trait AudioHandler {
    fn fetch_metadata(&self, url: &str)
        -> impl Future<Output = anyhow::Result<VideoMetadata>> + Send;

    /// Downloads the audio track into `audio_dl_path`, returning the file path.
    fn download(
        &self,
        url: &str,
        audio_dl_path: &Path,
        progress: &dyn ProgressSink,
    ) -> impl Future<Output = anyhow::Result<PathBuf>> + Send;
}

pub trait AudioProcessor {
    /// Splits `input` into consecutive chunks of `chunk_duration_seconds`,
    /// named after `output_template` (an ffmpeg `%03d` pattern).
    fn split_audio_to_chunks(
        &self,
        input: &Path,
        chunk_duration_seconds: u16,
        output_template: &Path,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
