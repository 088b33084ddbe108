use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use job_datastore::VideoMetadata;
use video_pulse::{progress::ProgressSink, yt::AudioHandler};

#[derive(Clone)]
pub struct MockAudioHandler {
    pub metadata: VideoMetadata,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail_metadata_with: Option<String>,
    pub fail_download_with: Option<String>,
    pub metadata_delay: Option<Duration>,
}

impl Default for MockAudioHandler {
    fn default() -> Self {
        Self {
            metadata: VideoMetadata {
                video_id: "dQw4w9WgXcQ".into(),
                title: "Never Gonna Give You Up".into(),
                thumbnail: "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".into(),
                duration: 213,
                channel: "Rick Astley".into(),
                upload_date: "20091025".into(),
            },
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_metadata_with: None,
            fail_download_with: None,
            metadata_delay: None,
        }
    }
}

impl MockAudioHandler {
    pub fn failing_metadata(msg: &str) -> Self {
        Self {
            fail_metadata_with: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn slow_metadata(delay: Duration) -> Self {
        Self {
            metadata_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn failing_download(msg: &str) -> Self {
        Self {
            fail_download_with: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl AudioHandler for MockAudioHandler {
    async fn fetch_metadata(&self, _url: &str) -> anyhow::Result<VideoMetadata> {
        if let Some(delay) = self.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref msg) = self.fail_metadata_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        Ok(self.metadata.clone())
    }

    async fn download(
        &self,
        url: &str,
        audio_dl_path: &Path,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf> {
        self.calls.lock().unwrap().push(url.to_string());

        for percent in [25, 50, 75] {
            progress.report(percent, &format!("Downloading audio... {percent}%"));
        }
        if let Some(ref msg) = self.fail_download_with {
            return Err(anyhow::anyhow!("{}", msg));
        }

        tokio::fs::create_dir_all(audio_dl_path).await?;
        let audio_path = audio_dl_path.join(format!("{}.mp3", self.metadata.video_id));
        tokio::fs::write(&audio_path, b"ID3").await?;
        Ok(audio_path)
    }
}
