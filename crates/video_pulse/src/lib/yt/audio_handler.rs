use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::LazyLock,
};

use anyhow::Context;
use job_datastore::VideoMetadata;
use regex::Regex;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};

use crate::{
    progress::ProgressSink,
    yt::{url, AudioHandler, AudioProcessor},
};

static DOWNLOAD_PROGRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").unwrap());

/// Thin wrapper over the `yt-dlp` and `ffmpeg` executables.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg: PathBuf,
    cookies_path: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        YtDlp {
            binary: "yt-dlp".into(),
            ffmpeg: "ffmpeg".into(),
            cookies_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
}

impl From<YtDlpInfo> for VideoMetadata {
    fn from(info: YtDlpInfo) -> Self {
        VideoMetadata {
            video_id: info.id,
            title: info.title,
            thumbnail: info.thumbnail.unwrap_or_default(),
            duration: info.duration.unwrap_or_default() as i64,
            channel: info
                .channel
                .or(info.uploader)
                .unwrap_or_else(|| "Unknown".into()),
            upload_date: info.upload_date.unwrap_or_default(),
        }
    }
}

impl YtDlp {
    pub fn new_with_cookies(cookies_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = &cookies_path {
            anyhow::ensure!(
                path.exists(),
                "yt-dlp cookies file not found: {}",
                path.display()
            );
        }

        Ok(YtDlp {
            cookies_path,
            ..Default::default()
        })
    }

    pub fn with_binaries(mut self, yt_dlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        self.binary = yt_dlp.into();
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--no-warnings", "--no-playlist"]);
        if let Some(cookies) = &self.cookies_path {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Parses the percentage out of a `yt-dlp --newline` progress line.
pub fn parse_download_progress(line: &str) -> Option<u8> {
    let pct = DOWNLOAD_PROGRESS_RE
        .captures(line.trim_start())?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;

    Some(pct.clamp(0.0, 100.0) as u8)
}

impl AudioHandler for YtDlp {
    #[tracing::instrument(skip(self))]
    async fn fetch_metadata(&self, url: &str) -> anyhow::Result<VideoMetadata> {
        if !url::validate_url(url) {
            anyhow::bail!(crate::error::Error::InvalidUrl(url.to_string()));
        }

        let output = self
            .command()
            .args(["--dump-json", "--skip-download"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status, %stderr, "yt-dlp metadata lookup failed");
            anyhow::bail!("yt-dlp metadata lookup failed: {}", stderr.trim());
        }

        let info = serde_json::from_slice::<YtDlpInfo>(&output.stdout)
            .context("Failed to parse yt-dlp metadata")?;

        Ok(info.into())
    }

    #[tracing::instrument(skip(self, progress))]
    async fn download(
        &self,
        url: &str,
        audio_dl_path: &Path,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf> {
        let video_id = url::extract_video_id(url)?;

        let audio_output_template = audio_dl_path.join(format!("{video_id}.%(ext)s"));
        let audio_mp3_path = audio_dl_path.join(format!("{video_id}.mp3"));

        // download audio if needed
        if audio_mp3_path.exists() {
            tracing::debug!("Audio already exists at {}", audio_mp3_path.display());
            return Ok(audio_mp3_path);
        }

        tokio::fs::create_dir_all(audio_dl_path)
            .await
            .with_context(|| format!("Failed to create {}", audio_dl_path.display()))?;

        let mut child = self
            .command()
            .args(["-f", "bestaudio/best", "-x", "--audio-format", "mp3", "--newline"])
            .arg("-o")
            .arg(&audio_output_template)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn yt-dlp")?;

        let stdout = child.stdout.take().context("yt-dlp stdout not captured")?;
        let mut stderr = child.stderr.take().context("yt-dlp stderr not captured")?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut last_pct = None;
        while let Some(line) = lines.next_line().await? {
            // only publish when the integer percentage moves
            if let Some(pct) = parse_download_progress(&line).filter(|p| Some(*p) != last_pct) {
                last_pct = Some(pct);
                progress.report(pct, &format!("Downloading audio... {pct}%"));
            }
        }

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            tracing::error!(?status, %stderr, "Failed to download audio");
            anyhow::bail!("Failed to download audio: {}", stderr.trim());
        }

        if !audio_mp3_path.exists() {
            anyhow::bail!(
                "yt-dlp did not produce expected file: {}",
                audio_mp3_path.display()
            );
        }

        Ok(audio_mp3_path)
    }
}

impl AudioProcessor for YtDlp {
    #[tracing::instrument(skip(self))]
    async fn split_audio_to_chunks(
        &self,
        input: &Path,
        chunk_duration_seconds: u16,
        output_template: &Path,
    ) -> anyhow::Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-f", "segment", "-segment_time"])
            .arg(chunk_duration_seconds.to_string())
            .args(["-c", "copy"])
            .arg(output_template)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg failed to split audio: {}", stderr.trim());
        }

        Ok(())
    }
}
