use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use job_datastore::TranscriptSegment;
use reqwest::{header::CONTENT_TYPE, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

use crate::{
    llm::{
        summarizer::{user_prompt, SummaryResponse, SYSTEM_PROMPT},
        transcriber::{AudioInput, TranscribeResponse},
    },
    progress::{percent_of, ProgressSink},
    yt::AudioProcessor,
    Summarizer, Transcriber,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const MAX_TOKENS: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum OpenAIError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),
    #[error("No content in completion response")]
    EmptyResponse,
    #[error("No audio chunks found in {0}")]
    NoChunks(PathBuf),
}

/// Client for OpenAI compatible APIs: OpenAI itself, OpenRouter and Ollama's
/// `/v1` endpoints all speak the same chat-completions dialect.
#[derive(Clone)]
pub struct OpenAIClient {
    http: Client,
    client: ClientWithMiddleware,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(Client::new(), Some(api_key.into()), OPENAI_BASE_URL, model)
    }

    pub fn openrouter(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_client(
            Client::new(),
            Some(api_key.into()),
            OPENROUTER_BASE_URL,
            model,
        )
    }

    /// Local models can be slow on CPU, hence the long timeout.
    pub fn ollama(base_url: &str, model: impl Into<String>) -> Self {
        let base_url = format!("{}/v1", base_url.trim_end_matches('/'));
        Self::with_client(Client::new(), None, base_url, model)
            .with_timeout(Duration::from_secs(600))
    }

    fn with_client(
        http: Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            http,
            client,
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Uploads one audio file to `/audio/transcriptions`.
    ///
    /// Multipart bodies cannot be replayed, so this bypasses the retry
    /// middleware.
    pub async fn send_transcribe_request(
        &self,
        file: impl Into<PathBuf>,
        model_name: impl Into<String>,
        prompt: Option<String>,
    ) -> Result<WhisperResponse, OpenAIError> {
        let audio_path = file.into();

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chunk.mp3".into());
        let bytes = tokio::fs::read(&audio_path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", model_name.into())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part("file", part);

        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt);
        }

        let mut request = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .timeout(self.timeout)
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OpenAIError::Api { status, message });
        }

        Ok(resp.json::<WhisperResponse>().await?)
    }

    pub async fn send_completion_request(
        &self,
        model_name: &str,
        user_content: impl Into<String>,
    ) -> Result<CompletionResponse, OpenAIError> {
        let body = serde_json::json!({
            "model": model_name,
            "max_tokens": MAX_TOKENS,
            "messages": [
                {
                    "role": "system",
                    "content": SYSTEM_PROMPT
                },
                {
                    "role": "user",
                    "content": user_content.into()
                }
            ]
        });

        let body = serde_json::to_vec(&body)?;

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(OpenAIError::Api { status, message });
        }

        Ok(resp.json::<CompletionResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct WhisperResponse {
    #[serde(default)]
    pub duration: f64,
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub segments: Option<Vec<WhisperSegment>>,
}

#[derive(Debug, Deserialize)]
pub struct WhisperSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: Option<String>,
}

impl CompletionResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
    }
}

impl Summarizer for OpenAIClient {
    type Error = OpenAIError;

    fn model_name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip_all, fields(model = %self.model, base_url = %self.base_url))]
    async fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        _progress: &dyn ProgressSink,
    ) -> Result<SummaryResponse, Self::Error> {
        let response = self
            .send_completion_request(&self.model, user_prompt(video_title, transcript))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to summarize content"))?;

        let summary = response.into_content().ok_or(OpenAIError::EmptyResponse)?;

        Ok(SummaryResponse {
            summary,
            model: self.model.clone(),
        })
    }
}

/// Whisper transcription over the OpenAI audio API. Long audio is split into
/// chunks with ffmpeg first, since the API caps upload size.
#[derive(Clone)]
pub struct WhisperTranscriber<F: AudioProcessor> {
    client: OpenAIClient,
    ffmpeg: F,
}

impl<F: AudioProcessor> WhisperTranscriber<F> {
    pub const DEFAULT_MODEL: &'static str = "whisper-1";

    pub fn new(api_key: impl Into<String>, ffmpeg: F) -> Self {
        Self {
            client: OpenAIClient::new(api_key, Self::DEFAULT_MODEL),
            ffmpeg,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.client.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    async fn ensure_chunks(
        &self,
        file_path: &Path,
        chunks_dir_path: &Path,
        chunk_duration_seconds: u16,
    ) -> Result<Vec<PathBuf>, OpenAIError> {
        let chunks = list_chunks(chunks_dir_path).await;

        // chunk via ffmpeg if not already done
        if chunks.is_empty() {
            tokio::fs::create_dir_all(chunks_dir_path).await?;
            let base_name = file_path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| OpenAIError::Ffmpeg("Invalid file path".into()))?;

            tracing::info!("Splitting audio to chunks");
            self.ffmpeg
                .split_audio_to_chunks(
                    file_path,
                    chunk_duration_seconds,
                    &chunks_dir_path.join(format!("{base_name}_%03d.mp3")),
                )
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to split audio to chunks"))
                .map_err(|e| OpenAIError::Ffmpeg(e.to_string()))?;

            return Ok(list_chunks(chunks_dir_path).await);
        }

        Ok(chunks)
    }
}

/// Sorted chunk files in `dir`; empty when the directory does not exist.
async fn list_chunks(dir: &Path) -> Vec<PathBuf> {
    let mut chunks = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return chunks;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        chunks.push(entry.path());
    }
    chunks.sort();
    chunks
}

impl<F: AudioProcessor + Send + Sync> Transcriber for WhisperTranscriber<F> {
    type Error = OpenAIError;

    fn model_name(&self) -> &str {
        &self.client.model
    }

    #[tracing::instrument(skip(self, progress))]
    async fn transcribe(
        &self,
        input: AudioInput,
        progress: &dyn ProgressSink,
    ) -> Result<TranscribeResponse, Self::Error> {
        let (chunks, chunk_duration_seconds) = match input {
            AudioInput::Chunked {
                file_path,
                chunks_dir_path,
                chunk_duration_seconds,
            } => {
                let chunks = self
                    .ensure_chunks(&file_path, &chunks_dir_path, chunk_duration_seconds)
                    .await?;
                if chunks.is_empty() {
                    return Err(OpenAIError::NoChunks(chunks_dir_path));
                }
                (chunks, chunk_duration_seconds)
            }
            AudioInput::File(path) => (vec![path], 0),
        };

        let total = chunks.len();
        let mut all_segments = Vec::new();
        let mut all_text = String::new();
        let mut language = None;
        let mut time_offset = 0.0_f64;
        let mut duration = 0.0_f64;
        let mut previous_text = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let response = self
                .client
                .send_transcribe_request(chunk, &self.client.model, previous_text)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to transcribe audio"))?;

            duration += response.duration;
            language = language.or(response.language);

            for seg in response.segments.unwrap_or_default() {
                all_segments.push(TranscriptSegment {
                    start: seg.start + time_offset,
                    end: seg.end + time_offset,
                    text: seg.text.trim().to_string(),
                });
            }

            all_text.push_str(response.text.trim());
            all_text.push(' ');
            previous_text = Some(response.text);
            time_offset += if chunk_duration_seconds > 0 {
                chunk_duration_seconds as f64
            } else {
                response.duration
            };

            // 100 is reserved for the stage completion
            let done = i + 1;
            progress.report(
                percent_of(done, total).min(99),
                &format!("Transcribing... ({done}/{total} chunks)"),
            );
        }

        Ok(TranscribeResponse {
            duration,
            text: all_text.trim().to_string(),
            segments: all_segments,
            language: language.unwrap_or_else(|| "unknown".into()),
        })
    }
}
