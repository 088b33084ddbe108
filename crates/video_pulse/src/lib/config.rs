use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::llm::{
    anthropic::AnthropicClient, fallback::FallbackSummarizer, gemini::GeminiClient,
    openai::OpenAIClient, AnySummarizer, SummarizerBackend,
};

#[derive(Debug, Parser)]
#[command(
    name = "video-pulse",
    about = "Summarize YouTube videos with live progress"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP service and the job sweeper
    Serve(ServeArgs),
    /// Follow a job's progress in the terminal
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// OpenAI API key, used for transcription
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_key: String,

    /// Transcription model
    #[arg(long, env = "WHISPER_MODEL", default_value = "whisper-1")]
    pub whisper_model: String,

    /// Primary summarizer backend
    #[arg(long, env = "SUMMARIZER", value_enum, default_value = "openrouter")]
    pub summarizer: SummarizerBackend,

    /// Backend to try when the primary summarizer fails, or `none`
    #[arg(
        long,
        env = "FALLBACK_SUMMARIZER",
        default_value = "ollama",
        value_parser = parse_fallback
    )]
    pub fallback_summarizer: FallbackBackend,

    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub openrouter_key: Option<String>,

    #[arg(
        long,
        env = "OPENROUTER_MODEL",
        default_value = "anthropic/claude-sonnet-4-5"
    )]
    pub openrouter_model: String,

    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    #[arg(long, env = "OLLAMA_MODEL", default_value = "gemma3:4b")]
    pub ollama_model: String,

    /// Chat model used when summarizing through OpenAI
    #[arg(long, env = "OPENAI_SUMMARIZER_MODEL", default_value = "gpt-4o-mini")]
    pub openai_summarizer_model: String,

    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = AnthropicClient::DEFAULT_MODEL)]
    pub anthropic_model: String,

    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = GeminiClient::DEFAULT_MODEL)]
    pub gemini_model: String,

    /// Path to yt-dlp cookies file
    #[arg(long, env = "YTDLP_COOKIES_PATH")]
    pub cookies_path: Option<PathBuf>,

    /// Audio chunk duration in seconds
    #[arg(long, env = "CHUNK_DURATION", default_value = "900")]
    pub chunk_duration: u16,

    /// Working directory for audio files
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub workdir: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value = "6999")]
    pub port: u16,

    /// How long finished jobs stay in memory, in seconds
    #[arg(long, env = "JOB_RETENTION_SECS", default_value = "86400")]
    pub job_retention_secs: u64,

    /// Maximum lifetime of a single event stream, in seconds
    #[arg(long, env = "SSE_MAX_LIFETIME_SECS", default_value = "7200")]
    pub sse_max_lifetime_secs: u64,

    /// Cron schedule of the expired job sweep
    #[arg(long, env = "SWEEP_SCHEDULE", default_value = "0 0 * * * *")]
    pub sweep_schedule: String,
}

#[derive(Debug, Clone, Args)]
pub struct WatchArgs {
    /// Id of the job to follow
    pub job_id: String,

    /// Base URL of the video-pulse service
    #[arg(long, env = "VIDEO_PULSE_URL", default_value = "http://localhost:6999")]
    pub server: String,
}

/// Fallback summarizer setting; `none` disables the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackBackend(pub Option<SummarizerBackend>);

fn parse_fallback(value: &str) -> Result<FallbackBackend, String> {
    match value.trim() {
        "" | "none" => Ok(FallbackBackend(None)),
        other => SummarizerBackend::from_str(other, true)
            .map(|backend| FallbackBackend(Some(backend))),
    }
}

impl ServeArgs {
    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn sse_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.sse_max_lifetime_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn summarizer_for(&self, backend: SummarizerBackend) -> anyhow::Result<AnySummarizer> {
        let summarizer = match backend {
            SummarizerBackend::OpenRouter => {
                let key = self
                    .openrouter_key
                    .as_deref()
                    .context("OPENROUTER_API_KEY is required for the openrouter summarizer")?;
                AnySummarizer::OpenAI(OpenAIClient::openrouter(key, &self.openrouter_model))
            }
            SummarizerBackend::Ollama => AnySummarizer::OpenAI(OpenAIClient::ollama(
                &self.ollama_base_url,
                &self.ollama_model,
            )),
            SummarizerBackend::OpenAI => AnySummarizer::OpenAI(OpenAIClient::new(
                &self.openai_key,
                &self.openai_summarizer_model,
            )),
            SummarizerBackend::Claude => {
                let key = self
                    .anthropic_key
                    .as_deref()
                    .context("ANTHROPIC_API_KEY is required for the claude summarizer")?;
                AnySummarizer::Anthropic(
                    AnthropicClient::new(key).with_model(&self.anthropic_model),
                )
            }
            SummarizerBackend::Gemini => {
                let key = self
                    .gemini_key
                    .as_deref()
                    .context("GEMINI_API_KEY is required for the gemini summarizer")?;
                AnySummarizer::Gemini(GeminiClient::new(key).with_model(&self.gemini_model))
            }
        };

        Ok(summarizer)
    }

    /// The primary summarizer, wrapped with the fallback backend when one is
    /// configured and differs from the primary.
    pub fn summarizer(&self) -> anyhow::Result<FallbackSummarizer<AnySummarizer, AnySummarizer>> {
        let primary = self.summarizer_for(self.summarizer)?;
        let fallback = self
            .fallback_summarizer
            .0
            .filter(|fallback| *fallback != self.summarizer)
            .map(|fallback| self.summarizer_for(fallback))
            .transpose()?;

        Ok(FallbackSummarizer::new(primary, fallback))
    }
}
