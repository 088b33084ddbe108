pub mod anthropic;
pub mod fallback;
pub mod gemini;
pub mod openai;
pub mod summarizer;
pub mod transcriber;

use std::fmt;

use crate::{
    llm::{
        anthropic::AnthropicError, gemini::GeminiError, openai::OpenAIError,
        summarizer::SummaryResponse,
    },
    progress::ProgressSink,
    Summarizer,
};

/// Summarization backends that can be selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SummarizerBackend {
    #[value(name = "openrouter")]
    OpenRouter,
    Ollama,
    #[value(name = "openai")]
    OpenAI,
    Claude,
    Gemini,
}

impl fmt::Display for SummarizerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SummarizerBackend::OpenRouter => "openrouter",
            SummarizerBackend::Ollama => "ollama",
            SummarizerBackend::OpenAI => "openai",
            SummarizerBackend::Claude => "claude",
            SummarizerBackend::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

/// A concrete summarizer chosen from [`SummarizerBackend`] at runtime.
#[derive(Clone)]
pub enum AnySummarizer {
    OpenAI(openai::OpenAIClient),
    Anthropic(anthropic::AnthropicClient),
    Gemini(gemini::GeminiClient),
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error(transparent)]
    OpenAI(#[from] OpenAIError),
    #[error(transparent)]
    Anthropic(#[from] AnthropicError),
    #[error(transparent)]
    Gemini(#[from] GeminiError),
}

impl Summarizer for AnySummarizer {
    type Error = SummarizerError;

    fn model_name(&self) -> &str {
        match self {
            AnySummarizer::OpenAI(client) => client.model_name(),
            AnySummarizer::Anthropic(client) => client.model_name(),
            AnySummarizer::Gemini(client) => client.model_name(),
        }
    }

    async fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SummaryResponse, Self::Error> {
        match self {
            AnySummarizer::OpenAI(client) => Ok(client
                .summarize(transcript, video_title, progress)
                .await?),
            AnySummarizer::Anthropic(client) => Ok(client
                .summarize(transcript, video_title, progress)
                .await?),
            AnySummarizer::Gemini(client) => Ok(client
                .summarize(transcript, video_title, progress)
                .await?),
        }
    }
}
