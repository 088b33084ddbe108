pub mod client;
pub mod config;
mod error;
pub mod job;
mod llm;
mod processor;
pub mod progress;
pub mod registry;
pub mod renderer;
pub mod server;
pub mod sweeper;
pub mod telemetry;
pub mod yt;

pub use error::Error;
pub use llm::{anthropic, fallback, gemini, openai};
pub use llm::{
    summarizer::{Summarizer, SummaryResponse},
    transcriber::{AudioInput, TranscribeResponse, Transcriber},
    AnySummarizer, SummarizerBackend,
};
pub use processor::{builder::JobProcessorBuilder, ChunkingConfig, JobProcessor, Pipeline};
