use std::{fmt::Display, future::Future};

use crate::progress::ProgressSink;

pub const SYSTEM_PROMPT: &str = include_str!("./prompts/system_0.txt");
const USER_PROMPT_TEMPLATE: &str = include_str!("./prompts/user_0.txt");

pub trait Summarizer {
    type Error: Into<anyhow::Error> + Display + Send;

    fn model_name(&self) -> &str;

    fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        progress: &dyn ProgressSink,
    ) -> impl Future<Output = Result<SummaryResponse, Self::Error>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResponse {
    /// Markdown summary
    pub summary: String,
    /// Model that actually produced the summary
    pub model: String,
}

/// Builds the user turn sent alongside [`SYSTEM_PROMPT`].
pub fn user_prompt(video_title: &str, transcript: &str) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{title}", video_title)
        .replace("{transcript}", transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_embeds_title_and_transcript() {
        let prompt = user_prompt("Budget debate", "The house resumed at 2:30pm.");

        assert!(prompt.starts_with("Video Title: Budget debate\n"));
        assert!(prompt.contains("Transcript:\nThe house resumed at 2:30pm."));
        assert!(!prompt.contains("{title}"));
    }
}
