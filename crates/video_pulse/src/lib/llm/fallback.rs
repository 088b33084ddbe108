use anyhow::anyhow;

use crate::{llm::summarizer::SummaryResponse, progress::ProgressSink, Summarizer};

/// Tries `primary`, then `fallback` when one is configured.
pub struct FallbackSummarizer<P, F> {
    primary: P,
    fallback: Option<F>,
}

impl<P, F> FallbackSummarizer<P, F> {
    pub fn new(primary: P, fallback: Option<F>) -> Self {
        Self { primary, fallback }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl<P, F> Summarizer for FallbackSummarizer<P, F>
where
    P: Summarizer + Sync,
    F: Summarizer + Sync,
{
    type Error = anyhow::Error;

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    async fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SummaryResponse, Self::Error> {
        let primary_err = match self
            .primary
            .summarize(transcript, video_title, progress)
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err.into());
        };

        tracing::warn!(
            primary = self.primary.model_name(),
            fallback = fallback.model_name(),
            error = %primary_err,
            "Primary summarizer failed, falling back"
        );
        progress.report(
            50,
            &format!(
                "Primary summarizer failed, retrying with {}...",
                fallback.model_name()
            ),
        );

        fallback
            .summarize(transcript, video_title, progress)
            .await
            .map_err(|e| {
                anyhow!(
                    "{} failed: {primary_err}; fallback {} failed: {e}",
                    self.primary.model_name(),
                    fallback.model_name()
                )
            })
    }
}
