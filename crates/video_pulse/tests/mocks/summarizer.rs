use std::sync::{Arc, Mutex};

use video_pulse::{progress::ProgressSink, Summarizer, SummaryResponse};

#[derive(Clone)]
pub struct MockSummarizer {
    pub summary: String,
    /// `(video_title, transcript)` of every call
    pub calls: Arc<Mutex<Vec<(String, String)>>>,
    pub fail_with: Option<String>,
    pub panic_with: Option<&'static str>,
}

impl MockSummarizer {
    pub fn new(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
            panic_with: None,
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::new("")
        }
    }

    pub fn panicking(msg: &'static str) -> Self {
        Self {
            panic_with: Some(msg),
            ..Self::new("")
        }
    }
}

impl Summarizer for MockSummarizer {
    type Error = anyhow::Error;

    fn model_name(&self) -> &str {
        "mock-llm"
    }

    async fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        _progress: &dyn ProgressSink,
    ) -> Result<SummaryResponse, Self::Error> {
        self.calls
            .lock()
            .unwrap()
            .push((video_title.to_string(), transcript.to_string()));

        if let Some(msg) = self.panic_with {
            panic!("{}", msg);
        }
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        Ok(SummaryResponse {
            summary: self.summary.clone(),
            model: self.model_name().to_string(),
        })
    }
}
