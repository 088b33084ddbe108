use std::sync::{Arc, Mutex};

use job_datastore::TranscriptSegment;
use video_pulse::{progress::ProgressSink, AudioInput, TranscribeResponse, Transcriber};

#[derive(Clone)]
pub struct MockTranscriber {
    pub response_text: String,
    pub calls: Arc<Mutex<Vec<AudioInput>>>,
    /// Progress reported before failing, and the error
    pub fail_with: Option<(u8, String)>,
}

impl MockTranscriber {
    pub fn new(response_text: &str) -> Self {
        Self {
            response_text: response_text.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
        }
    }

    pub fn failing_at(progress: u8, msg: &str) -> Self {
        Self {
            response_text: String::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some((progress, msg.to_string())),
        }
    }
}

impl Transcriber for MockTranscriber {
    type Error = anyhow::Error;

    fn model_name(&self) -> &str {
        "mock-whisper"
    }

    async fn transcribe(
        &self,
        audio_input: AudioInput,
        progress: &dyn ProgressSink,
    ) -> Result<TranscribeResponse, Self::Error> {
        self.calls.lock().unwrap().push(audio_input);

        if let Some((percent, ref msg)) = self.fail_with {
            progress.report(percent, "Transcribing... (1/3 chunks)");
            return Err(anyhow::anyhow!("{}", msg));
        }

        progress.report(50, "Transcribing... (1/2 chunks)");
        Ok(TranscribeResponse {
            duration: 120.0,
            text: self.response_text.clone(),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 120.0,
                text: self.response_text.clone(),
            }],
            language: "english".into(),
        })
    }
}
