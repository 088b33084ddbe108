use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

use crate::{
    llm::summarizer::{user_prompt, SummaryResponse, SYSTEM_PROMPT},
    progress::ProgressSink,
    Summarizer,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("No text in generated content")]
    EmptyResponse,
}

/// Summarizer backed by the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiClient {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    pub fn new(api_key: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.into(),
            model: Self::DEFAULT_MODEL.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub async fn send_generate_request(
        &self,
        user_content: impl Into<String>,
    ) -> Result<GenerateResponse, GeminiError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "systemInstruction": {
                "parts": [{ "text": SYSTEM_PROMPT }]
            },
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": user_content.into() }]
                }
            ],
            "generationConfig": { "maxOutputTokens": 4096 }
        }))?;

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .timeout(Duration::from_secs(120))
            .header("x-goog-api-key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Api { status, message });
        }

        Ok(resp.json::<GenerateResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts joined.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        (!text.trim().is_empty()).then_some(text)
    }
}

impl Summarizer for GeminiClient {
    type Error = GeminiError;

    fn model_name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip_all, fields(model = %self.model))]
    async fn summarize(
        &self,
        transcript: &str,
        video_title: &str,
        _progress: &dyn ProgressSink,
    ) -> Result<SummaryResponse, Self::Error> {
        let response = self
            .send_generate_request(user_prompt(video_title, transcript))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to summarize content"))?;

        let summary = response.into_text().ok_or(GeminiError::EmptyResponse)?;

        Ok(SummaryResponse {
            summary,
            model: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_candidate_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_str(
            r###"{
                "candidates": [
                    {
                        "content": {
                            "role": "model",
                            "parts": [{"text": "## Overview\n"}, {"text": "A short talk."}]
                        },
                        "finishReason": "STOP"
                    },
                    {
                        "content": {"role": "model", "parts": [{"text": "ignored"}]}
                    }
                ],
                "usageMetadata": {"promptTokenCount": 12}
            }"###,
        )
        .unwrap();

        assert_eq!(
            response.into_text().as_deref(),
            Some("## Overview\nA short talk.")
        );
    }

    #[test]
    fn test_blocked_prompt_has_no_text() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        assert!(response.into_text().is_none());

        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"finishReason": "SAFETY"}]}"#,
        )
        .unwrap();
        assert!(response.into_text().is_none());
    }
}
