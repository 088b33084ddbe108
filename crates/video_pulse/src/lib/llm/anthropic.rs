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

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum AnthropicError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("No text content in message response")]
    EmptyResponse,
}

/// Summarizer backed by the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    client: ClientWithMiddleware,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-5";

    pub fn new(api_key: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.into(),
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

    pub async fn send_message_request(
        &self,
        user_content: impl Into<String>,
    ) -> Result<MessageResponse, AnthropicError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": SYSTEM_PROMPT,
            "messages": [
                {
                    "role": "user",
                    "content": user_content.into()
                }
            ]
        }))?;

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .timeout(Duration::from_secs(120))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(AnthropicError::Api { status, message });
        }

        Ok(resp.json::<MessageResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessageResponse {
    fn into_text(self) -> Option<String> {
        let text = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        (!text.trim().is_empty()).then_some(text)
    }
}

impl Summarizer for AnthropicClient {
    type Error = AnthropicError;

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
            .send_message_request(user_prompt(video_title, transcript))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to summarize content"))?;

        let summary = response.into_text().ok_or(AnthropicError::EmptyResponse)?;

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
    fn test_text_blocks_are_joined() {
        let response: MessageResponse = serde_json::from_str(
            r###"{
                "id": "msg_1",
                "content": [
                    {"type": "text", "text": "## Overview\n"},
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "A short talk."}
                ],
                "stop_reason": "end_turn"
            }"###,
        )
        .unwrap();

        assert_eq!(
            response.into_text().as_deref(),
            Some("## Overview\nA short talk.")
        );
    }

    #[test]
    fn test_empty_content_is_none() {
        let response: MessageResponse =
            serde_json::from_str(r#"{"id": "msg_2", "content": []}"#).unwrap();
        assert!(response.into_text().is_none());
    }
}
