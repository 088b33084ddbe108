use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llm::SummarizerBackend;

/// Readiness check for the configured summarizer backend.
///
/// Hosted backends are assumed reachable. For Ollama the configured model
/// must already be pulled, otherwise every job would fail at `summarizing`.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    backend: SummarizerBackend,
    ollama_base_url: String,
    ollama_model: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub ok: bool,
    pub summarizer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl BackendStatus {
    pub fn new(
        backend: SummarizerBackend,
        ollama_base_url: impl Into<String>,
        ollama_model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            ollama_base_url: ollama_base_url.into(),
            ollama_model: ollama_model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn check(&self) -> StatusReport {
        let summarizer = self.backend.to_string();
        if self.backend != SummarizerBackend::Ollama {
            return StatusReport {
                ok: true,
                summarizer,
                model: None,
                error: None,
            };
        }

        let model = self.ollama_model.clone();
        let error = match self.ollama_models().await {
            Ok(models) if model_is_pulled(&models, &model) => None,
            Ok(_) => Some(format!(
                "Model '{model}' not pulled. Run: ollama pull {model}"
            )),
            Err(e) if e.is_connect() => Some("Ollama is not reachable. Is it running?".into()),
            Err(e) => Some(format!("Status check failed: {e}")),
        };

        StatusReport {
            ok: error.is_none(),
            summarizer,
            model: Some(model),
            error,
        }
    }

    async fn ollama_models(&self) -> Result<Vec<String>, reqwest::Error> {
        let tags = self
            .client
            .get(format!(
                "{}/api/tags",
                self.ollama_base_url.trim_end_matches('/')
            ))
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?
            .json::<TagsResponse>()
            .await?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Ollama tags models as `name:tag`; a bare name means `name:latest`.
fn model_is_pulled(models: &[String], model: &str) -> bool {
    models.iter().any(|m| {
        m == model
            || m.strip_suffix(":latest") == Some(model)
            || m.strip_prefix(model).is_some_and(|rest| rest.starts_with(':'))
    })
}
