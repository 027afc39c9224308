use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::model::{GenerateContentRequest, GenerateContentResponse};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Gemini model '{model}' returned no text (finish reason: {reason}).")]
    EmptyResponse { model: String, reason: String },
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new<K: Into<String>, M: Into<String>>(api_key: K, model: M) -> Self {
        GeminiClient {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url<T: Into<String>>(mut self, base_url: T) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    pub async fn generate(&self, prompt: &str, temperature: f32) -> anyhow::Result<String> {
        let request = GenerateContentRequest::from_prompt(prompt, temperature);
        debug!(target: "agents", "POST {} ({} prompt bytes)", self.endpoint(), prompt.len());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(GeminiError::from)?
            .error_for_status()
            .map_err(GeminiError::from)?;

        let generated = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(GeminiError::from)?;

        if let Some(usage) = &generated.usage_metadata {
            debug!(
                target: "agents",
                "Gemini usage: prompt={:?} candidates={:?} total={:?}",
                usage.prompt_token_count,
                usage.candidates_token_count,
                usage.total_token_count
            );
        }

        let text = generated.text().ok_or_else(|| GeminiError::EmptyResponse {
            model: self.model.clone(),
            reason: generated.finish_reason().unwrap_or("none").to_string(),
        })?;
        Ok(text)
    }
}
