//! OpenAiClient -- concrete [`CompletionClient`] and [`ImageClient`]
//! implementation for OpenAI-compatible APIs.
//!
//! Sends requests to `/v1/chat/completions` and `/v1/images/generations`
//! with bearer authentication. The API key is wrapped in
//! [`secrecy::SecretString`] and is never logged or included in `Debug`
//! output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use chime_core::llm::{CompletionClient, ImageClient};
use chime_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::types::{ApiImageRequest, ApiImageResponse, ApiResponse, from_api_response, to_api_request};

/// Generated image size requested from the API.
const IMAGE_SIZE: &str = "512x512";

/// OpenAI-compatible LLM client.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client for api.openai.com.
    pub fn new(api_key: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: "https://api.openai.com".to_string(),
        }
    }

    /// Override the base URL (OpenAI-compatible providers, tests, proxies).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, LlmError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationFailed,
                429 => LlmError::RateLimited,
                400 => LlmError::InvalidRequest(error_body),
                _ => LlmError::Provider {
                    message: format!("HTTP {status}: {error_body}"),
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))
    }
}

// OpenAiClient intentionally does NOT derive Debug: the SecretString field
// keeps the key out of any accidental formatting.

impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(LlmError::MissingCredential);
        }

        let body = to_api_request(request);
        debug!(model = %request.model, messages = request.messages.len(), tools = request.tools.len(), "sending completion request");

        let api: ApiResponse = self.post_json("/v1/chat/completions", &body).await?;
        Ok(from_api_response(api))
    }
}

impl ImageClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(LlmError::MissingCredential);
        }

        let body = ApiImageRequest {
            prompt: prompt.to_string(),
            n: 1,
            size: IMAGE_SIZE.to_string(),
        };

        let api: ApiImageResponse = self.post_json("/v1/images/generations", &body).await?;
        api.data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| LlmError::Deserialization("no image URL in response".to_string()))
    }
}
