//! LLM collaborator trait definitions.
//!
//! `CompletionClient` is the chat-completion contract (plain text, tool
//! invocations, and a JSON-constrained mode selected via the request);
//! `ImageClient` is the image-generation contract. Implementations live in
//! chime-infra (e.g., `OpenAiClient`).

use chime_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Chat-completion collaborator.
pub trait CompletionClient: Send + Sync {
    /// Send a completion request and receive the full response.
    ///
    /// JSON-constrained output (used by the engagement analysis) is selected
    /// with [`chime_types::llm::ResponseFormat::JsonObject`] on the request.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

/// Image-generation collaborator.
pub trait ImageClient: Send + Sync {
    /// Generate an image for a prompt, returning a URL to the result.
    fn generate(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, LlmError>> + Send;
}
