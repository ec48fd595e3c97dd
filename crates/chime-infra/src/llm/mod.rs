//! OpenAI-compatible LLM adapters.

pub mod openai;
mod types;

pub use openai::OpenAiClient;
