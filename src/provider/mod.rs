//! LLM client abstraction.
//!
//! Every backend implements [`LlmClient`]: one system prompt plus one user
//! message in, the assistant's text out.

pub mod anthropic;
pub mod mock;

pub use anthropic::AnthropicClient;
pub use mock::MockClient;

use async_trait::async_trait;

/// Errors from an LLM backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("API key not configured (set {0})")]
    MissingApiKey(&'static str),
    #[error("model returned no text")]
    EmptyResponse,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Non-streaming completion.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Model identifier, for logs and event metadata.
    fn model(&self) -> &str;
}
