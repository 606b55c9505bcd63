//! Offline client that echoes the prompt back.
//!
//! Lets the whole loop run without an API key: routing answers are not JSON,
//! so the keyword fallback picks handlers from the echoed request text.

use async_trait::async_trait;

use super::{LlmClient, LlmError};

#[derive(Debug, Default)]
pub struct MockClient {
    model: String,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            model: "mock".to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        Ok(format!("Echo from mock: {}", user.trim()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
