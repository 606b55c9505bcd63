//! Client setup shared by the delegator and the handlers.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::config::SwitchboardConfig;
use crate::models::HandlerId;
use crate::provider::{AnthropicClient, LlmClient, MockClient};

/// A component that talks to a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Delegator,
    Handler(HandlerId),
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Delegator => "delegator",
            Role::Handler(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HandlerId> for Role {
    fn from(id: HandlerId) -> Self {
        Role::Handler(id)
    }
}

/// Provider and model chosen for one role.
///
/// Model priority: role override > default model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub role: Role,
}

impl<'a> ProviderConfig<'a> {
    pub fn for_role(config: &'a SwitchboardConfig, role: Role) -> Self {
        Self {
            provider: &config.llm.provider,
            model: config.model_for(role.as_str()),
            role,
        }
    }
}

/// Create the LLM client a role should use.
pub fn build_client(config: &SwitchboardConfig, role: Role) -> Result<Arc<dyn LlmClient>> {
    let provider = ProviderConfig::for_role(config, role);

    info!(
        "Creating {} client: {} with model: {}",
        role, provider.provider, provider.model
    );

    match provider.provider {
        "anthropic" => {
            let client = AnthropicClient::new(
                config.llm.api_key.clone(),
                config.llm.base_url.as_deref(),
                provider.model,
                config.llm.temperature,
                config.llm.max_tokens,
            )
            .with_context(|| format!("Failed to create {} client", role))?;
            Ok(Arc::new(client))
        }
        "mock" => Ok(Arc::new(MockClient::new())),
        other => bail!("Unknown provider '{}' (expected anthropic or mock)", other),
    }
}
