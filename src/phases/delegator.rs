use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::agent_utils::{Role, build_client};
use super::{OracleError, OracleRequest, RoutingOracle};
use crate::config::SwitchboardConfig;
use crate::provider::LlmClient;
use crate::recipes::{Recipe, load_recipe};

/// Routing oracle backed by a language model and the `delegator` recipe.
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    recipe: Recipe,
}

impl LlmOracle {
    pub fn new(client: Arc<dyn LlmClient>, recipe: Recipe) -> Self {
        Self { client, recipe }
    }

    /// Build from configuration, resolving the recipe relative to `base_dir`.
    pub fn from_config(config: &SwitchboardConfig, base_dir: &Path) -> Result<Self> {
        let role = Role::Delegator;
        let recipe_path = config.recipes.get(role.as_str()).map(|p| p.as_path());
        let recipe = load_recipe(recipe_path, base_dir, role.as_str())?;
        let client = build_client(config, role)?;
        Ok(Self::new(client, recipe))
    }
}

#[async_trait]
impl RoutingOracle for LlmOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let prompt = self
            .recipe
            .render(request)
            .map_err(|e| OracleError::Prompt(format!("{:#}", e)))?;

        debug!(
            "Asking {} for routing decision (iteration {})",
            self.client.model(),
            request.iteration
        );

        let answer = self.client.complete(&self.recipe.system, &prompt).await?;
        Ok(answer)
    }
}
