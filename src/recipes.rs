//! Prompt recipes for the delegator and each handler.
//!
//! A recipe is a small YAML file with a system prompt and a minijinja
//! template for the user message. Defaults are embedded in the binary using
//! include_str! and used when no external recipe file is found.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_DELEGATOR_RECIPE: &str = include_str!("../recipes/delegator.yaml");
pub const DEFAULT_WRITING_RECIPE: &str = include_str!("../recipes/writing.yaml");
pub const DEFAULT_CODE_RECIPE: &str = include_str!("../recipes/code.yaml");
pub const DEFAULT_DATA_RECIPE: &str = include_str!("../recipes/data.yaml");
pub const DEFAULT_RESEARCH_RECIPE: &str = include_str!("../recipes/research.yaml");

/// Project-local recipe directory, relative to the working directory.
pub const LOCAL_RECIPE_DIR: &str = ".switchboard/recipes";

/// A prompt recipe for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// System prompt sent verbatim
    pub system: String,
    /// minijinja template for the user message
    pub prompt: String,
}

impl Recipe {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let recipe: Recipe = serde_yaml::from_str(content).context("Failed to parse recipe YAML")?;
        recipe.check_template()?;
        Ok(recipe)
    }

    /// Render the user message with the given context.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String> {
        let env = Environment::new();
        env.render_str(&self.prompt, ctx)
            .map_err(|e| anyhow!("Failed to render recipe '{}': {}", self.name, e))
    }

    fn check_template(&self) -> Result<()> {
        let env = Environment::new();
        env.template_from_str(&self.prompt)
            .map(|_| ())
            .map_err(|e| anyhow!("Invalid template in recipe '{}': {}", self.name, e))
    }
}

/// Recipe resolution result
pub enum RecipeSource {
    /// Recipe loaded from a file path
    File(PathBuf),
    /// Recipe loaded from bundled default
    Bundled(&'static str),
}

impl RecipeSource {
    pub fn content(&self) -> std::io::Result<String> {
        match self {
            RecipeSource::File(path) => std::fs::read_to_string(path),
            RecipeSource::Bundled(content) => Ok(content.to_string()),
        }
    }

    pub fn load_recipe(&self) -> Result<Recipe> {
        let content = self
            .content()
            .with_context(|| format!("Failed to read recipe from {:?}", self.describe()))?;
        Recipe::from_yaml(&content)
            .with_context(|| format!("Failed to load recipe from {}", self.describe()))
    }

    fn describe(&self) -> String {
        match self {
            RecipeSource::File(path) => path.display().to_string(),
            RecipeSource::Bundled(_) => "bundled default".to_string(),
        }
    }
}

/// Bundled recipe for a role name.
pub fn bundled_recipe(recipe_name: &str) -> Option<&'static str> {
    match recipe_name {
        "delegator" => Some(DEFAULT_DELEGATOR_RECIPE),
        "writing" => Some(DEFAULT_WRITING_RECIPE),
        "code" => Some(DEFAULT_CODE_RECIPE),
        "data" => Some(DEFAULT_DATA_RECIPE),
        "research" => Some(DEFAULT_RESEARCH_RECIPE),
        _ => None,
    }
}

/// Resolve a recipe, falling back to the bundled default.
///
/// Resolution priority:
/// 1. Explicit path if it exists
/// 2. Project-local `.switchboard/recipes/<name>.yaml`
/// 3. Bundled default
pub fn resolve_recipe(
    recipe_path: Option<&Path>,
    base_dir: &Path,
    recipe_name: &str,
) -> Result<RecipeSource> {
    if let Some(recipe_path) = recipe_path {
        let explicit_path = if recipe_path.is_absolute() {
            recipe_path.to_path_buf()
        } else {
            base_dir.join(recipe_path)
        };

        if explicit_path.exists() {
            debug!("Using recipe from explicit path: {:?}", explicit_path);
            return Ok(RecipeSource::File(explicit_path));
        }
        debug!(
            "Recipe path {:?} not found, continuing resolution",
            explicit_path
        );
    }

    let local_path = base_dir
        .join(LOCAL_RECIPE_DIR)
        .join(format!("{}.yaml", recipe_name));
    if local_path.exists() {
        debug!("Using recipe from {}: {:?}", LOCAL_RECIPE_DIR, local_path);
        return Ok(RecipeSource::File(local_path));
    }

    debug!("Using bundled default recipe for: {}", recipe_name);
    bundled_recipe(recipe_name)
        .map(RecipeSource::Bundled)
        .ok_or_else(|| anyhow!("No recipe named '{}'", recipe_name))
}

/// Resolve and load a recipe in one step.
pub fn load_recipe(
    recipe_path: Option<&Path>,
    base_dir: &Path,
    recipe_name: &str,
) -> Result<Recipe> {
    resolve_recipe(recipe_path, base_dir, recipe_name)?.load_recipe()
}
