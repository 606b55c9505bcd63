use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::orchestrator::guardrails::DEFAULT_MAX_ITERATIONS;

/// Model used by every role unless overridden.
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub llm: LlmConfig,
    pub loop_config: LoopConfig,
    pub output: OutputConfig,
    /// Explicit recipe paths keyed by role name (e.g. `writing`)
    pub recipes: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend name: "anthropic" or "mock"
    pub provider: String,
    /// Model for every role without an override
    pub default_model: String,
    /// Per-role model overrides keyed by role name
    pub role_models: BTreeMap<String, String>,
    /// Sampling temperature (0.0-1.0)
    pub temperature: f32,
    pub max_tokens: u32,
    /// Never written back out; normally supplied through the environment
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Override API endpoint (e.g. a local proxy)
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum routing steps per request
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for exported runs
    /// Defaults to ~/.config/switchboard/runs/
    pub runs_dir: PathBuf,
    /// Print the routing decisions after each run
    pub show_decision_log: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            role_models: BTreeMap::new(),
            temperature: 0.7,
            max_tokens: 4096,
            api_key: None,
            base_url: None,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            show_decision_log: true,
        }
    }
}

fn default_runs_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("switchboard").join("runs"))
        .unwrap_or_else(|| PathBuf::from("./runs"))
}

/// Roles that accept a `<ROLE>_AGENT_MODEL` override.
const MODEL_OVERRIDE_ROLES: [&str; 5] = ["delegator", "writing", "code", "data", "research"];

impl SwitchboardConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SwitchboardConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if file doesn't exist
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are skipped.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }

        if let Some(model) = lookup("DEFAULT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.llm.default_model = model;
        }

        if let Some(raw) = lookup("TEMPERATURE") {
            match raw.trim().parse::<f32>() {
                Ok(t) => self.llm.temperature = t,
                Err(_) => warn!("Ignoring unparseable TEMPERATURE={:?}", raw),
            }
        }

        if let Some(raw) = lookup("MAX_ITERATIONS") {
            match raw.trim().parse::<u32>() {
                Ok(n) => self.loop_config.max_iterations = n,
                Err(_) => warn!("Ignoring unparseable MAX_ITERATIONS={:?}", raw),
            }
        }

        for role in MODEL_OVERRIDE_ROLES {
            let key = format!("{}_AGENT_MODEL", role.to_uppercase());
            if let Some(model) = lookup(&key).filter(|m| !m.trim().is_empty()) {
                self.llm.role_models.insert(role.to_string(), model);
            }
        }

        if let Some(raw) = lookup("SHOW_DECISION_LOG") {
            match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => self.output.show_decision_log = true,
                "false" | "0" | "no" => self.output.show_decision_log = false,
                _ => warn!("Ignoring unparseable SHOW_DECISION_LOG={:?}", raw),
            }
        }
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.loop_config.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.llm.temperature) {
            bail!(
                "temperature must be between 0.0 and 1.0 (got {})",
                self.llm.temperature
            );
        }
        Ok(())
    }

    /// Model for a role: role override, then the default model.
    pub fn model_for(&self, role: &str) -> &str {
        self.llm
            .role_models
            .get(role)
            .map(String::as_str)
            .unwrap_or(&self.llm.default_model)
    }
}
