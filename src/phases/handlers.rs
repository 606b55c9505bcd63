//! Language-model-backed handlers.
//!
//! All four handlers share one implementation: render the role's recipe,
//! call the model, then coerce the answer into the role's result shape.
//! Structured roles ask for JSON but accept prose; the salvage rules live in
//! [`parse_handler_response`].

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::agent_utils::{Role, build_client};
use super::json_utils::{extract_fenced_block, extract_json_block};
use super::{Handler, HandlerContext, HandlerError, HandlerOutput};
use crate::config::SwitchboardConfig;
use crate::models::{AnalysisOutput, CodeOutput, HandlerId, HandlerResult, ResearchOutput};
use crate::provider::LlmClient;
use crate::recipes::{Recipe, load_recipe};

/// Supporting output as the templates see it.
#[derive(Debug, Serialize)]
struct SupportingItem {
    handler: HandlerId,
    content: String,
}

#[derive(Debug, Serialize)]
struct PromptContext<'a> {
    request: &'a str,
    instructions: &'a str,
    supporting: Vec<SupportingItem>,
}

pub struct LlmHandler {
    id: HandlerId,
    client: Arc<dyn LlmClient>,
    recipe: Recipe,
}

impl LlmHandler {
    pub fn new(id: HandlerId, client: Arc<dyn LlmClient>, recipe: Recipe) -> Self {
        Self { id, client, recipe }
    }

    /// Build from configuration, resolving the recipe relative to `base_dir`.
    pub fn from_config(id: HandlerId, config: &SwitchboardConfig, base_dir: &Path) -> Result<Self> {
        let recipe_path = config.recipes.get(id.as_str()).map(|p| p.as_path());
        let recipe = load_recipe(recipe_path, base_dir, id.as_str())?;
        let client = build_client(config, Role::Handler(id))?;
        Ok(Self::new(id, client, recipe))
    }
}

#[async_trait]
impl Handler for LlmHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let prompt_ctx = PromptContext {
            request: &ctx.request,
            instructions: &ctx.instructions,
            supporting: ctx
                .supporting
                .iter()
                .map(|(id, result)| SupportingItem {
                    handler: *id,
                    content: result.as_context(),
                })
                .collect(),
        };
        let prompt = self
            .recipe
            .render(&prompt_ctx)
            .map_err(|e| HandlerError::Prompt(format!("{:#}", e)))?;

        info!(
            "{} handler running with {} supporting output(s)",
            self.id,
            prompt_ctx.supporting.len()
        );

        let raw = self.client.complete(&self.recipe.system, &prompt).await?;
        let result = parse_handler_response(self.id, &raw, &ctx.request)?;
        let summary = summarize(&result, &ctx.request);
        debug!("{} handler: {}", self.id, summary);

        Ok(HandlerOutput { result, summary })
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Coerce a raw model answer into the result shape for `id`.
///
/// - writing: the trimmed text
/// - code: JSON object, else the first fenced block, else the whole text
/// - research: JSON object, else the whole text becomes the findings
/// - data: JSON object, else the whole text becomes `results.output`
pub fn parse_handler_response(
    id: HandlerId,
    raw: &str,
    request: &str,
) -> Result<HandlerResult, HandlerError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(HandlerError::Malformed(format!(
            "{} handler returned an empty answer",
            id
        )));
    }

    let result = match id {
        HandlerId::Writing => HandlerResult::Writing {
            text: text.to_string(),
        },
        HandlerId::Code => HandlerResult::Code(parse_code(text)),
        HandlerId::Research => HandlerResult::Research(parse_research(text, request)),
        HandlerId::Data => HandlerResult::Data(parse_analysis(text)),
    };
    Ok(result)
}

fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let block = extract_json_block(text)?;
    match serde_json::from_str(block) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Handler answer contained JSON that did not fit: {}", e);
            None
        }
    }
}

fn parse_code(text: &str) -> CodeOutput {
    if let Some(out) = parse_json::<CodeOutput>(text)
        && !out.code.trim().is_empty()
    {
        return out;
    }

    let (language, code) = match extract_fenced_block(text) {
        Some((language, body)) => (language.unwrap_or("python"), body),
        None => ("python", text),
    };

    CodeOutput {
        code: code.to_string(),
        language: language.to_string(),
        explanation: "Generated code".to_string(),
        usage_example: String::new(),
        dependencies: Vec::new(),
    }
}

fn parse_research(text: &str, request: &str) -> ResearchOutput {
    if let Some(mut out) = parse_json::<ResearchOutput>(text)
        && !out.findings.trim().is_empty()
    {
        if out.query.trim().is_empty() {
            out.query = request.to_string();
        }
        out.confidence = out.confidence.clamp(0.0, 1.0);
        return out;
    }

    ResearchOutput {
        query: request.to_string(),
        findings: text.to_string(),
        sources: Vec::new(),
        confidence: 0.7,
        limitations: Vec::new(),
    }
}

fn parse_analysis(text: &str) -> AnalysisOutput {
    if let Some(out) = parse_json::<AnalysisOutput>(text)
        && !out.results.is_null()
    {
        return out;
    }

    AnalysisOutput {
        analysis_type: "descriptive".to_string(),
        results: json!({ "output": text }),
        insights: Vec::new(),
        visualizations: Vec::new(),
        limitations: Vec::new(),
    }
}

/// One-line event summary for a result.
fn summarize(result: &HandlerResult, request: &str) -> String {
    match result {
        HandlerResult::Writing { text } => {
            format!("Generated written content ({} chars)", text.chars().count())
        }
        HandlerResult::Code(out) => format!("Generated {} code", out.language),
        HandlerResult::Data(out) => format!("Completed {} analysis", out.analysis_type),
        HandlerResult::Research(_) => {
            let topic: String = request.chars().take(50).collect();
            if topic.len() < request.len() {
                format!("Completed research on: {}...", topic)
            } else {
                format!("Completed research on: {}", topic)
            }
        }
    }
}
