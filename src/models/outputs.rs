use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Handler Identity
// ============================================================================

/// The specialized handlers a request can be routed to.
///
/// Variant order is the fixed priority order used when building plans
/// (research, data, code, writing), so `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerId {
    Research,
    Data,
    Code,
    Writing,
}

impl HandlerId {
    /// All handlers in priority order.
    pub const ALL: [HandlerId; 4] = [
        HandlerId::Research,
        HandlerId::Data,
        HandlerId::Code,
        HandlerId::Writing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerId::Research => "research",
            HandlerId::Data => "data",
            HandlerId::Code => "code",
            HandlerId::Writing => "writing",
        }
    }

    /// Other handlers whose output this handler receives as supporting context.
    pub fn consumes(&self) -> &'static [HandlerId] {
        match self {
            HandlerId::Writing => &[HandlerId::Research, HandlerId::Data, HandlerId::Code],
            HandlerId::Data => &[HandlerId::Research],
            HandlerId::Code | HandlerId::Research => &[],
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown handler '{0}'")]
pub struct UnknownHandler(pub String);

impl FromStr for HandlerId {
    type Err = UnknownHandler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(HandlerId::Research),
            "data" => Ok(HandlerId::Data),
            "code" => Ok(HandlerId::Code),
            "writing" => Ok(HandlerId::Writing),
            _ => Err(UnknownHandler(s.to_string())),
        }
    }
}

// ============================================================================
// Handler Payloads
// ============================================================================

/// Output of the code handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOutput {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub usage_example: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_language() -> String {
    "python".to_string()
}

/// Output of the research handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    #[serde(default)]
    pub query: String,
    pub findings: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_research_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub limitations: Vec<String>,
}

fn default_research_confidence() -> f32 {
    0.7
}

/// Output of the data analysis handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutput {
    #[serde(default = "default_analysis_type")]
    pub analysis_type: String,
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub visualizations: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
}

fn default_analysis_type() -> String {
    "descriptive".to_string()
}

/// A handler's result, tagged by the handler kind that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandlerResult {
    Writing { text: String },
    Code(CodeOutput),
    Data(AnalysisOutput),
    Research(ResearchOutput),
}

impl HandlerResult {
    /// The handler kind this result belongs to.
    pub fn kind(&self) -> HandlerId {
        match self {
            HandlerResult::Writing { .. } => HandlerId::Writing,
            HandlerResult::Code(_) => HandlerId::Code,
            HandlerResult::Data(_) => HandlerId::Data,
            HandlerResult::Research(_) => HandlerId::Research,
        }
    }

    /// Whether the primary payload carries anything.
    pub fn is_usable(&self) -> bool {
        match self {
            HandlerResult::Writing { text } => !text.trim().is_empty(),
            HandlerResult::Code(out) => !out.code.trim().is_empty(),
            HandlerResult::Research(out) => !out.findings.trim().is_empty(),
            HandlerResult::Data(out) => match &out.results {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                Value::Object(map) => !map.is_empty(),
                Value::Array(items) => !items.is_empty(),
                _ => true,
            },
        }
    }

    /// Plain-text rendering used when this result is handed to another handler.
    pub fn as_context(&self) -> String {
        match self {
            HandlerResult::Writing { text } => text.clone(),
            HandlerResult::Code(out) => {
                format!("Language: {}\nCode:\n{}", out.language, out.code)
            }
            HandlerResult::Research(out) => {
                let mut text = out.findings.clone();
                if !out.sources.is_empty() {
                    text.push_str("\nSources: ");
                    text.push_str(&out.sources.join(", "));
                }
                text
            }
            HandlerResult::Data(out) => {
                let mut text = format!(
                    "Analysis type: {}\nResults: {}",
                    out.analysis_type, out.results
                );
                if !out.insights.is_empty() {
                    text.push_str("\nInsights: ");
                    text.push_str(&out.insights.join("; "));
                }
                text
            }
        }
    }
}
