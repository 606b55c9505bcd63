mod agent_utils;
mod json_utils;
pub mod delegator;
pub mod handlers;

pub use agent_utils::{ProviderConfig, Role, build_client};
pub use delegator::LlmOracle;
pub use handlers::{LlmHandler, parse_handler_response};
pub use json_utils::{extract_fenced_block, extract_json_block};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Event, HandlerId, HandlerResult, SharedRecord};
use crate::provider::LlmError;

/// Number of most recent events shown to the routing oracle.
pub const RECENT_EVENT_WINDOW: usize = 5;

// ============================================================================
// Routing Oracle
// ============================================================================

/// Everything the routing oracle sees when choosing the next handler.
#[derive(Debug, Clone, Serialize)]
pub struct OracleRequest {
    /// The original user request
    pub request: String,
    /// The last few events, oldest first
    pub recent_events: Vec<Event>,
    /// Handlers whose output slot is already filled
    pub available_outputs: Vec<HandlerId>,
    /// Planned handler sequence, if any
    pub plan: Option<Vec<HandlerId>>,
    pub needs_multi_handler: bool,
    /// Current iteration, starting at 1
    pub iteration: u32,
}

impl OracleRequest {
    pub fn from_record(record: &SharedRecord) -> Self {
        Self {
            request: record.original_request().to_string(),
            recent_events: record.recent_events(RECENT_EVENT_WINDOW).to_vec(),
            available_outputs: record.outputs().filled(),
            plan: record.plan().map(|p| p.to_vec()),
            needs_multi_handler: record.needs_multi_handler(),
            iteration: record.iteration_count(),
        }
    }
}

/// Failures while obtaining a raw routing answer.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to build routing prompt: {0}")]
    Prompt(String),
    #[error("{0}")]
    Other(String),
}

/// Produces a raw, unvalidated routing answer.
#[async_trait]
pub trait RoutingOracle: Send + Sync {
    async fn decide(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

// ============================================================================
// Handlers
// ============================================================================

/// Input handed to a handler.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerContext {
    /// The original user request
    pub request: String,
    /// Guidance from the routing decision
    pub instructions: String,
    /// Earlier outputs this handler consumes
    pub supporting: BTreeMap<HandlerId, HandlerResult>,
}

impl HandlerContext {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            instructions: String::new(),
            supporting: BTreeMap::new(),
        }
    }
}

/// A handler's successful answer.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub result: HandlerResult,
    /// One line for the event log
    pub summary: String,
}

/// Failures inside a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to build prompt: {0}")]
    Prompt(String),
    #[error("malformed output: {0}")]
    Malformed(String),
}

/// A specialized text-generation capability.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Which output slot this handler fills
    fn id(&self) -> HandlerId;

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutput, HandlerError>;
}
