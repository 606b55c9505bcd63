pub mod config;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod phases;
pub mod provider;
pub mod recipes;
pub mod slug;

// Re-export main types
pub use config::{LlmConfig, LoopConfig, OutputConfig, SwitchboardConfig};
pub use models::{
    Decision, DecisionSource, Event, HandlerId, HandlerResult, LoopSignal, Route, SharedRecord,
};
pub use orchestrator::{
    Guardrails, HandlerRegistry, LoopController, LoopPhase, LoopResult, StopReason,
};
pub use output::{FileOutputWriter, RecordWriter, format_handler_output, render_report};
pub use phases::{
    Handler, HandlerContext, HandlerError, HandlerOutput, LlmHandler, LlmOracle, OracleError,
    OracleRequest, RoutingOracle,
};
pub use provider::{LlmClient, LlmError};

// Re-export slug utilities
pub use slug::{run_slug, slugify, slugify_truncate};
