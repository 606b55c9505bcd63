pub mod analyzer;
pub mod dispatch;
pub mod guardrails;
pub mod judge;
pub mod loop_controller;
pub mod routing;
pub mod state;

pub use analyzer::analyze;
pub use dispatch::{HandlerAdapter, HandlerFailure, HandlerRegistry};
pub use guardrails::{DEFAULT_MAX_ITERATIONS, GuardrailHardStop, Guardrails};
pub use judge::{StopReason, Verdict, should_continue};
pub use loop_controller::LoopController;
pub use routing::{DecisionParseError, RoutingAdapter, fallback_decision, parse_decision};
pub use state::{IllegalTransition, LoopPhase, LoopResult, PhaseTracker};
