//! Integration tests for the orchestration loop.
//!
//! These tests drive the loop with scripted oracles and handlers:
//! - Single-handler and multi-handler flows to completion
//! - Iteration budget enforcement
//! - Error handling (oracle failures, handler failures)
//! - Cancellation and concurrent runs
//! - End-to-end wiring with the offline mock provider

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use switchboard::models::{CodeOutput, ResearchOutput};
use switchboard::orchestrator::GuardrailHardStop;
use switchboard::{
    Guardrails, Handler, HandlerContext, HandlerError, HandlerId, HandlerOutput, HandlerRegistry,
    HandlerResult, LoopController, LoopPhase, LoopSignal, OracleError, OracleRequest, Route,
    RoutingOracle, StopReason, SwitchboardConfig,
};

// ============================================================================
// Test doubles
// ============================================================================

/// Plays back canned answers, then repeats the last one. Remembers every
/// request it was asked.
struct ScriptedOracle {
    answers: Mutex<VecDeque<Result<String, String>>>,
    last: Mutex<Option<Result<String, String>>>,
    seen: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    fn new(answers: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            last: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn routes(routes: &[&str]) -> Arc<Self> {
        Self::new(routes.iter().map(|r| Ok(decision(r))).collect())
    }

    fn seen(&self) -> Vec<OracleRequest> {
        self.seen.lock().unwrap().clone()
    }
}

fn decision(route: &str) -> String {
    json!({
        "selected_agent": route,
        "reasoning": format!("{} is the right next step", route),
        "instructions": format!("Handle the {} part", route),
        "confidence": 0.9
    })
    .to_string()
}

#[async_trait]
impl RoutingOracle for ScriptedOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.seen.lock().unwrap().push(request.clone());

        let next = self.answers.lock().unwrap().pop_front();
        let answer = match next {
            Some(answer) => {
                *self.last.lock().unwrap() = Some(answer.clone());
                answer
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(decision("FINISH"))),
        };
        answer.map_err(OracleError::Other)
    }
}

/// Handler returning a canned result of its own kind.
struct ScriptedHandler {
    id: HandlerId,
    fail_with: Option<String>,
    cancel_after: Option<CancellationToken>,
    contexts: Mutex<Vec<HandlerContext>>,
}

impl ScriptedHandler {
    fn ok(id: HandlerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail_with: None,
            cancel_after: None,
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn failing(id: HandlerId, message: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail_with: Some(message.to_string()),
            cancel_after: None,
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn cancelling(id: HandlerId, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id,
            fail_with: None,
            cancel_after: Some(token),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

fn sample_result(id: HandlerId, request: &str) -> HandlerResult {
    match id {
        HandlerId::Writing => HandlerResult::Writing {
            text: format!("An essay about: {}", request),
        },
        HandlerId::Code => HandlerResult::Code(CodeOutput {
            code: "fn main() {}".to_string(),
            language: "rust".to_string(),
            explanation: "Does nothing".to_string(),
            usage_example: String::new(),
            dependencies: vec![],
        }),
        HandlerId::Research => HandlerResult::Research(ResearchOutput {
            query: request.to_string(),
            findings: "Rust 1.0 shipped in May 2015".to_string(),
            sources: vec!["https://blog.rust-lang.org".to_string()],
            confidence: 0.9,
            limitations: vec![],
        }),
        HandlerId::Data => HandlerResult::Data(switchboard::models::AnalysisOutput {
            analysis_type: "descriptive".to_string(),
            results: json!({"mean": 4.2}),
            insights: vec!["stable".to_string()],
            visualizations: vec![],
            limitations: vec![],
        }),
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    fn id(&self) -> HandlerId {
        self.id
    }

    async fn handle(&self, ctx: &HandlerContext) -> Result<HandlerOutput, HandlerError> {
        self.contexts.lock().unwrap().push(ctx.clone());
        if let Some(token) = &self.cancel_after {
            token.cancel();
        }
        if let Some(message) = &self.fail_with {
            return Err(HandlerError::Malformed(message.clone()));
        }
        Ok(HandlerOutput {
            result: sample_result(self.id, &ctx.request),
            summary: format!("{} finished", self.id),
        })
    }
}

fn registry(handlers: &[Arc<ScriptedHandler>]) -> HandlerRegistry {
    handlers
        .iter()
        .fold(HandlerRegistry::new(), |reg, h| reg.with(h.clone()))
}

fn all_handlers() -> Vec<Arc<ScriptedHandler>> {
    HandlerId::ALL.iter().map(|id| ScriptedHandler::ok(*id)).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_single_handler_request_runs_once() {
    let oracle = ScriptedOracle::routes(&["writing"]);
    let handlers = all_handlers();
    let controller =
        LoopController::new(oracle.clone(), registry(&handlers), Guardrails::default());

    let result = controller.run("Write a haiku about Rust").await;
    let record = &result.record;

    assert_eq!(result.stop_reason, StopReason::SingleHandlerComplete);
    assert_eq!(record.iteration_count(), 1);
    assert!(!record.needs_multi_handler());
    assert_eq!(record.outputs().filled(), vec![HandlerId::Writing]);
    assert!(record.errors().is_empty());
    assert_eq!(record.loop_signal(), Some(LoopSignal::Stop));

    let actors: Vec<&str> = record.events().iter().map(|e| e.actor.as_str()).collect();
    assert_eq!(actors, vec!["analyzer", "delegator", "writing", "synthesis"]);
}

#[tokio::test]
async fn test_research_then_write_completes_plan() {
    let oracle = ScriptedOracle::routes(&["research", "writing"]);
    let handlers = all_handlers();
    let controller =
        LoopController::new(oracle.clone(), registry(&handlers), Guardrails::default());

    let result = controller
        .run("Research the history of Rust, then write a summary")
        .await;
    let record = &result.record;

    assert_eq!(result.stop_reason, StopReason::PlanComplete);
    assert_eq!(record.iteration_count(), 2);
    assert_eq!(
        record.plan(),
        Some(&[HandlerId::Research, HandlerId::Writing][..])
    );
    assert!(record.output(HandlerId::Research).is_some());
    assert!(record.output(HandlerId::Writing).is_some());
    assert!(record.errors().is_empty());

    // The second routing call sees the research output
    let seen = oracle.seen();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].available_outputs.is_empty());
    assert_eq!(seen[1].available_outputs, vec![HandlerId::Research]);
    assert_eq!(seen[1].iteration, 2);

    // The writer received the research as supporting context
    let writer = &handlers[3];
    let ctx = writer.contexts.lock().unwrap()[0].clone();
    assert_eq!(ctx.instructions, "Handle the writing part");
    assert!(ctx.supporting.contains_key(&HandlerId::Research));

    assert_eq!(
        result.phases,
        vec![
            LoopPhase::Init,
            LoopPhase::Analyzed,
            LoopPhase::Routing,
            LoopPhase::Handling(HandlerId::Research),
            LoopPhase::Judging,
            LoopPhase::Routing,
            LoopPhase::Handling(HandlerId::Writing),
            LoopPhase::Judging,
            LoopPhase::Finished,
        ]
    );
}

#[tokio::test]
async fn test_unparseable_oracle_hits_budget() {
    // Fallback always routes to writing, so research never runs.
    let oracle = ScriptedOracle::new(vec![Ok(
        "The writer should write the summary now.".to_string()
    )]);
    let handlers = all_handlers();
    let controller =
        LoopController::new(oracle.clone(), registry(&handlers), Guardrails::default());

    let result = controller.run("Research topic Y, then write a summary").await;
    let record = &result.record;

    assert!(matches!(
        result.stop_reason,
        StopReason::BudgetExhausted {
            hard_stop: GuardrailHardStop::MaxIterationsExceeded {
                iteration: 10,
                limit: 10
            }
        }
    ));
    assert_eq!(record.iteration_count(), 10);
    assert_eq!(handlers[3].calls(), 10);
    assert_eq!(handlers[0].calls(), 0);
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].contains("Maximum iterations reached (10)"));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_iteration_budget_is_absolute() {
    for max in 1..=4 {
        let oracle = ScriptedOracle::routes(&["research"]);
        let handlers = all_handlers();
        let controller = LoopController::new(
            oracle.clone(),
            registry(&handlers),
            Guardrails::with_max_iterations(max),
        );

        let result = controller
            .run("Research Rust async, then write a summary")
            .await;

        assert_eq!(result.record.iteration_count(), max);
        assert_eq!(oracle.seen().len() as u32, max);
        assert!(matches!(
            result.stop_reason,
            StopReason::BudgetExhausted { .. }
        ));
    }
}

#[tokio::test]
async fn test_handler_failure_forces_stop() {
    let oracle = ScriptedOracle::routes(&["research", "writing"]);
    let research = ScriptedHandler::failing(HandlerId::Research, "search backend down");
    let writing = ScriptedHandler::ok(HandlerId::Writing);
    let controller = LoopController::new(
        oracle.clone(),
        registry(&[research.clone(), writing.clone()]),
        Guardrails::default(),
    );

    let result = controller
        .run("Research Rust async, then write a summary")
        .await;
    let record = &result.record;

    assert_eq!(result.stop_reason, StopReason::ErrorsPresent { count: 1 });
    assert_eq!(record.iteration_count(), 1);
    assert_eq!(writing.calls(), 0);
    assert!(record.errors()[0].starts_with("research handler error:"));
    assert!(record.errors()[0].contains("search backend down"));
    assert!(!result.success());

    let events = record.events();
    let failure = &events[events.len() - 2];
    assert_eq!(failure.actor, "research");
    assert_eq!(failure.metadata.as_ref().unwrap()["terminal"], true);
    let synthesis = events.last().unwrap();
    assert_eq!(synthesis.actor, "synthesis");
    assert_eq!(synthesis.summary, "Combined outputs from 0 agent(s)");
}

#[tokio::test]
async fn test_unregistered_handler_is_an_error() {
    let oracle = ScriptedOracle::routes(&["code"]);
    let controller = LoopController::new(
        oracle,
        registry(&[ScriptedHandler::ok(HandlerId::Writing)]),
        Guardrails::default(),
    );

    let result = controller.run("Create a function to sort numbers").await;

    assert!(matches!(
        result.stop_reason,
        StopReason::ErrorsPresent { .. }
    ));
    assert!(result.record.errors()[0].starts_with("code handler error:"));
    assert!(result.record.output(HandlerId::Code).is_none());
}

#[tokio::test]
async fn test_oracle_failure_finishes_with_error() {
    let oracle = ScriptedOracle::new(vec![Err("rate limited".to_string())]);
    let handlers = all_handlers();
    let controller = LoopController::new(oracle, registry(&handlers), Guardrails::default());

    let result = controller.run("Write a haiku about Rust").await;
    let record = &result.record;

    assert_eq!(result.stop_reason, StopReason::DoneSelected);
    assert_eq!(record.selected_handler(), Some(Route::Done));
    assert_eq!(record.iteration_count(), 1);
    assert_eq!(record.errors().len(), 1);
    assert!(record.errors()[0].starts_with("Routing oracle error:"));
    assert!(handlers.iter().all(|h| h.calls() == 0));
    assert_eq!(
        result.phases,
        vec![
            LoopPhase::Init,
            LoopPhase::Analyzed,
            LoopPhase::Routing,
            LoopPhase::Finished
        ]
    );
}

#[tokio::test]
async fn test_event_log_is_append_only() {
    let oracle = ScriptedOracle::routes(&["research", "research", "writing"]);
    let handlers = all_handlers();
    let controller =
        LoopController::new(oracle.clone(), registry(&handlers), Guardrails::default());

    let result = controller
        .run("Research Rust async, then write a summary")
        .await;
    let events = result.record.events();

    // Every window the oracle saw is still present, unchanged and in order.
    for request in oracle.seen() {
        let window = &request.recent_events;
        assert!(window.len() <= 5);
        assert!(
            events.windows(window.len().max(1)).any(|w| w == &window[..]) || window.is_empty(),
            "window seen by the oracle was rewritten"
        );
    }

    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_routing_always_sees_consistent_analysis() {
    let requests = [
        "Write a haiku about Rust",
        "Research Rust async, then write a summary",
        "First, then, finally",
        "Compare the options",
    ];

    for request in requests {
        let oracle = ScriptedOracle::routes(&["FINISH"]);
        let controller =
            LoopController::new(oracle.clone(), registry(&all_handlers()), Guardrails::default());
        let result = controller.run(request).await;

        assert!(result.record.check_consistency().is_ok());
        for seen in oracle.seen() {
            if seen.needs_multi_handler {
                assert!(seen.plan.as_ref().is_some_and(|p| !p.is_empty()));
            }
        }
    }
}

// ============================================================================
// Cancellation and concurrency
// ============================================================================

#[tokio::test]
async fn test_cancellation_stops_before_next_routing() {
    let token = CancellationToken::new();
    let oracle = ScriptedOracle::routes(&["research", "writing"]);
    let research = ScriptedHandler::cancelling(HandlerId::Research, token.clone());
    let writing = ScriptedHandler::ok(HandlerId::Writing);
    let controller = LoopController::new(
        oracle.clone(),
        registry(&[research, writing.clone()]),
        Guardrails::default(),
    );

    let result = controller
        .run_with_cancel("Research Rust async, then write a summary", token)
        .await;

    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(result.record.iteration_count(), 1);
    assert_eq!(oracle.seen().len(), 1);
    assert_eq!(writing.calls(), 0);
    assert!(result.record.output(HandlerId::Research).is_some());
    assert_eq!(result.record.loop_signal(), Some(LoopSignal::Stop));
    assert!(result.success());
}

/// Routes on the request text so concurrent runs are independent.
struct KeywordOracle;

#[async_trait]
impl RoutingOracle for KeywordOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<String, OracleError> {
        tokio::task::yield_now().await;
        let route = if request.request.contains("haiku") {
            "writing"
        } else {
            "code"
        };
        Ok(decision(route))
    }
}

#[tokio::test]
async fn test_concurrent_runs_have_separate_records() {
    let controller = LoopController::new(
        Arc::new(KeywordOracle),
        registry(&all_handlers()),
        Guardrails::default(),
    );

    let (a, b) = tokio::join!(
        controller.run("Write a haiku about Rust"),
        controller.run("Create a function to sort numbers"),
    );

    assert_eq!(a.record.outputs().filled(), vec![HandlerId::Writing]);
    assert_eq!(b.record.outputs().filled(), vec![HandlerId::Code]);
    assert_eq!(a.record.iteration_count(), 1);
    assert_eq!(b.record.iteration_count(), 1);
}

// ============================================================================
// End-to-end with the mock provider
// ============================================================================

#[tokio::test]
async fn test_mock_provider_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SwitchboardConfig::default();
    config.llm.provider = "mock".to_string();
    config.output.runs_dir = dir.path().join("runs");

    let controller = LoopController::from_config(&config, dir.path()).unwrap();
    let result = controller.run("Write a haiku about Rust").await;

    assert_eq!(result.stop_reason, StopReason::SingleHandlerComplete);
    let Some(HandlerResult::Writing { text }) = result.record.output(HandlerId::Writing) else {
        panic!("expected a writing result");
    };
    assert!(text.contains("Echo from mock"));
    assert!(text.contains("Write a haiku about Rust"));

    let delegator_event = &result.record.events()[1];
    assert_eq!(delegator_event.actor, "delegator");
    assert_eq!(
        delegator_event.metadata.as_ref().unwrap()["fallback"],
        true
    );
}
