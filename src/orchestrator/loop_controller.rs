use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SwitchboardConfig;
use crate::models::{Event, LoopSignal, SharedRecord};
use crate::phases::{LlmOracle, RoutingOracle};

use super::analyzer::analyze;
use super::dispatch::{HandlerAdapter, HandlerRegistry};
use super::guardrails::Guardrails;
use super::judge::{StopReason, Verdict, should_continue};
use super::routing::RoutingAdapter;
use super::state::{IllegalTransition, LoopPhase, LoopResult, PhaseTracker};

/// Drives the analyze, route, handle, judge loop for one request at a time.
///
/// Holds no per-run state; concurrent runs on one controller each get their
/// own record.
pub struct LoopController {
    routing: RoutingAdapter,
    handlers: HandlerAdapter,
    guardrails: Guardrails,
}

impl LoopController {
    pub fn new(
        oracle: Arc<dyn RoutingOracle>,
        registry: HandlerRegistry,
        guardrails: Guardrails,
    ) -> Self {
        Self {
            routing: RoutingAdapter::new(oracle),
            handlers: HandlerAdapter::new(registry),
            guardrails,
        }
    }

    /// Wire the model-backed oracle and handlers from configuration.
    pub fn from_config(config: &SwitchboardConfig, base_dir: &Path) -> Result<Self> {
        let oracle = LlmOracle::from_config(config, base_dir)?;
        let registry = HandlerRegistry::from_config(config, base_dir)?;
        Ok(Self::new(
            Arc::new(oracle),
            registry,
            Guardrails::from_config(&config.loop_config),
        ))
    }

    /// Run the complete loop for one request.
    pub async fn run(&self, request: impl Into<String>) -> LoopResult {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run the loop, stopping before the next routing step once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: impl Into<String>,
        cancel: CancellationToken,
    ) -> LoopResult {
        let mut record = SharedRecord::new(request);
        let mut tracker = PhaseTracker::default();

        let stop_reason = match self.drive(&mut record, &mut tracker, &cancel).await {
            Ok(reason) => reason,
            Err(e) => {
                error!("Orchestration aborted: {}", e);
                record.push_error(format!("Orchestration aborted: {}", e));
                StopReason::ErrorsPresent {
                    count: record.errors().len(),
                }
            }
        };
        record.set_loop_signal(LoopSignal::Stop);

        info!(
            "Loop completed after {} iteration(s): {:?} ({} error(s))",
            record.iteration_count(),
            stop_reason,
            record.errors().len()
        );

        LoopResult {
            record,
            stop_reason,
            phases: tracker.into_history(),
        }
    }

    async fn drive(
        &self,
        record: &mut SharedRecord,
        tracker: &mut PhaseTracker,
        cancel: &CancellationToken,
    ) -> Result<StopReason, IllegalTransition> {
        info!("Starting orchestration loop");
        info!("Max iterations: {}", self.guardrails.max_iterations);

        self.run_analysis(record);
        tracker.advance(LoopPhase::Analyzed)?;

        loop {
            // Guard: runs before every routing step, independent of the judge.
            if cancel.is_cancelled() {
                warn!("Run cancelled before iteration {}", record.iteration_count() + 1);
                record.log_event(Event::new(
                    "orchestrator",
                    format!(
                        "Run cancelled after {} iteration(s)",
                        record.iteration_count()
                    ),
                ));
                tracker.advance(LoopPhase::Finished)?;
                return Ok(StopReason::Cancelled);
            }

            if let Err(hard_stop) = self.guardrails.check_budget(record) {
                warn!("Hard stop: {}", hard_stop);
                record.push_error(hard_stop.to_string());
                record.log_event(Event::new("orchestrator", hard_stop.to_string()));
                tracker.advance(LoopPhase::Finished)?;
                return Ok(StopReason::BudgetExhausted { hard_stop });
            }

            debug_assert!(record.check_consistency().is_ok());
            tracker.advance(LoopPhase::Routing)?;
            let iteration = record.begin_iteration();
            info!(
                "=== Iteration {} of {} ===",
                iteration, self.guardrails.max_iterations
            );

            let decision = self.routing.route(record).await;
            let Some(handler) = decision.route.handler() else {
                info!("Delegator selected DONE: {}", decision.rationale);
                tracker.advance(LoopPhase::Finished)?;
                return Ok(StopReason::DoneSelected);
            };

            tracker.advance(LoopPhase::Handling(handler))?;
            if let Err(failure) = self
                .handlers
                .invoke(handler, &decision.instructions, record)
                .await
            {
                debug!("Handler failure recorded: {}", failure);
            }
            log_synthesis(record);

            tracker.advance(LoopPhase::Judging)?;
            match should_continue(record, &self.guardrails) {
                Verdict::Continue => {
                    record.set_loop_signal(LoopSignal::Continue);
                    debug!(
                        "Continuing; filled outputs: {:?}",
                        record.outputs().filled()
                    );
                }
                Verdict::Stop(reason) => {
                    if let StopReason::BudgetExhausted { hard_stop } = &reason {
                        warn!("Hard stop: {}", hard_stop);
                        record.push_error(hard_stop.to_string());
                    }
                    record.set_loop_signal(LoopSignal::Stop);
                    tracker.advance(LoopPhase::Finished)?;
                    return Ok(reason);
                }
            }
        }
    }

    fn run_analysis(&self, record: &mut SharedRecord) {
        let analysis = analyze(record.original_request());
        debug!(
            "Analysis: multi-handler={}, plan={:?}",
            analysis.needs_multi_handler, analysis.plan
        );

        if record.apply_analysis(analysis) {
            warn!("Analyzer flagged collaboration without a plan; running single-handler");
        }

        let summary = match record.plan() {
            Some(plan) if record.needs_multi_handler() => format!(
                "Multi-handler request; plan: {}",
                plan.iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            ),
            _ => "Single-handler request".to_string(),
        };
        info!("{}", summary);

        let plan_meta = json!(record.plan());
        let multi = record.needs_multi_handler();
        record.log_event(
            Event::new("analyzer", summary)
                .with_meta("needs_multi_handler", multi)
                .with_meta("plan", plan_meta),
        );
    }
}

/// Audit entry after each handler run: how many handlers have contributed.
fn log_synthesis(record: &mut SharedRecord) {
    let contributors = record.outputs().filled();
    info!("Synthesis: {} handler(s) contributed", contributors.len());
    let names = json!(contributors.iter().map(|id| id.as_str()).collect::<Vec<_>>());
    record.log_event(
        Event::new(
            "synthesis",
            format!("Combined outputs from {} agent(s)", contributors.len()),
        )
        .with_meta("contributors", names),
    );
}
