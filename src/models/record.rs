//! SharedRecord - the accumulator threaded through one orchestration run.
//!
//! Every mutation goes through a method so the record's rules hold by
//! construction:
//! - `original_request` is fixed at creation
//! - `event_log` and `errors` only grow
//! - a result can only be stored in the slot of the handler that produced it

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decision::{Decision, Route};
use super::outputs::{HandlerId, HandlerResult};

// ============================================================================
// Errors
// ============================================================================

/// Rule violations reported by the record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// A result was offered to a slot belonging to another handler.
    #[error("cannot store {result} output in the {slot} slot")]
    SlotMismatch { slot: HandlerId, result: HandlerId },
    /// Multi-handler collaboration flagged without a usable plan.
    #[error("needs_multi_handler is set but the plan is empty")]
    InconsistentPlan,
}

// ============================================================================
// Events
// ============================================================================

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Who produced the event ("analyzer", "delegator", a handler id, ...)
    pub actor: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl Event {
    pub fn new(actor: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.into());
        self
    }
}

// ============================================================================
// Loop Signal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopSignal {
    Continue,
    Stop,
}

// ============================================================================
// Analysis
// ============================================================================

/// Output of the request analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub needs_multi_handler: bool,
    pub plan: Option<Vec<HandlerId>>,
}

impl Analysis {
    pub fn single() -> Self {
        Self::default()
    }

    /// Whether the flag and the plan agree.
    pub fn is_consistent(&self) -> bool {
        !self.needs_multi_handler || self.plan.as_ref().is_some_and(|p| !p.is_empty())
    }
}

// ============================================================================
// Output Slots
// ============================================================================

/// One nullable slot per handler kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutputs {
    pub research: Option<HandlerResult>,
    pub data: Option<HandlerResult>,
    pub code: Option<HandlerResult>,
    pub writing: Option<HandlerResult>,
}

impl HandlerOutputs {
    pub fn get(&self, id: HandlerId) -> Option<&HandlerResult> {
        match id {
            HandlerId::Research => self.research.as_ref(),
            HandlerId::Data => self.data.as_ref(),
            HandlerId::Code => self.code.as_ref(),
            HandlerId::Writing => self.writing.as_ref(),
        }
    }

    fn slot_mut(&mut self, id: HandlerId) -> &mut Option<HandlerResult> {
        match id {
            HandlerId::Research => &mut self.research,
            HandlerId::Data => &mut self.data,
            HandlerId::Code => &mut self.code,
            HandlerId::Writing => &mut self.writing,
        }
    }

    /// Handlers whose slot is filled, in priority order.
    pub fn filled(&self) -> Vec<HandlerId> {
        HandlerId::ALL
            .into_iter()
            .filter(|id| self.get(*id).is_some())
            .collect()
    }
}

// ============================================================================
// Shared Record
// ============================================================================

/// The accumulator for exactly one user request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedRecord {
    original_request: String,
    selected_handler: Option<Route>,
    routing_rationale: Option<String>,
    event_log: Vec<Event>,
    handler_outputs: HandlerOutputs,
    loop_signal: Option<LoopSignal>,
    needs_multi_handler: bool,
    plan: Option<Vec<HandlerId>>,
    iteration_count: u32,
    errors: Vec<String>,
}

impl SharedRecord {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            original_request: request.into(),
            selected_handler: None,
            routing_rationale: None,
            event_log: Vec::new(),
            handler_outputs: HandlerOutputs::default(),
            loop_signal: None,
            needs_multi_handler: false,
            plan: None,
            iteration_count: 0,
            errors: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn original_request(&self) -> &str {
        &self.original_request
    }

    pub fn selected_handler(&self) -> Option<Route> {
        self.selected_handler
    }

    pub fn routing_rationale(&self) -> Option<&str> {
        self.routing_rationale.as_deref()
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    /// The most recent `n` events, oldest first.
    pub fn recent_events(&self, n: usize) -> &[Event] {
        let start = self.event_log.len().saturating_sub(n);
        &self.event_log[start..]
    }

    pub fn outputs(&self) -> &HandlerOutputs {
        &self.handler_outputs
    }

    pub fn output(&self, id: HandlerId) -> Option<&HandlerResult> {
        self.handler_outputs.get(id)
    }

    pub fn loop_signal(&self) -> Option<LoopSignal> {
        self.loop_signal
    }

    pub fn needs_multi_handler(&self) -> bool {
        self.needs_multi_handler
    }

    pub fn plan(&self) -> Option<&[HandlerId]> {
        self.plan.as_deref()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether every handler in the plan has a filled slot.
    /// False when there is no plan.
    pub fn plan_satisfied(&self) -> bool {
        match &self.plan {
            Some(plan) if !plan.is_empty() => {
                plan.iter().all(|id| self.handler_outputs.get(*id).is_some())
            }
            _ => false,
        }
    }

    /// Check the collaboration flag against the plan.
    pub fn check_consistency(&self) -> Result<(), RecordError> {
        let consistent = Analysis {
            needs_multi_handler: self.needs_multi_handler,
            plan: self.plan.clone(),
        }
        .is_consistent();

        if consistent {
            Ok(())
        } else {
            Err(RecordError::InconsistentPlan)
        }
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Apply the analyzer's result, repairing an inconsistent one.
    ///
    /// Returns true when a repair was needed (collaboration flagged with an
    /// empty or missing plan, which is reset to single-handler mode).
    pub fn apply_analysis(&mut self, analysis: Analysis) -> bool {
        if analysis.is_consistent() {
            self.needs_multi_handler = analysis.needs_multi_handler;
            self.plan = if analysis.needs_multi_handler {
                analysis.plan
            } else {
                None
            };
            false
        } else {
            self.needs_multi_handler = false;
            self.plan = None;
            true
        }
    }

    /// Count one pass through the loop body. Returns the new count.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }

    pub fn record_decision(&mut self, decision: &Decision) {
        self.selected_handler = Some(decision.route);
        self.routing_rationale = Some(decision.rationale.clone());
    }

    pub fn log_event(&mut self, event: Event) {
        self.event_log.push(event);
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn set_loop_signal(&mut self, signal: LoopSignal) {
        self.loop_signal = Some(signal);
    }

    /// Store a handler's result in its own slot, replacing any earlier result.
    pub fn store_output(
        &mut self,
        slot: HandlerId,
        result: HandlerResult,
    ) -> Result<(), RecordError> {
        if result.kind() != slot {
            return Err(RecordError::SlotMismatch {
                slot,
                result: result.kind(),
            });
        }
        *self.handler_outputs.slot_mut(slot) = Some(result);
        Ok(())
    }
}
