//! Completion judge - decides after each handler run whether the loop goes on.

use serde::{Deserialize, Serialize};

use crate::models::{Route, SharedRecord};

use super::guardrails::{GuardrailHardStop, Guardrails};

/// Why a run finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The oracle chose DONE
    DoneSelected,
    /// The iteration budget ran out
    BudgetExhausted { hard_stop: GuardrailHardStop },
    /// A handler or routing error was recorded
    ErrorsPresent { count: usize },
    /// Every handler in the plan has produced output
    PlanComplete,
    /// A single-handler request ran its handler
    SingleHandlerComplete,
    /// The caller cancelled between iterations
    Cancelled,
}

/// Judge outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Continue,
    Stop(StopReason),
}

/// Decide whether the loop continues. First matching rule wins:
/// DONE, budget, errors, plan complete, single-handler, otherwise continue.
pub fn should_continue(record: &SharedRecord, guardrails: &Guardrails) -> Verdict {
    if record.selected_handler() == Some(Route::Done) {
        return Verdict::Stop(StopReason::DoneSelected);
    }

    if let Err(hard_stop) = guardrails.check_budget(record) {
        return Verdict::Stop(StopReason::BudgetExhausted { hard_stop });
    }

    if record.has_errors() {
        return Verdict::Stop(StopReason::ErrorsPresent {
            count: record.errors().len(),
        });
    }

    if record.plan_satisfied() {
        return Verdict::Stop(StopReason::PlanComplete);
    }

    if !record.needs_multi_handler() {
        return Verdict::Stop(StopReason::SingleHandlerComplete);
    }

    Verdict::Continue
}
