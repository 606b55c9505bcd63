use serde::{Deserialize, Serialize};

use crate::models::{HandlerId, SharedRecord};

use super::judge::StopReason;

/// Phases of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "handler", rename_all = "snake_case")]
pub enum LoopPhase {
    Init,
    Analyzed,
    Routing,
    Handling(HandlerId),
    Judging,
    Finished,
}

/// Attempted move between phases that the loop does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: LoopPhase,
    pub to: LoopPhase,
}

impl LoopPhase {
    /// Whether `self -> next` is one of the loop's edges.
    pub fn can_transition_to(self, next: LoopPhase) -> bool {
        use LoopPhase::*;
        matches!(
            (self, next),
            (Init, Analyzed)
                | (Analyzed, Routing)
                | (Analyzed, Finished)
                | (Routing, Handling(_))
                | (Routing, Finished)
                | (Handling(_), Judging)
                | (Judging, Routing)
                | (Judging, Finished)
        )
    }

    pub fn transition(self, next: LoopPhase) -> Result<LoopPhase, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Tracks the current phase and the path taken through the loop.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    current: LoopPhase,
    history: Vec<LoopPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: LoopPhase::Init,
            history: vec![LoopPhase::Init],
        }
    }
}

impl PhaseTracker {
    pub fn current(&self) -> LoopPhase {
        self.current
    }

    /// Move to `next`, rejecting edges the loop does not have.
    pub fn advance(&mut self, next: LoopPhase) -> Result<(), IllegalTransition> {
        self.current = self.current.transition(next)?;
        self.history.push(next);
        Ok(())
    }

    pub fn into_history(self) -> Vec<LoopPhase> {
        self.history
    }
}

/// Result of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    /// The final record, with every partial result
    pub record: SharedRecord,
    /// Why the loop stopped
    pub stop_reason: StopReason,
    /// Phases visited, in order
    pub phases: Vec<LoopPhase>,
}

impl LoopResult {
    /// True when the run finished without recorded errors.
    pub fn success(&self) -> bool {
        !self.record.has_errors()
    }

    pub fn total_iterations(&self) -> u32 {
        self.record.iteration_count()
    }
}
