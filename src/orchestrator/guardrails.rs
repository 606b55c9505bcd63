//! Guardrails - Hard limits enforced in Rust.
//!
//! The iteration budget is checked in two places: by the completion judge
//! after every handler run, and by the loop itself before every routing step.
//! The second check does not depend on the judge, so a wrong stop condition
//! elsewhere can never produce an unbounded run.

use serde::{Deserialize, Serialize};

use crate::config::LoopConfig;
use crate::models::SharedRecord;

/// Default iteration budget when none is configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

// ============================================================================
// Hard Stops (non-bypassable limits)
// ============================================================================

/// Hard stops that terminate a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
pub enum GuardrailHardStop {
    /// Iteration budget used up
    #[error("Maximum iterations reached ({limit}); stopped after iteration {iteration}")]
    MaxIterationsExceeded { iteration: u32, limit: u32 },
}

// ============================================================================
// Guardrails
// ============================================================================

/// Numeric limits fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guardrails {
    /// Maximum passes through the routing step
    pub max_iterations: u32,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl Guardrails {
    /// Create guardrails from configuration. A zero budget is raised to one.
    pub fn from_config(config: &LoopConfig) -> Self {
        Self::with_max_iterations(config.max_iterations)
    }

    pub fn with_max_iterations(max_iterations: u32) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    /// Fails once the record has used the whole iteration budget.
    pub fn check_budget(&self, record: &SharedRecord) -> Result<(), GuardrailHardStop> {
        let iteration = record.iteration_count();
        if iteration >= self.max_iterations {
            return Err(GuardrailHardStop::MaxIterationsExceeded {
                iteration,
                limit: self.max_iterations,
            });
        }
        Ok(())
    }
}
