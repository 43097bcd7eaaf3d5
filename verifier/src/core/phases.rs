//! The verification/agentic loop as a pure transition function.
//!
//! Setup runs once before the loop and completion once after it; between
//! them each verification pass ends in one of the transitions below.

use crate::core::types::{GateOutcome, UnmetStep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Gate passed: skip agentic, run completion.
    Completion,
    /// Gate failed with budget left: run agentic, then verify again.
    Agentic { unmet: Vec<UnmetStep> },
    /// Gate failed on the last allowed pass.
    Exhausted { unmet: Vec<UnmetStep> },
}

/// Decide what follows verification pass `iteration` (1-based) of `budget`.
pub fn after_gate(outcome: &GateOutcome, iteration: u32, budget: u32) -> Transition {
    match outcome {
        GateOutcome::Pass => Transition::Completion,
        GateOutcome::Fail { unmet } if iteration < budget => Transition::Agentic {
            unmet: unmet.clone(),
        },
        GateOutcome::Fail { unmet } => Transition::Exhausted {
            unmet: unmet.clone(),
        },
    }
}
