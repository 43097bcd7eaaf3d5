//! Verification gate evaluation.

use crate::core::types::{ExecutionRecord, GateOutcome, UnmetReason, UnmetStep};
use crate::workflow::Step;

/// Decide whether every step the gate requires succeeded in `record`.
///
/// Unmet ids keep the gate's declared order. A required id with no result
/// (skipped after a fail-fast step, or never present) counts as `missing`.
pub fn evaluate(gate: &Step, record: &ExecutionRecord) -> GateOutcome {
    let required = gate.required_steps.as_deref().unwrap_or_default();
    let unmet: Vec<UnmetStep> = required
        .iter()
        .filter_map(|id| match record.get(id) {
            Some(result) if result.succeeded() => None,
            Some(_) => Some(UnmetStep {
                id: id.clone(),
                reason: UnmetReason::Failed,
            }),
            None => Some(UnmetStep {
                id: id.clone(),
                reason: UnmetReason::Missing,
            }),
        })
        .collect();

    if unmet.is_empty() {
        GateOutcome::Pass
    } else {
        GateOutcome::Fail { unmet }
    }
}
