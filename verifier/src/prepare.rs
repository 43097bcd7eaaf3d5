//! Validate → harden → re-validate, the step every executed workflow goes
//! through before the scheduler sees it.

use std::fmt;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::hardener::{HardenOptions, HardenReport, harden_with_report};
use crate::core::types::{Diagnostic, partition};
use crate::core::validator::validate_with;
use crate::workflow::Workflow;

/// Fatal diagnostics that survived preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow has {} fatal diagnostic(s)", self.diagnostics.len())?;
        for diagnostic in &self.diagnostics {
            match &diagnostic.step_id {
                Some(id) => write!(f, "\n- {id}: {}", diagnostic.message)?,
                None => write!(f, "\n- {}", diagnostic.message)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for StructuralError {}

/// A workflow ready for execution.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub workflow: Workflow,
    /// Empty when hardening was skipped.
    pub hardening: HardenReport,
    /// Advisories left on the prepared workflow.
    pub advisories: Vec<Diagnostic>,
}

/// Harden a workflow without checking the result, returning the diagnostics
/// that remain afterwards.
#[instrument(skip_all, fields(workflow = %workflow.name))]
pub fn harden_workflow(
    workflow: &Workflow,
    options: &HardenOptions,
) -> (Workflow, HardenReport, Vec<Diagnostic>) {
    let markers = &options.settings.stateful_endpoint_markers;
    let diagnostics = validate_with(workflow, markers);
    let (hardened, report) = harden_with_report(workflow, &diagnostics, options);
    info!(actions = report.actions.len(), "workflow hardened");
    let remaining = validate_with(&hardened, markers);
    (hardened, report, remaining)
}

/// Prepare `workflow` for execution.
///
/// With `harden` unset the workflow is only validated. Fails with a
/// [`StructuralError`] when fatal diagnostics remain.
pub fn prepare(workflow: &Workflow, harden: bool, options: &HardenOptions) -> Result<Prepared> {
    let (workflow, hardening, diagnostics) = if harden {
        harden_workflow(workflow, options)
    } else {
        let diagnostics = validate_with(workflow, &options.settings.stateful_endpoint_markers);
        (workflow.clone(), HardenReport::default(), diagnostics)
    };
    let (fatal, advisories) = partition(diagnostics);
    if !fatal.is_empty() {
        warn!(fatal = fatal.len(), "workflow is not executable");
        return Err(StructuralError { diagnostics: fatal }.into());
    }
    Ok(Prepared {
        workflow,
        hardening,
        advisories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{check_step, gate_step, prompt_step, workflow};

    fn draft() -> Workflow {
        workflow(
            "draft",
            vec![],
            vec![
                check_step("ruff", "ruff check ."),
                prompt_step("readme", "Check that README.md exists"),
            ],
            vec![prompt_step("fix", "Fix the lint errors")],
            vec![],
        )
    }

    #[test]
    fn hardening_makes_a_draft_executable() {
        let prepared = prepare(&draft(), true, &HardenOptions::default()).expect("prepare");
        assert!(!prepared.hardening.is_empty());
        assert!(prepared.workflow.gate().is_some());
    }

    /// Without hardening the missing gate is reported as a typed error.
    #[test]
    fn unhardened_draft_is_a_structural_error() {
        let err = prepare(&draft(), false, &HardenOptions::default()).expect_err("no gate");
        let structural = err.downcast_ref::<StructuralError>().expect("structural error");
        assert!(
            structural
                .diagnostics
                .iter()
                .any(|d| d.kind == crate::core::types::DiagnosticKind::MissingGate)
        );
        assert!(err.to_string().contains("fatal diagnostic"));
    }

    #[test]
    fn valid_workflow_passes_through_unchanged() {
        let wf = workflow(
            "ok",
            vec![],
            vec![check_step("ruff", "ruff check ."), gate_step("gate", &["ruff"])],
            vec![prompt_step("fix", "Fix the lint errors")],
            vec![],
        );
        let prepared = prepare(&wf, false, &HardenOptions::default()).expect("prepare");
        assert_eq!(prepared.workflow, wf);
    }

    #[test]
    fn configured_markers_drive_advisories() {
        let state = check_step("state", "curl -s http://localhost:7000/app/state");
        let wf = workflow(
            "state",
            vec![],
            vec![state, gate_step("gate", &["state"])],
            vec![prompt_step("fix", "Fix the state endpoint")],
            vec![],
        );
        let weak = |options: &HardenOptions| {
            prepare(&wf, false, options)
                .expect("prepare")
                .advisories
                .iter()
                .any(|d| d.kind == crate::core::types::DiagnosticKind::WeakStatefulCheck)
        };
        assert!(!weak(&HardenOptions::default()));

        let mut options = HardenOptions::default();
        options.settings.stateful_endpoint_markers = vec!["/app/state".to_string()];
        assert!(weak(&options));
    }
}
