//! Pass 5: navigation consistency.
//!
//! When setup navigates the shared browser and verification asserts UI
//! state, verification must navigate again first: an agentic pass may have
//! left the browser anywhere.

use super::{HardenAction, HardenReport, HardenerSettings};
use crate::core::ids::IdAllocator;
use crate::core::shell::{is_navigation_command, references_stateful_endpoint};
use crate::workflow::{Phase, Step, StepType, UiAction, Workflow};

pub fn is_navigation_step(step: &Step) -> bool {
    match step.step_type {
        StepType::UiBridge => step.action == Some(UiAction::Navigate),
        StepType::Command => step.command.as_deref().is_some_and(is_navigation_command),
        StepType::Prompt | StepType::Other(_) => false,
    }
}

/// Steps whose outcome depends on what page the browser shows.
pub fn reads_ui_state<S: AsRef<str>>(step: &Step, markers: &[S]) -> bool {
    if is_navigation_step(step) {
        return false;
    }
    match step.step_type {
        StepType::UiBridge => true,
        StepType::Command => step
            .command
            .as_deref()
            .is_some_and(|command| references_stateful_endpoint(command, markers)),
        StepType::Prompt | StepType::Other(_) => false,
    }
}

/// Index of the first UI-state step in verification that no earlier
/// verification step navigates for, when setup navigates.
pub fn missing_navigation_at<S: AsRef<str>>(workflow: &Workflow, markers: &[S]) -> Option<usize> {
    if !workflow.setup_steps.iter().any(is_navigation_step) {
        return None;
    }
    let verification = &workflow.verification_steps;
    let first_ui = verification
        .iter()
        .position(|step| reads_ui_state(step, markers))?;
    if verification[..first_ui].iter().any(is_navigation_step) {
        None
    } else {
        Some(first_ui)
    }
}

pub fn inject(
    workflow: &mut Workflow,
    settings: &HardenerSettings,
    ids: &mut IdAllocator,
    report: &mut HardenReport,
) {
    let Some(index) = missing_navigation_at(workflow, &settings.stateful_endpoint_markers) else {
        return;
    };
    let Some(source) = workflow
        .setup_steps
        .iter()
        .rev()
        .find(|step| is_navigation_step(step))
    else {
        return;
    };

    let destination = source
        .url
        .as_deref()
        .or(source.command.as_deref())
        .unwrap_or_default();
    let mut navigation = source.clone();
    navigation.id = ids.mint("navigation", &source.id, destination);
    navigation.phase = Some(Phase::Verification);
    report.push(HardenAction::InjectedNavigation {
        source: source.id.clone(),
        step_id: navigation.id.clone(),
    });
    workflow.verification_steps.insert(index, navigation);
}
