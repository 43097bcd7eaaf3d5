//! Pass 1: structural normalisation.
//!
//! Brings every step into one of the three legal kinds with a well-formed
//! payload, or drops it with a reason. Nothing here looks at what a step
//! checks, only at its shape.

use std::collections::BTreeSet;

use serde_json::Value;

use super::{HardenAction, HardenReport};
use crate::core::ids::IdAllocator;
use crate::core::shell::{program_name, quote};
use crate::core::substance::is_substantive;
use crate::workflow::{AssertType, CheckType, Phase, Step, StepType, TestType, UiAction, Workflow};

pub fn normalize(workflow: &mut Workflow, report: &mut HardenReport) {
    let mut ids = IdAllocator::from_workflow(workflow);
    let mut seen = BTreeSet::new();

    for phase in Phase::ALL {
        let steps = std::mem::take(workflow.steps_mut(phase));
        let mut kept = Vec::with_capacity(steps.len());
        for (index, mut step) in steps.into_iter().enumerate() {
            settle_id(&mut step, phase, index, &mut ids, &mut seen, report);
            normalize_type(&mut step, phase, report);
            if step.phase != Some(phase) {
                step.phase = Some(phase);
                report.push(HardenAction::FixedPhase {
                    step_id: step.id.clone(),
                    phase,
                });
            }
            match repair_payload(&mut step, report) {
                Ok(()) => kept.push(step),
                Err(reason) => report.push(HardenAction::Dropped {
                    step_id: step.id,
                    reason,
                }),
            }
        }
        *workflow.steps_mut(phase) = kept;
    }

    drop_stray_gates(workflow, report);
    relocate_agentic(workflow, report);

    if workflow.max_iterations == Some(0) {
        workflow.max_iterations = Some(1);
        report.push(HardenAction::RepairedField {
            step_id: None,
            field: "max_iterations".to_string(),
            detail: "raised 0 to 1".to_string(),
        });
    }
}

fn settle_id(
    step: &mut Step,
    phase: Phase,
    index: usize,
    ids: &mut IdAllocator,
    seen: &mut BTreeSet<String>,
    report: &mut HardenReport,
) {
    if step.id.trim().is_empty() {
        step.id = ids.mint("assigned_id", phase.as_str(), &format!("{index}|{}", step.name));
        report.push(HardenAction::RepairedField {
            step_id: Some(step.id.clone()),
            field: "id".to_string(),
            detail: "assigned an id to an unnamed step".to_string(),
        });
    } else if seen.contains(&step.id) {
        let renamed = ids.claim(&step.id);
        report.push(HardenAction::RenamedDuplicateId {
            from: step.id.clone(),
            to: renamed.clone(),
        });
        step.id = renamed;
    }
    seen.insert(step.id.clone());
}

fn normalize_type(step: &mut Step, phase: Phase, report: &mut HardenReport) {
    let StepType::Other(legacy) = step.step_type.clone() else {
        return;
    };
    match legacy.as_str() {
        "check" => {
            step.step_type = StepType::Command;
            step.check_type.get_or_insert(CheckType::CustomCommand);
        }
        "test" => {
            step.step_type = StepType::Command;
            if step.test_type.is_none() {
                step.test_type = Some(if step.code.is_some() {
                    TestType::Python
                } else {
                    TestType::Repository
                });
            }
        }
        "gate" => {
            step.step_type = StepType::Command;
            step.required_steps.get_or_insert_with(Vec::new);
        }
        "shell_command" | "shell" | "bash" => step.step_type = StepType::Command,
        "api_request" => {
            step.step_type = StepType::Command;
            step.command = api_request_command(step);
            if phase == Phase::Verification {
                step.check_type.get_or_insert(CheckType::CustomCommand);
                step.tool.get_or_insert_with(|| "curl".to_string());
            }
        }
        _ => {
            let content = step
                .content
                .clone()
                .or_else(|| {
                    step.extra
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| step.name.clone());
            into_prompt(step, content);
        }
    }
    report.push(HardenAction::NormalizedType {
        step_id: step.id.clone(),
        from: legacy,
        to: step.step_type.to_string(),
    });
}

/// curl invocation equivalent to a legacy `api_request` step.
fn api_request_command(step: &mut Step) -> Option<String> {
    let url = step.url.take()?;
    let method = step
        .extra
        .remove("method")
        .and_then(|value| value.as_str().map(str::to_uppercase))
        .unwrap_or_else(|| "GET".to_string());
    let body = step
        .extra
        .remove("body")
        .or_else(|| step.extra.remove("payload"))
        .map(|value| match value {
            Value::String(text) => text,
            other => other.to_string(),
        });

    let mut command = format!("curl -sf -X {method} {}", quote(&url));
    if let Some(body) = body {
        command.push_str(" -H 'Content-Type: application/json' -d ");
        command.push_str(&quote(&body));
    }
    Some(command)
}

/// Turn `step` into a prompt carrying `content`, clearing other payloads.
fn into_prompt(step: &mut Step, content: String) {
    let mut prompt = Step::new(step.id.clone(), StepType::Prompt, step.name.clone());
    prompt.phase = step.phase;
    prompt.content = Some(content);
    prompt.extra = std::mem::take(&mut step.extra);
    *step = prompt;
}

fn repair_field(report: &mut HardenReport, step: &Step, field: &str, detail: &str) {
    report.push(HardenAction::RepairedField {
        step_id: Some(step.id.clone()),
        field: field.to_string(),
        detail: detail.to_string(),
    });
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|text| text.trim().is_empty())
}

/// Repair what can be repaired; `Err(reason)` means drop the step.
fn repair_payload(step: &mut Step, report: &mut HardenReport) -> Result<(), String> {
    if step.is_gate() {
        return Ok(());
    }
    match step.step_type {
        StepType::Command => repair_command(step, report),
        StepType::UiBridge => repair_ui_bridge(step, report),
        StepType::Prompt => {
            if is_blank(step.content.as_deref()) {
                if step.name.trim().is_empty() {
                    return Err("prompt without content".to_string());
                }
                step.content = Some(step.name.clone());
                repair_field(report, step, "content", "filled from the step name");
            }
            Ok(())
        }
        StepType::Other(_) => Err(format!("unsupported step type `{}`", step.step_type)),
    }
}

fn repair_command(step: &mut Step, report: &mut HardenReport) -> Result<(), String> {
    if step.command.is_some() && is_blank(step.command.as_deref()) {
        step.command = None;
        repair_field(report, step, "command", "removed empty command");
    }
    if step.code.is_some() && is_blank(step.code.as_deref()) {
        step.code = None;
        repair_field(report, step, "code", "removed empty code");
    }

    if let Some(CheckType::Other(raw)) = &step.check_type {
        let detail = format!("unknown check_type `{raw}` set to custom_command");
        step.check_type = Some(CheckType::CustomCommand);
        repair_field(report, step, "check_type", &detail);
    }
    if let Some(TestType::Other(raw)) = &step.test_type {
        let detail = format!("unknown test_type `{raw}` replaced");
        step.test_type = Some(if step.code.is_some() {
            TestType::Python
        } else {
            TestType::Repository
        });
        repair_field(report, step, "test_type", &detail);
    }

    if step.check_type.is_some() && step.test_type.is_some() {
        if step.code.is_some() {
            step.check_type = None;
            repair_field(report, step, "check_type", "dropped; test mode kept for code");
        } else {
            step.test_type = None;
            repair_field(report, step, "test_type", "dropped; check mode kept for command");
        }
    }

    if step.command.is_some() && step.code.is_some() {
        let wants_code = step
            .test_type
            .as_ref()
            .is_some_and(|test_type| !test_type.runs_command());
        if wants_code {
            step.command = None;
            repair_field(report, step, "command", "dropped; test body is code");
        } else {
            step.code = None;
            repair_field(report, step, "code", "dropped; step runs its command");
        }
    }
    if step.command.is_none() && step.code.is_none() {
        return Err("command step without command or code".to_string());
    }

    if step.check_type.is_some() && step.command.is_none() {
        step.check_type = None;
        step.test_type = Some(TestType::Python);
        repair_field(report, step, "check_type", "code-only check run as a python test");
    }
    match &step.test_type {
        Some(test_type) if !test_type.runs_command() && step.code.is_none() => {
            step.test_type = Some(TestType::Repository);
            repair_field(report, step, "test_type", "shell command run as repository test");
        }
        Some(test_type) if test_type.runs_command() && step.command.is_none() => {
            step.test_type = Some(TestType::Python);
            repair_field(report, step, "test_type", "code body run as python test");
        }
        _ => {}
    }

    if let Some(command) = &step.command
        && !is_substantive(command)
    {
        return Err(format!("placeholder command `{}`", command.trim()));
    }
    if let Some(code) = &step.code
        && !is_substantive(code)
    {
        return Err("placeholder code".to_string());
    }

    if step.check_type.is_some() && is_blank(step.tool.as_deref()) {
        let tool = step
            .command
            .as_deref()
            .and_then(program_name)
            .unwrap_or_else(|| "custom".to_string());
        step.tool = Some(tool);
        repair_field(report, step, "tool", "inferred from the command");
    }
    if step.timeout_seconds == Some(0) {
        step.timeout_seconds = None;
        repair_field(report, step, "timeout_seconds", "removed zero timeout");
    }
    Ok(())
}

fn repair_ui_bridge(step: &mut Step, report: &mut HardenReport) -> Result<(), String> {
    let action = match &step.action {
        None => return Err("ui_bridge step without action".to_string()),
        Some(UiAction::Other(raw)) => return Err(format!("unknown ui_bridge action `{raw}`")),
        Some(action) => action.clone(),
    };
    match action {
        UiAction::Navigate if is_blank(step.url.as_deref()) => {
            return Err("navigate without url".to_string());
        }
        UiAction::Execute if is_blank(step.instruction.as_deref()) => {
            return Err("execute without instruction".to_string());
        }
        UiAction::Assert => {
            if is_blank(step.target.as_deref()) {
                return Err("assert without target".to_string());
            }
            let usable = match &step.assert_type {
                None | Some(AssertType::Other(_)) => false,
                Some(kind) if kind.is_text_based() => !is_blank(step.expected.as_deref()),
                Some(_) => true,
            };
            if !usable {
                step.assert_type = Some(AssertType::Visible);
                repair_field(report, step, "assert_type", "fell back to visible");
            }
        }
        _ => {}
    }
    if step.timeout_ms.is_some_and(|timeout| timeout <= 0) {
        step.timeout_ms = None;
        repair_field(report, step, "timeout_ms", "removed non-positive timeout");
    }
    Ok(())
}

fn drop_stray_gates(workflow: &mut Workflow, report: &mut HardenReport) {
    for phase in [Phase::Setup, Phase::Agentic, Phase::Completion] {
        let steps = workflow.steps_mut(phase);
        for gate in steps.iter().filter(|step| step.is_gate()) {
            report.push(HardenAction::Dropped {
                step_id: gate.id.clone(),
                reason: format!("gate in {phase}"),
            });
        }
        steps.retain(|step| !step.is_gate());
    }
}

/// Agentic steps must be prompts: oracles move to verification, anything
/// else becomes a prompt describing what it did.
fn relocate_agentic(workflow: &mut Workflow, report: &mut HardenReport) {
    let steps = std::mem::take(&mut workflow.agentic_steps);
    for mut step in steps {
        if step.is_prompt() {
            workflow.agentic_steps.push(step);
        } else if step.is_oracle() {
            step.phase = Some(Phase::Verification);
            report.push(HardenAction::MovedToVerification {
                step_id: step.id.clone(),
            });
            workflow.verification_steps.push(step);
        } else {
            let content = describe_action(&step);
            into_prompt(&mut step, content);
            report.push(HardenAction::WrappedAsPrompt {
                step_id: step.id.clone(),
            });
            workflow.agentic_steps.push(step);
        }
    }
}

fn describe_action(step: &Step) -> String {
    match (&step.step_type, &step.action) {
        (StepType::UiBridge, Some(UiAction::Navigate)) => format!(
            "Navigate the browser to {}.",
            step.url.as_deref().unwrap_or_default()
        ),
        (StepType::UiBridge, Some(UiAction::Execute)) => format!(
            "In the browser: {}",
            step.instruction.as_deref().unwrap_or_default()
        ),
        (StepType::UiBridge, _) => "Take a snapshot of the current UI and review it.".to_string(),
        _ => match (&step.command, &step.code) {
            (Some(command), _) => format!("Run `{command}` and address its output."),
            (None, Some(_)) => format!("Run the script from step {} and address its output.", step.name),
            (None, None) => step.name.clone(),
        },
    }
}
