//! Structural validation of workflows.
//!
//! `validate` never fails: every problem becomes a [`Diagnostic`]. Fatal
//! diagnostics block execution; advisory ones feed the hardener.

use std::collections::BTreeSet;

use crate::core::coverage;
use crate::core::hardener::navigation::missing_navigation_at;
use crate::core::hardener::rules::RuleSet;
use crate::core::hardener::strengthen::is_weak_stateful_check;
use crate::core::shell::STATEFUL_ENDPOINT_MARKERS;
use crate::core::substance::is_substantive;
use crate::core::types::{Diagnostic, DiagnosticKind};
use crate::workflow::{AssertType, CheckType, Phase, Step, StepType, TestType, UiAction, Workflow};

/// Validate a whole workflow against the default stateful endpoints.
/// Diagnostics come out in a stable order: per-step findings in phase order,
/// then workflow-level findings.
pub fn validate(workflow: &Workflow) -> Vec<Diagnostic> {
    validate_with(workflow, &STATEFUL_ENDPOINT_MARKERS)
}

/// Validate with the endpoint markers that identify live UI-state queries,
/// normally the configured `[hardener].stateful_endpoint_markers`.
pub fn validate_with<S: AsRef<str>>(workflow: &Workflow, markers: &[S]) -> Vec<Diagnostic> {
    let rules = RuleSet::standard();
    let mut out = Vec::new();
    let mut seen = BTreeSet::new();

    for (phase, step) in workflow.all_steps() {
        if step.id.trim().is_empty() {
            out.push(Diagnostic::new(
                DiagnosticKind::EmptyStepId,
                None,
                format!("step `{}` in {} has no id", step.name, phase.list_name()),
            ));
        } else if !seen.insert(step.id.as_str()) {
            out.push(diag(
                DiagnosticKind::DuplicateStepId,
                step,
                format!("step id `{}` is used more than once", step.id),
            ));
        }
        check_phase(step, phase, &mut out);
        check_step(step, phase, &rules, markers, &mut out);
    }

    check_workflow(workflow, markers, &mut out);
    out
}

fn diag(kind: DiagnosticKind, step: &Step, message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(kind, Some(step.id.as_str()), message)
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|text| text.trim().is_empty())
}

fn check_phase(step: &Step, phase: Phase, out: &mut Vec<Diagnostic>) {
    match step.phase {
        None => out.push(diag(
            DiagnosticKind::MissingPhase,
            step,
            format!("step `{}` has no phase field; {phase} assumed from its list", step.id),
        )),
        Some(declared) if declared != phase => out.push(diag(
            DiagnosticKind::PhaseMismatch,
            step,
            format!(
                "step `{}` declares phase {declared} but sits in {}",
                step.id,
                phase.list_name()
            ),
        )),
        Some(_) => {}
    }
}

fn check_step<S: AsRef<str>>(
    step: &Step,
    phase: Phase,
    rules: &RuleSet,
    markers: &[S],
    out: &mut Vec<Diagnostic>,
) {
    if let StepType::Other(raw) = &step.step_type {
        out.push(diag(
            DiagnosticKind::InvalidStepType,
            step,
            format!(
                "step `{}` has type `{raw}`; expected command, ui_bridge or prompt",
                step.id
            ),
        ));
        if step.is_gate() && phase != Phase::Verification {
            out.push(gate_outside(step, phase));
        }
        return;
    }

    if step.is_gate() {
        check_gate_payload(step, phase, out);
        return;
    }

    if phase == Phase::Agentic && !step.is_prompt() {
        out.push(diag(
            DiagnosticKind::NonPromptAgenticStep,
            step,
            format!("agentic step `{}` is a {} step; only prompts run there", step.id, step.step_type),
        ));
    }

    match step.step_type {
        StepType::Command => check_command(step, phase, markers, out),
        StepType::UiBridge => check_ui_bridge(step, out),
        StepType::Prompt => check_prompt(step, phase, rules, out),
        StepType::Other(_) => {}
    }
}

fn gate_outside(step: &Step, phase: Phase) -> Diagnostic {
    diag(
        DiagnosticKind::GateOutsideVerification,
        step,
        format!("gate `{}` sits in {}", step.id, phase.list_name()),
    )
}

fn check_gate_payload(step: &Step, phase: Phase, out: &mut Vec<Diagnostic>) {
    if phase != Phase::Verification {
        out.push(gate_outside(step, phase));
    }
    if step.step_type != StepType::Command {
        out.push(diag(
            DiagnosticKind::InvalidStepType,
            step,
            format!("gate `{}` must be a command step, not {}", step.id, step.step_type),
        ));
    }
    if step.command.is_some() || step.code.is_some() {
        out.push(diag(
            DiagnosticKind::CommandPayloadConflict,
            step,
            format!("gate `{}` carries a command or code body", step.id),
        ));
    }
}

fn check_command<S: AsRef<str>>(
    step: &Step,
    phase: Phase,
    markers: &[S],
    out: &mut Vec<Diagnostic>,
) {
    let has_command = !is_blank(step.command.as_deref());
    let has_code = !is_blank(step.code.as_deref());

    if step.check_type.is_some() && step.test_type.is_some() {
        out.push(diag(
            DiagnosticKind::ModeConflict,
            step,
            format!("step `{}` sets both check_type and test_type", step.id),
        ));
    }
    if has_command && has_code {
        out.push(diag(
            DiagnosticKind::CommandPayloadConflict,
            step,
            format!("step `{}` sets both command and code", step.id),
        ));
    }

    match (&step.check_type, &step.test_type) {
        (Some(check_type), _) => check_check_mode(step, check_type, has_command, out),
        (None, Some(test_type)) => check_test_mode(step, test_type, has_command, has_code, out),
        (None, None) => {
            if !has_command && !has_code {
                out.push(diag(
                    DiagnosticKind::MissingCommand,
                    step,
                    format!("command step `{}` has neither command nor code", step.id),
                ));
            }
        }
    }

    for body in [step.command.as_deref(), step.code.as_deref()]
        .into_iter()
        .flatten()
        .filter(|body| !body.trim().is_empty())
    {
        if !is_substantive(body) {
            out.push(diag(
                DiagnosticKind::NonSubstantiveCommand,
                step,
                format!("step `{}` runs a placeholder: `{}`", step.id, body.trim()),
            ));
        }
    }

    if step.timeout_seconds == Some(0) {
        out.push(diag(
            DiagnosticKind::InvalidTimeout,
            step,
            format!("step `{}` has timeout_seconds 0", step.id),
        ));
    }

    if phase == Phase::Verification && is_weak_stateful_check(step, markers) {
        out.push(diag(
            DiagnosticKind::WeakStatefulCheck,
            step,
            format!(
                "step `{}` queries live UI state but only checks the exit status",
                step.id
            ),
        ));
    }
}

fn check_check_mode(step: &Step, check_type: &CheckType, has_command: bool, out: &mut Vec<Diagnostic>) {
    if !check_type.is_known() {
        out.push(diag(
            DiagnosticKind::UnknownCheckType,
            step,
            format!("step `{}` has unknown check_type `{check_type}`", step.id),
        ));
    }
    if !has_command {
        out.push(diag(
            DiagnosticKind::MissingCommand,
            step,
            format!("check `{}` has no command", step.id),
        ));
    }
    if is_blank(step.tool.as_deref()) {
        out.push(diag(
            DiagnosticKind::MissingTool,
            step,
            format!("check `{}` does not name its tool", step.id),
        ));
    }
}

fn check_test_mode(
    step: &Step,
    test_type: &TestType,
    has_command: bool,
    has_code: bool,
    out: &mut Vec<Diagnostic>,
) {
    if !test_type.is_known() {
        out.push(diag(
            DiagnosticKind::UnknownTestType,
            step,
            format!("step `{}` has unknown test_type `{test_type}`", step.id),
        ));
        return;
    }
    if test_type.runs_command() {
        if !has_command {
            out.push(diag(
                DiagnosticKind::TestPayloadMismatch,
                step,
                format!("{test_type} test `{}` needs a command", step.id),
            ));
        }
        return;
    }
    if !has_code {
        out.push(diag(
            DiagnosticKind::TestPayloadMismatch,
            step,
            format!("{test_type} test `{}` needs a code body", step.id),
        ));
        if has_command && *test_type == TestType::Playwright {
            out.push(diag(
                DiagnosticKind::PlaywrightShellCommand,
                step,
                format!(
                    "playwright test `{}` carries a shell command; it will fail with \
                     \"No test_id specified\" (use test_type repository)",
                    step.id
                ),
            ));
        }
    }
}

fn check_ui_bridge(step: &Step, out: &mut Vec<Diagnostic>) {
    let missing = |field: &str| {
        diag(
            DiagnosticKind::MissingUiField,
            step,
            format!("ui_bridge step `{}` is missing `{field}`", step.id),
        )
    };

    match &step.action {
        None => out.push(diag(
            DiagnosticKind::MissingUiAction,
            step,
            format!("ui_bridge step `{}` has no action", step.id),
        )),
        Some(UiAction::Other(raw)) => out.push(diag(
            DiagnosticKind::UnknownUiAction,
            step,
            format!("ui_bridge step `{}` has unknown action `{raw}`", step.id),
        )),
        Some(UiAction::Navigate) if is_blank(step.url.as_deref()) => out.push(missing("url")),
        Some(UiAction::Execute) if is_blank(step.instruction.as_deref()) => {
            out.push(missing("instruction"));
        }
        Some(UiAction::Assert) => {
            if is_blank(step.target.as_deref()) {
                out.push(missing("target"));
            }
            match &step.assert_type {
                None => out.push(missing("assert_type")),
                Some(AssertType::Other(raw)) => out.push(diag(
                    DiagnosticKind::UnknownAssertType,
                    step,
                    format!("ui_bridge step `{}` has unknown assert_type `{raw}`", step.id),
                )),
                Some(kind) if kind.is_text_based() && is_blank(step.expected.as_deref()) => {
                    out.push(missing("expected"));
                }
                Some(_) => {}
            }
        }
        Some(_) => {}
    }

    if let Some(timeout) = step.timeout_ms
        && timeout <= 0
    {
        out.push(diag(
            DiagnosticKind::InvalidTimeout,
            step,
            format!("ui_bridge step `{}` has timeout_ms {timeout}", step.id),
        ));
    }
}

fn check_prompt(step: &Step, phase: Phase, rules: &RuleSet, out: &mut Vec<Diagnostic>) {
    let Some(content) = step.content.as_deref().filter(|text| !text.trim().is_empty()) else {
        out.push(diag(
            DiagnosticKind::PromptMissingContent,
            step,
            format!("prompt `{}` has no content", step.id),
        ));
        return;
    };
    if phase != Phase::Verification {
        return;
    }
    let matched: Vec<&str> = coverage::clauses(content)
        .iter()
        .filter_map(|clause| rules.detect(clause).map(|(rule, _)| rule.name))
        .collect();
    if matched.is_empty() {
        out.push(diag(
            DiagnosticKind::SubjectivePrompt,
            step,
            format!(
                "verification prompt `{}` has no deterministic equivalent and never counts toward the gate",
                step.id
            ),
        ));
    } else {
        out.push(diag(
            DiagnosticKind::ConvertiblePrompt,
            step,
            format!(
                "verification prompt `{}` can become deterministic checks ({})",
                step.id,
                matched.join(", ")
            ),
        ));
    }
}

fn check_workflow<S: AsRef<str>>(workflow: &Workflow, markers: &[S], out: &mut Vec<Diagnostic>) {
    if workflow.max_iterations == Some(0) {
        out.push(Diagnostic::new(
            DiagnosticKind::InvalidMaxIterations,
            None,
            "max_iterations must be at least 1",
        ));
    }

    let verification = &workflow.verification_steps;
    if verification.is_empty() {
        if !workflow.agentic_steps.is_empty() {
            out.push(Diagnostic::new(
                DiagnosticKind::MissingVerification,
                None,
                "agentic steps need a verification phase to decide when they are done",
            ));
        }
    } else {
        if !verification.iter().any(Step::is_oracle) {
            out.push(Diagnostic::new(
                DiagnosticKind::NoDeterministicOracle,
                None,
                "verification has no check, test or ui_bridge assertion",
            ));
        }
        check_gate(verification, out);
    }

    if missing_navigation_at(workflow, markers).is_some() {
        out.push(Diagnostic::new(
            DiagnosticKind::MissingNavigation,
            None,
            "setup navigates the browser but verification reads UI state without navigating again",
        ));
    }

    for (step_id, goal) in coverage::uncovered_goals(workflow) {
        let mut diagnostic = Diagnostic::new(
            DiagnosticKind::UncoveredAgenticGoal,
            Some(&step_id),
            format!("no verification step covers \"{goal}\""),
        );
        diagnostic.goal = Some(goal);
        out.push(diagnostic);
    }
}

fn check_gate(verification: &[Step], out: &mut Vec<Diagnostic>) {
    let gates: Vec<&Step> = verification.iter().filter(|step| step.is_gate()).collect();
    let Some(gate) = gates.last() else {
        out.push(Diagnostic::new(
            DiagnosticKind::MissingGate,
            None,
            "verification does not end with a gate",
        ));
        return;
    };
    if gates.len() > 1 {
        let ids: Vec<&str> = gates.iter().map(|step| step.id.as_str()).collect();
        out.push(Diagnostic::new(
            DiagnosticKind::MultipleGates,
            None,
            format!("verification has {} gates: {}", gates.len(), ids.join(", ")),
        ));
    }
    if verification.last().is_none_or(|last| !last.is_gate()) {
        out.push(diag(
            DiagnosticKind::GateNotTerminal,
            gate,
            format!("gate `{}` is not the last verification step", gate.id),
        ));
    }

    let eligible: Vec<&str> = verification
        .iter()
        .filter(|step| step.is_gate_eligible())
        .map(|step| step.id.as_str())
        .collect();
    let required: Vec<&str> = gate
        .required_steps
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    let omitted: Vec<&str> = eligible
        .iter()
        .copied()
        .filter(|id| !required.contains(id))
        .collect();
    let foreign: Vec<&str> = required
        .iter()
        .copied()
        .filter(|id| !eligible.contains(id))
        .collect();
    if !omitted.is_empty() || !foreign.is_empty() {
        let mut parts = Vec::new();
        if !omitted.is_empty() {
            parts.push(format!("omits {}", omitted.join(", ")));
        }
        if !foreign.is_empty() {
            parts.push(format!("requires unknown {}", foreign.join(", ")));
        }
        out.push(diag(
            DiagnosticKind::GateIncomplete,
            gate,
            format!("gate `{}` {}", gate.id, parts.join("; ")),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Workflow {
        serde_json::from_value(value).expect("parse workflow")
    }

    fn kinds(workflow: &Workflow) -> Vec<DiagnosticKind> {
        validate(workflow).into_iter().map(|d| d.kind).collect()
    }

    fn fatal_kinds(workflow: &Workflow) -> Vec<DiagnosticKind> {
        validate(workflow)
            .into_iter()
            .filter(Diagnostic::is_fatal)
            .map(|d| d.kind)
            .collect()
    }

    fn lint_workflow() -> serde_json::Value {
        json!({
            "name": "lint",
            "verification_steps": [
                {"id": "ruff", "type": "command", "phase": "verification", "check_type": "lint", "tool": "ruff", "command": "ruff check ."},
                {"id": "mypy", "type": "command", "phase": "verification", "check_type": "typecheck", "tool": "mypy", "command": "mypy ."},
                {"id": "gate", "type": "command", "phase": "verification", "required_steps": ["ruff", "mypy"]}
            ],
            "agentic_steps": [
                {"id": "fix", "type": "prompt", "phase": "agentic", "content": "Fix the ruff and mypy errors"}
            ]
        })
    }

    #[test]
    fn well_formed_workflow_has_no_diagnostics() {
        assert_eq!(validate(&parse(lint_workflow())), Vec::new());
    }

    #[test]
    fn legacy_types_are_named() {
        let workflow = parse(json!({
            "name": "legacy",
            "setup_steps": [{"id": "s", "type": "shell_command", "phase": "setup", "command": "npm ci"}]
        }));
        let diagnostics = validate(&workflow);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::InvalidStepType);
        assert_eq!(diagnostics[0].step_id.as_deref(), Some("s"));
        assert!(diagnostics[0].message.contains("shell_command"));
    }

    #[test]
    fn prompt_only_verification_is_fatal() {
        let workflow = parse(json!({
            "name": "prompts",
            "verification_steps": [
                {"id": "look", "type": "prompt", "phase": "verification", "content": "Make sure it looks good"}
            ]
        }));
        let fatal = fatal_kinds(&workflow);
        assert!(fatal.contains(&DiagnosticKind::NoDeterministicOracle));
        assert!(fatal.contains(&DiagnosticKind::MissingGate));
        assert!(kinds(&workflow).contains(&DiagnosticKind::SubjectivePrompt));
    }

    #[test]
    fn gate_must_match_eligible_steps_exactly() {
        let mut value = lint_workflow();
        value["verification_steps"][2]["required_steps"] = json!(["ruff", "eslint"]);
        let diagnostics = validate(&parse(value));
        let incomplete = diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::GateIncomplete)
            .expect("gate incomplete");
        assert!(incomplete.message.contains("omits mypy"));
        assert!(incomplete.message.contains("requires unknown eslint"));
    }

    #[test]
    fn gate_placement_is_checked() {
        let mut value = lint_workflow();
        let steps = value["verification_steps"].as_array_mut().expect("array");
        steps.swap(1, 2);
        steps.push(json!({"id": "gate-2", "type": "command", "phase": "verification", "required_steps": []}));
        let fatal = fatal_kinds(&parse(value));
        assert!(fatal.contains(&DiagnosticKind::MultipleGates));
        assert!(!fatal.contains(&DiagnosticKind::GateNotTerminal));

        let mut value = lint_workflow();
        value["verification_steps"].as_array_mut().expect("array").swap(1, 2);
        assert!(fatal_kinds(&parse(value)).contains(&DiagnosticKind::GateNotTerminal));
    }

    #[test]
    fn command_modes_and_payloads() {
        let workflow = parse(json!({
            "name": "modes",
            "setup_steps": [
                {"id": "both", "type": "command", "phase": "setup", "check_type": "lint", "test_type": "python", "tool": "x", "command": "ruff check ."},
                {"id": "notool", "type": "command", "phase": "setup", "check_type": "lint", "command": "ruff check ."},
                {"id": "todo", "type": "command", "phase": "setup", "command": "echo TODO"},
                {"id": "pw", "type": "command", "phase": "setup", "test_type": "playwright", "command": "npx playwright test"},
                {"id": "weird", "type": "command", "phase": "setup", "check_type": "vibes", "tool": "x", "command": "ruff check ."}
            ]
        }));
        let diagnostics = validate(&workflow);
        let of = |id: &str| -> Vec<DiagnosticKind> {
            diagnostics
                .iter()
                .filter(|d| d.step_id.as_deref() == Some(id))
                .map(|d| d.kind)
                .collect()
        };
        assert_eq!(of("both"), vec![DiagnosticKind::ModeConflict]);
        assert_eq!(of("notool"), vec![DiagnosticKind::MissingTool]);
        assert_eq!(of("todo"), vec![DiagnosticKind::NonSubstantiveCommand]);
        assert_eq!(
            of("pw"),
            vec![
                DiagnosticKind::TestPayloadMismatch,
                DiagnosticKind::PlaywrightShellCommand
            ]
        );
        assert_eq!(of("weird"), vec![DiagnosticKind::UnknownCheckType]);
    }

    #[test]
    fn ui_bridge_fields_follow_action() {
        let workflow = parse(json!({
            "name": "ui",
            "setup_steps": [
                {"id": "nav", "type": "ui_bridge", "phase": "setup", "action": "navigate"},
                {"id": "text", "type": "ui_bridge", "phase": "setup", "action": "assert", "target": "Title", "assert_type": "hasText", "timeout_ms": 0},
                {"id": "legacy", "type": "ui_bridge", "phase": "setup", "ui_bridge_action": "assert", "ui_bridge_target": "Save", "ui_bridge_assert_type": "visible"}
            ]
        }));
        let diagnostics = validate(&workflow);
        let kinds: Vec<(Option<&str>, DiagnosticKind)> = diagnostics
            .iter()
            .map(|d| (d.step_id.as_deref(), d.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Some("nav"), DiagnosticKind::MissingUiField),
                (Some("text"), DiagnosticKind::MissingUiField),
                (Some("text"), DiagnosticKind::InvalidTimeout),
            ]
        );
    }

    #[test]
    fn agentic_rules_and_coverage() {
        let mut value = lint_workflow();
        value["agentic_steps"] = json!([
            {"id": "fix", "type": "prompt", "phase": "agentic", "content": "Fix the ruff errors. Add a Runner Name field to the Settings page."},
            {"id": "build", "type": "command", "phase": "agentic", "command": "npm run build"}
        ]);
        let diagnostics = validate(&parse(value));
        assert!(diagnostics.iter().any(|d| {
            d.kind == DiagnosticKind::NonPromptAgenticStep && d.step_id.as_deref() == Some("build")
        }));
        let uncovered: Vec<&str> = diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::UncoveredAgenticGoal)
            .filter_map(|d| d.goal.as_deref())
            .collect();
        assert_eq!(uncovered, vec!["Add a Runner Name field to the Settings page"]);
    }

    #[test]
    fn missing_verification_and_iterations() {
        let workflow = parse(json!({
            "name": "agentic",
            "max_iterations": 0,
            "agentic_steps": [{"id": "p", "type": "prompt", "phase": "agentic", "content": "Refactor"}]
        }));
        let fatal = fatal_kinds(&workflow);
        assert!(fatal.contains(&DiagnosticKind::InvalidMaxIterations));
        assert!(fatal.contains(&DiagnosticKind::MissingVerification));
        assert!(validate(&Workflow::new("empty")).is_empty());
    }

    #[test]
    fn advisories_do_not_block() {
        let mut value = lint_workflow();
        value["setup_steps"] = json!([
            {"id": "nav", "type": "ui_bridge", "phase": "setup", "action": "navigate", "url": "http://localhost:3001/settings"}
        ]);
        let steps = value["verification_steps"].as_array_mut().expect("array");
        steps.insert(0, json!({
            "id": "elements", "type": "command", "check_type": "custom_command", "tool": "curl",
            "command": "curl -s http://localhost:9876/ui-bridge/control/elements"
        }));
        steps[3]["required_steps"] = json!(["elements", "ruff", "mypy"]);

        let diagnostics = validate(&parse(value));
        let kinds: Vec<DiagnosticKind> = diagnostics.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiagnosticKind::MissingPhase));
        assert!(kinds.contains(&DiagnosticKind::WeakStatefulCheck));
        assert!(kinds.contains(&DiagnosticKind::MissingNavigation));
        assert!(diagnostics.iter().all(|d| !d.is_fatal()));
    }

    #[test]
    fn convertible_and_subjective_prompts_are_told_apart() {
        let mut value = lint_workflow();
        let steps = value["verification_steps"].as_array_mut().expect("array");
        steps.insert(0, json!({"id": "readme", "type": "prompt", "phase": "verification", "content": "Check that README.md exists"}));
        steps.insert(0, json!({"id": "taste", "type": "prompt", "phase": "verification", "content": "The layout feels balanced"}));
        let diagnostics = validate(&parse(value));
        let kind_of = |id: &str| {
            diagnostics
                .iter()
                .find(|d| d.step_id.as_deref() == Some(id))
                .map(|d| d.kind)
        };
        assert_eq!(kind_of("readme"), Some(DiagnosticKind::ConvertiblePrompt));
        assert_eq!(kind_of("taste"), Some(DiagnosticKind::SubjectivePrompt));
    }

    /// Weak-check advisories follow whichever endpoint markers the caller
    /// configures.
    #[test]
    fn stateful_markers_come_from_the_caller() {
        let mut value = lint_workflow();
        let steps = value["verification_steps"].as_array_mut().expect("array");
        steps.insert(0, json!({
            "id": "state", "type": "command", "phase": "verification", "check_type": "custom_command",
            "tool": "curl", "command": "curl -s http://localhost:7000/app/state"
        }));
        steps[3]["required_steps"] = json!(["state", "ruff", "mypy"]);
        let workflow = parse(value);

        let weak = |diagnostics: Vec<Diagnostic>| {
            diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::WeakStatefulCheck)
        };
        assert!(!weak(validate(&workflow)));
        assert!(weak(validate_with(&workflow, &["/app/state"])));
    }
}
