//! Loop-level scheduler tests for full workflow lifecycle scenarios.
//!
//! These tests drive `run_workflow` with scripted executors through multiple
//! verification/agentic iterations to check phase ordering, gate verdicts,
//! agent context and terminal outcomes.

use verifier::core::types::{GateOutcome, StepStatus, UnmetReason, UnmetStep};
use verifier::io::run_log::{load_report, write_run};
use verifier::io::session::BrowserSession;
use verifier::scheduler::{CancelFlag, Executors, RunOptions, RunOutcome, run_workflow};
use verifier::test_support::{
    ScriptedAgent, ScriptedCommandExecutor, ScriptedUiBridge, assert_step, check_step,
    command_step, gate_step, prompt_step, workflow,
};
use verifier::workflow::{Phase, Workflow};

fn executors() -> Executors<ScriptedCommandExecutor, ScriptedUiBridge, ScriptedAgent> {
    Executors {
        commands: ScriptedCommandExecutor::new(),
        ui_bridge: ScriptedUiBridge::new(),
        agent: ScriptedAgent::new(),
    }
}

fn run(
    wf: &Workflow,
    executors: &Executors<ScriptedCommandExecutor, ScriptedUiBridge, ScriptedAgent>,
) -> verifier::scheduler::RunReport {
    run_workflow(wf, executors, &RunOptions::default(), &CancelFlag::new())
}

/// Python lint workflow: ruff and mypy gate the loop, an agent fixes.
fn lint_workflow() -> Workflow {
    workflow(
        "python-lint",
        vec![command_step("install", "uv sync")],
        vec![
            check_step("ruff", "ruff check ."),
            check_step("mypy", "mypy ."),
            gate_step("gate", &["ruff", "mypy"]),
        ],
        vec![prompt_step("fix", "Fix every ruff and mypy error")],
        vec![command_step("commit", "git commit -am 'fix lint'")],
    )
}

/// Full lifecycle: both checks fail, ruff is fixed first, then mypy.
///
/// Execution sequence:
/// 1. Setup: install.
/// 2. Pass 1: ruff fails, mypy fails → agent sees both.
/// 3. Pass 2: ruff passes, mypy fails → agent sees only mypy.
/// 4. Pass 3: both pass → completion runs commit.
#[test]
fn lint_fixes_converge_over_three_passes() {
    let executors = executors();
    executors.commands.script("ruff", &[1, 0]);
    executors.commands.script("mypy", &[1, 1, 0]);

    let report = run(&lint_workflow(), &executors);

    assert_eq!(report.outcome, RunOutcome::Success { iterations: 3 });
    assert_eq!(
        executors.commands.calls(),
        vec!["install", "ruff", "mypy", "ruff", "mypy", "ruff", "mypy", "commit"]
    );

    let verdicts: Vec<Vec<&str>> = report
        .iterations
        .iter()
        .map(|record| record.gate.unmet_ids())
        .collect();
    assert_eq!(verdicts, vec![vec!["ruff", "mypy"], vec!["mypy"], vec![]]);

    let prompts = executors.agent.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].starts_with("Fix every ruff and mypy error"));
    assert!(prompts[0].contains("- `ruff` (ruff): failed"));
    assert!(prompts[0].contains("- `mypy` (mypy): failed"));
    assert!(prompts[1].contains("Verification pass 2 of 5"));
    assert!(!prompts[1].contains("`ruff`"));
    assert!(prompts[1].contains("mypy .: exit 1"));

    assert!(report.iterations[2].agentic.is_empty());
    assert!(report.completion.get("commit").expect("commit").succeeded());
}

/// A gate that never passes stops after `max_iterations` verification passes
/// with no agentic phase after the last one.
#[test]
fn exhaustion_after_max_iterations() {
    let mut wf = lint_workflow();
    wf.max_iterations = Some(3);
    let executors = executors();
    executors.commands.script("ruff", &[1]);

    let report = run(&wf, &executors);

    assert_eq!(
        report.outcome,
        RunOutcome::IterationsExhausted {
            iterations: 3,
            unmet: vec![UnmetStep {
                id: "ruff".to_string(),
                reason: UnmetReason::Failed,
            }],
        }
    );
    assert_eq!(report.iterations.len(), 3);
    assert_eq!(executors.agent.prompts().len(), 2);
    assert!(report.completion.is_empty());
    assert!(!executors.commands.calls().contains(&"commit".to_string()));
}

#[test]
fn required_setup_failure_skips_everything_else() {
    let executors = executors();
    executors.commands.script("install", &[2]);

    let report = run(&lint_workflow(), &executors);

    assert_eq!(
        report.outcome,
        RunOutcome::SetupFailure {
            step_id: "install".to_string()
        }
    );
    assert_eq!(executors.commands.calls(), vec!["install"]);
    assert_eq!(
        report.setup.get("install").expect("install").status,
        StepStatus::Failure
    );
}

#[test]
fn optional_setup_failure_is_recorded_and_ignored() {
    let mut wf = lint_workflow();
    wf.setup_steps[0].fail_on_error = Some(false);
    let executors = executors();
    executors.commands.script("install", &[2]);

    let report = run(&wf, &executors);

    assert_eq!(report.outcome, RunOutcome::Success { iterations: 1 });
    assert!(!report.setup.get("install").expect("install").succeeded());
}

#[test]
fn completion_failure_depends_on_fail_on_error() {
    let executors = executors();
    executors.commands.script("commit", &[1]);
    let report = run(&lint_workflow(), &executors);
    assert_eq!(
        report.outcome,
        RunOutcome::CompletionFailure {
            step_id: "commit".to_string()
        }
    );

    let mut wf = lint_workflow();
    wf.completion_steps[0].fail_on_error = Some(false);
    let executors = self::executors();
    executors.commands.script("commit", &[1]);
    let report = run(&wf, &executors);
    assert_eq!(report.outcome, RunOutcome::Success { iterations: 1 });
    assert!(!report.completion.get("commit").expect("commit").succeeded());
}

/// An explicit `fail_on_error: true` failure ends the pass; the steps after
/// it are reported missing rather than failed.
#[test]
fn fail_fast_verification_reports_skipped_steps_missing() {
    let mut wf = lint_workflow();
    wf.verification_steps[0].fail_on_error = Some(true);
    wf.max_iterations = Some(1);
    let executors = executors();
    executors.commands.script("ruff", &[1]);

    let report = run(&wf, &executors);

    assert_eq!(
        report.iterations[0].gate,
        GateOutcome::Fail {
            unmet: vec![
                UnmetStep {
                    id: "ruff".to_string(),
                    reason: UnmetReason::Failed,
                },
                UnmetStep {
                    id: "mypy".to_string(),
                    reason: UnmetReason::Missing,
                },
            ],
        }
    );
    assert!(report.iterations[0].verification.get("mypy").is_none());
}

/// Without an explicit `fail_on_error`, a failed verification step does not
/// stop the pass.
#[test]
fn verification_failures_do_not_stop_the_pass_by_default() {
    let mut wf = lint_workflow();
    wf.max_iterations = Some(1);
    let executors = executors();
    executors.commands.script("ruff", &[1]);

    let report = run(&wf, &executors);
    assert!(report.iterations[0].verification.get("mypy").is_some());
}

/// UI workflow: navigate in setup, assert in verification, serialized
/// browser session.
#[test]
fn ui_assertions_gate_the_loop() {
    let mut navigate = verifier::workflow::Step::new(
        "open",
        verifier::workflow::StepType::UiBridge,
        "Open settings",
    );
    navigate.action = Some(verifier::workflow::UiAction::Navigate);
    navigate.url = Some("http://localhost:3001/settings".to_string());
    let wf = workflow(
        "settings",
        vec![navigate],
        vec![
            check_step("tsc", "npx tsc --noEmit"),
            assert_step("save-visible", "Save button"),
            gate_step("gate", &["tsc", "save-visible"]),
        ],
        vec![prompt_step("build", "Add a Save button to the settings page")],
        vec![],
    );
    let executors = executors();
    executors.ui_bridge.script("save-visible", &[false, true]);
    let options = RunOptions {
        session: Some(BrowserSession::new()),
        ..RunOptions::default()
    };

    let report = run_workflow(&wf, &executors, &options, &CancelFlag::new());

    assert_eq!(report.outcome, RunOutcome::Success { iterations: 2 });
    assert_eq!(
        executors.ui_bridge.calls(),
        vec!["open", "save-visible", "save-visible"]
    );
    assert_eq!(report.iterations[0].gate.unmet_ids(), vec!["save-visible"]);
}

#[test]
fn empty_workflow_succeeds_without_iterations() {
    let wf = workflow("noop", vec![command_step("echo", "echo hi")], vec![], vec![], vec![]);
    let executors = executors();
    let report = run(&wf, &executors);
    assert_eq!(report.outcome, RunOutcome::Success { iterations: 0 });
    assert!(report.iterations.is_empty());
}

#[test]
fn cancellation_names_the_next_step() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = run_workflow(&lint_workflow(), &executors(), &RunOptions::default(), &cancel);
    assert_eq!(
        report.outcome,
        RunOutcome::Cancelled {
            phase: Phase::Setup,
            next_step: "install".to_string()
        }
    );
}

#[test]
fn reports_round_trip_through_the_record_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let executors = executors();
    executors.commands.script("ruff", &[1, 0]);
    let report = run(&lint_workflow(), &executors);

    let paths = write_run(temp.path(), &report).expect("write run");
    assert!(paths.iteration_path(1).is_file());
    assert!(paths.iteration_path(2).is_file());
    let loaded = load_report(temp.path(), &report.run_id)
        .expect("load")
        .expect("present");
    assert_eq!(loaded, report);
}
