//! Phase scheduler: runs a validated workflow to a terminal outcome.
//!
//! Setup runs once, then verification and agentic alternate until the gate
//! passes or the iteration budget is spent, then completion runs. Steps run
//! strictly in declared order. The workflow is never mutated; results go
//! into per-phase [`ExecutionRecord`]s collected in a [`RunReport`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::gate;
use crate::core::phases::{Transition, after_gate};
use crate::core::types::{
    Diagnostic, ExecutionRecord, GateOutcome, StepResult, StepStatus, UnmetReason, UnmetStep,
    partition,
};
use crate::core::shell::STATEFUL_ENDPOINT_MARKERS;
use crate::core::validator::validate_with;
use crate::io::agent::{AgenticContext, FailureContext, PromptExecutor, PromptRequest, render_agentic_prompt};
use crate::io::command::{CommandBody, CommandExecutor, CommandRequest};
use crate::io::config::{SessionMode, VerifierConfig};
use crate::io::process::tail;
use crate::io::run_log::generate_run_id;
use crate::io::session::BrowserSession;
use crate::io::ui_bridge::{UiBridgeDriver, UiBridgeRequest};
use crate::workflow::{Phase, Step, StepType, Workflow};

/// The three execution seams a run needs.
pub struct Executors<C, U, P> {
    pub commands: C,
    pub ui_bridge: U,
    pub agent: P,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// For command steps without `timeout_seconds`.
    pub command_timeout: Duration,
    /// For ui_bridge steps without a positive `timeout_ms`.
    pub ui_timeout: Duration,
    pub agent_timeout: Duration,
    /// Bytes of a failed step's output shown to the agent.
    pub context_output_bytes: usize,
    /// Lock taken around runs that touch the browser; `None` takes no lock.
    pub session: Option<BrowserSession>,
    /// Endpoints whose responses reflect live UI state, for advisories.
    pub stateful_endpoint_markers: Vec<String>,
    /// Id to record the run under; generated when unset.
    pub run_id: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(600),
            ui_timeout: Duration::from_secs(30),
            agent_timeout: Duration::from_secs(600),
            context_output_bytes: 2_000,
            session: None,
            stateful_endpoint_markers: STATEFUL_ENDPOINT_MARKERS.map(String::from).to_vec(),
            run_id: None,
        }
    }
}

impl RunOptions {
    /// Options from config. `session` is used only in serialized mode.
    pub fn from_config(config: &VerifierConfig, session: &BrowserSession) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.default_command_timeout_secs),
            ui_timeout: Duration::from_millis(config.ui_bridge.default_timeout_ms),
            agent_timeout: Duration::from_secs(config.agent.timeout_secs),
            context_output_bytes: RunOptions::default().context_output_bytes,
            session: match config.ui_bridge.session {
                SessionMode::Serialized => Some(session.clone()),
                SessionMode::Exclusive => None,
            },
            stateful_endpoint_markers: config.hardener.stateful_endpoint_markers.clone(),
            run_id: None,
        }
    }
}

/// Abort signal checked before every step.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Shared flag for signal handlers.
    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        iterations: u32,
    },
    /// Fatal diagnostics; nothing ran.
    StructuralError {
        diagnostics: Vec<Diagnostic>,
    },
    SetupFailure {
        step_id: String,
    },
    IterationsExhausted {
        iterations: u32,
        unmet: Vec<UnmetStep>,
    },
    CompletionFailure {
        step_id: String,
    },
    Cancelled {
        phase: Phase,
        next_step: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success { .. } => "success",
            RunOutcome::StructuralError { .. } => "structural_error",
            RunOutcome::SetupFailure { .. } => "setup_failure",
            RunOutcome::IterationsExhausted { .. } => "iterations_exhausted",
            RunOutcome::CompletionFailure { .. } => "completion_failure",
            RunOutcome::Cancelled { .. } => "cancelled",
        }
    }
}

/// One verification pass and the agentic pass that followed it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub verification: ExecutionRecord,
    pub gate: GateOutcome,
    #[serde(default)]
    pub agentic: ExecutionRecord,
}

/// Everything a run produced, including every non-passing step result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Advisory diagnostics of the executed workflow.
    #[serde(default)]
    pub advisories: Vec<Diagnostic>,
    pub setup: ExecutionRecord,
    pub iterations: Vec<IterationRecord>,
    pub completion: ExecutionRecord,
    pub outcome: RunOutcome,
}

/// Run `workflow` to a terminal outcome.
///
/// Refuses workflows with fatal diagnostics. Never returns an error: step
/// failures, including executor errors, are recorded as results.
#[instrument(skip_all, fields(workflow = %workflow.name))]
pub fn run_workflow<C, U, P>(
    workflow: &Workflow,
    executors: &Executors<C, U, P>,
    options: &RunOptions,
    cancel: &CancelFlag,
) -> RunReport
where
    C: CommandExecutor,
    U: UiBridgeDriver,
    P: PromptExecutor,
{
    let started_at = Utc::now();
    let (fatal, advisories) = partition(validate_with(workflow, &options.stateful_endpoint_markers));
    let mut run = Run {
        workflow,
        executors,
        options,
        cancel,
        report: RunReport {
            run_id: options
                .run_id
                .clone()
                .unwrap_or_else(|| generate_run_id(workflow, started_at)),
            workflow: workflow.name.clone(),
            started_at,
            finished_at: started_at,
            advisories,
            setup: ExecutionRecord::new(),
            iterations: Vec::new(),
            completion: ExecutionRecord::new(),
            outcome: RunOutcome::Success { iterations: 0 },
        },
    };

    let outcome = if fatal.is_empty() {
        let _session = options
            .session
            .as_ref()
            .filter(|_| workflow.uses_browser())
            .map(BrowserSession::acquire);
        run.execute()
    } else {
        warn!(fatal = fatal.len(), "refusing structurally invalid workflow");
        RunOutcome::StructuralError { diagnostics: fatal }
    };

    info!(run_id = %run.report.run_id, outcome = outcome.label(), "run finished");
    let mut report = run.report;
    report.outcome = outcome;
    report.finished_at = Utc::now();
    report
}

struct Run<'a, C, U, P> {
    workflow: &'a Workflow,
    executors: &'a Executors<C, U, P>,
    options: &'a RunOptions,
    cancel: &'a CancelFlag,
    report: RunReport,
}

impl<C, U, P> Run<'_, C, U, P>
where
    C: CommandExecutor,
    U: UiBridgeDriver,
    P: PromptExecutor,
{
    fn execute(&mut self) -> RunOutcome {
        info!("setup phase");
        if let Err(outcome) = self.run_setup() {
            return outcome;
        }

        let iterations = match self.run_loop() {
            Ok(iterations) => iterations,
            Err(outcome) => return outcome,
        };

        info!("completion phase");
        match self.run_completion() {
            Ok(()) => RunOutcome::Success { iterations },
            Err(outcome) => outcome,
        }
    }

    fn check_cancel(&self, phase: Phase, step: &Step) -> Result<(), RunOutcome> {
        if self.cancel.is_cancelled() {
            warn!(phase = %phase, next_step = %step.id, "run cancelled");
            return Err(RunOutcome::Cancelled {
                phase,
                next_step: step.id.clone(),
            });
        }
        Ok(())
    }

    fn run_setup(&mut self) -> Result<(), RunOutcome> {
        for step in &self.workflow.setup_steps {
            self.check_cancel(Phase::Setup, step)?;
            let result = self.execute_step(step, None);
            let failed = !result.succeeded();
            self.report.setup.insert(result);
            if failed && step.fails_on_error() {
                warn!(step_id = %step.id, "setup step failed, aborting");
                return Err(RunOutcome::SetupFailure {
                    step_id: step.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Verification/agentic loop. Returns the number of verification passes
    /// on success.
    fn run_loop(&mut self) -> Result<u32, RunOutcome> {
        if self.workflow.verification_steps.is_empty() {
            debug!("no verification required");
            return Ok(0);
        }
        let budget = self.workflow.iteration_budget().max(1);
        for iteration in 1..=budget {
            info!(iteration, budget, "verification phase");
            let verification = self.run_verification()?;
            let outcome = match self.workflow.gate() {
                Some(gate_step) => gate::evaluate(gate_step, &verification),
                None => GateOutcome::Pass,
            };
            self.report.iterations.push(IterationRecord {
                iteration,
                verification,
                gate: outcome.clone(),
                agentic: ExecutionRecord::new(),
            });

            match after_gate(&outcome, iteration, budget) {
                Transition::Completion => {
                    info!(iteration, "gate passed");
                    return Ok(iteration);
                }
                Transition::Exhausted { unmet } => {
                    warn!(iteration, unmet = unmet.len(), "iterations exhausted");
                    return Err(RunOutcome::IterationsExhausted {
                        iterations: iteration,
                        unmet,
                    });
                }
                Transition::Agentic { unmet } => {
                    info!(iteration, unmet = unmet.len(), "gate failed, agentic phase");
                    let context = self.agentic_context(iteration, budget, &unmet);
                    let agentic = self.run_agentic(&context)?;
                    if let Some(record) = self.report.iterations.last_mut() {
                        record.agentic = agentic;
                    }
                }
            }
        }
        // `after_gate` ends the loop on the last iteration.
        Ok(budget)
    }

    fn run_verification(&mut self) -> Result<ExecutionRecord, RunOutcome> {
        let mut record = ExecutionRecord::new();
        for step in self.workflow.verification_steps.iter().filter(|s| !s.is_gate()) {
            self.check_cancel(Phase::Verification, step)?;
            let result = self.execute_step(step, None);
            let failed = !result.succeeded();
            record.insert(result);
            if failed && step.fail_on_error == Some(true) {
                warn!(step_id = %step.id, "verification step failed with fail_on_error, ending pass");
                break;
            }
        }
        Ok(record)
    }

    fn run_agentic(&mut self, context: &AgenticContext) -> Result<ExecutionRecord, RunOutcome> {
        let mut record = ExecutionRecord::new();
        for step in &self.workflow.agentic_steps {
            self.check_cancel(Phase::Agentic, step)?;
            record.insert(self.execute_step(step, Some(context)));
        }
        Ok(record)
    }

    fn run_completion(&mut self) -> Result<(), RunOutcome> {
        for step in &self.workflow.completion_steps {
            self.check_cancel(Phase::Completion, step)?;
            let result = self.execute_step(step, None);
            let failed = !result.succeeded();
            self.report.completion.insert(result);
            if failed {
                if step.fails_on_error() {
                    warn!(step_id = %step.id, "completion step failed");
                    return Err(RunOutcome::CompletionFailure {
                        step_id: step.id.clone(),
                    });
                }
                debug!(step_id = %step.id, "ignoring failed completion step");
            }
        }
        Ok(())
    }

    fn agentic_context(&self, iteration: u32, budget: u32, unmet: &[UnmetStep]) -> AgenticContext {
        let last = self.report.iterations.last().map(|record| &record.verification);
        let failures = unmet
            .iter()
            .map(|step| {
                let name = self
                    .workflow
                    .find_step(&step.id)
                    .map(|found| found.name.clone())
                    .unwrap_or_default();
                let output = last
                    .and_then(|record| record.get(&step.id))
                    .map(|result| {
                        let text = result.error.as_deref().unwrap_or(&result.output);
                        tail(text.trim(), self.options.context_output_bytes).to_string()
                    })
                    .unwrap_or_default();
                FailureContext {
                    id: step.id.clone(),
                    name,
                    reason: match step.reason {
                        UnmetReason::Failed => "failed".to_string(),
                        UnmetReason::Missing => "missing".to_string(),
                    },
                    output,
                }
            })
            .collect();
        AgenticContext {
            iteration,
            max_iterations: budget,
            failures,
        }
    }

    /// Run one step with its own retry policy.
    fn execute_step(&self, step: &Step, agentic: Option<&AgenticContext>) -> StepResult {
        let max_attempts = step.max_attempts();
        let started = Instant::now();
        let mut attempts = 0;
        let mut last = Attempt::default();

        while attempts < max_attempts {
            attempts += 1;
            last = self.attempt(step, agentic);
            if last.success {
                break;
            }
            if attempts < max_attempts {
                warn!(step_id = %step.id, attempt = attempts, max_attempts, "step failed, retrying");
                thread::sleep(step.retry_delay());
            }
        }

        debug!(step_id = %step.id, success = last.success, attempts, "step finished");
        StepResult {
            step_id: step.id.clone(),
            status: if last.success {
                StepStatus::Success
            } else {
                StepStatus::Failure
            },
            attempts,
            exit_code: last.exit_code,
            timed_out: last.timed_out,
            output: last.output,
            error: last.error,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn attempt(&self, step: &Step, agentic: Option<&AgenticContext>) -> Attempt {
        let result = match &step.step_type {
            StepType::Command => self.attempt_command(step),
            StepType::UiBridge => self.attempt_ui_bridge(step),
            StepType::Prompt => self.attempt_prompt(step, agentic),
            StepType::Other(raw) => Err(anyhow::anyhow!("unsupported step type `{raw}`")),
        };
        result.unwrap_or_else(|err| {
            warn!(step_id = %step.id, err = %format!("{err:#}"), "step could not be executed");
            Attempt {
                error: Some(format!("{err:#}")),
                ..Attempt::default()
            }
        })
    }

    fn attempt_command(&self, step: &Step) -> anyhow::Result<Attempt> {
        let body = match (&step.command, &step.code) {
            (Some(command), _) => CommandBody::Shell(command.clone()),
            (None, Some(code)) => CommandBody::Code {
                code: code.clone(),
                test_type: step.test_type.clone(),
            },
            (None, None) => anyhow::bail!("command step has neither command nor code"),
        };
        let request = CommandRequest {
            step_id: step.id.clone(),
            body,
            working_directory: step.working_directory.as_ref().map(PathBuf::from),
            timeout: step
                .timeout_seconds
                .filter(|secs| *secs > 0)
                .map_or(self.options.command_timeout, Duration::from_secs),
        };
        let outcome = self.executors.commands.run(&request)?;
        Ok(Attempt {
            success: outcome.succeeded(),
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            output: outcome.output,
            error: None,
        })
    }

    fn attempt_ui_bridge(&self, step: &Step) -> anyhow::Result<Attempt> {
        let action = step
            .action
            .clone()
            .ok_or_else(|| anyhow::anyhow!("ui_bridge step has no action"))?;
        let timeout = step
            .timeout_ms
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| *ms > 0)
            .map_or(self.options.ui_timeout, Duration::from_millis);
        let request = UiBridgeRequest {
            step_id: step.id.clone(),
            action,
            url: step.url.clone(),
            instruction: step.instruction.clone(),
            target: step.target.clone(),
            assert_type: step.assert_type.clone(),
            expected: step.expected.clone(),
            timeout,
        };
        let outcome = self.executors.ui_bridge.perform(&request)?;
        Ok(Attempt {
            success: outcome.success,
            output: outcome.detail,
            ..Attempt::default()
        })
    }

    fn attempt_prompt(&self, step: &Step, agentic: Option<&AgenticContext>) -> anyhow::Result<Attempt> {
        let content = step.content.as_deref().unwrap_or(&step.name);
        let prompt = match agentic {
            Some(context) => render_agentic_prompt(content, context)?,
            None => content.to_string(),
        };
        let outcome = self.executors.agent.run(&PromptRequest {
            step_id: step.id.clone(),
            prompt,
            timeout: self.options.agent_timeout,
        })?;
        Ok(Attempt {
            success: outcome.success,
            output: outcome.output,
            ..Attempt::default()
        })
    }
}

#[derive(Debug, Default)]
struct Attempt {
    success: bool,
    exit_code: Option<i32>,
    timed_out: bool,
    output: String,
    error: Option<String>,
}
