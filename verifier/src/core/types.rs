//! Shared deterministic types for the verifier core.
//!
//! These are stable contracts between the validator, hardener, gate and
//! scheduler. They carry no I/O and serialize deterministically.

use serde::{Deserialize, Serialize};

/// Whether a diagnostic blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Advisory,
}

/// Every problem the validator knows how to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    InvalidStepType,
    DuplicateStepId,
    EmptyStepId,
    PhaseMismatch,
    ModeConflict,
    CommandPayloadConflict,
    MissingCommand,
    MissingTool,
    TestPayloadMismatch,
    NonSubstantiveCommand,
    UnknownCheckType,
    UnknownTestType,
    MissingUiAction,
    UnknownUiAction,
    MissingUiField,
    UnknownAssertType,
    InvalidTimeout,
    PromptMissingContent,
    NonPromptAgenticStep,
    GateOutsideVerification,
    MissingGate,
    MultipleGates,
    GateNotTerminal,
    GateIncomplete,
    NoDeterministicOracle,
    MissingVerification,
    InvalidMaxIterations,

    MissingPhase,
    UncoveredAgenticGoal,
    ConvertiblePrompt,
    SubjectivePrompt,
    WeakStatefulCheck,
    MissingNavigation,
    PlaywrightShellCommand,
}

impl DiagnosticKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::MissingPhase
            | Self::UncoveredAgenticGoal
            | Self::ConvertiblePrompt
            | Self::SubjectivePrompt
            | Self::WeakStatefulCheck
            | Self::MissingNavigation
            | Self::PlaywrightShellCommand => Severity::Advisory,
            _ => Severity::Fatal,
        }
    }
}

/// A single validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub message: String,
    /// Goal text for `UncoveredAgenticGoal`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, step_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            step_id: step_id.map(str::to_string),
            message: message.into(),
            goal: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

/// Split diagnostics into `(fatal, advisory)`, preserving order.
pub fn partition(diagnostics: Vec<Diagnostic>) -> (Vec<Diagnostic>, Vec<Diagnostic>) {
    diagnostics.into_iter().partition(Diagnostic::is_fatal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// Recorded outcome of one executed step, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    /// Bounded captured output of the last attempt.
    #[serde(default)]
    pub output: String,
    /// Executor error text when the step could not be run at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Step results keyed by step id, in execution order.
///
/// Re-recording an id replaces the earlier result in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionRecord {
    results: Vec<StepResult>,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: StepResult) {
        match self
            .results
            .iter_mut()
            .find(|existing| existing.step_id == result.step_id)
        {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().find(|result| result.step_id == step_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmetReason {
    /// The step ran and did not succeed.
    Failed,
    /// The step never ran in this pass.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmetStep {
    pub id: String,
    pub reason: UnmetReason,
}

/// Verdict of the verification gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum GateOutcome {
    Pass,
    Fail { unmet: Vec<UnmetStep> },
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, GateOutcome::Pass)
    }

    pub fn unmet(&self) -> &[UnmetStep] {
        match self {
            GateOutcome::Pass => &[],
            GateOutcome::Fail { unmet } => unmet,
        }
    }

    pub fn unmet_ids(&self) -> Vec<&str> {
        self.unmet().iter().map(|step| step.id.as_str()).collect()
    }
}
