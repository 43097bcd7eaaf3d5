//! Workflow hardening.
//!
//! Rewrites a draft workflow so that every checkable claim in verification
//! becomes a deterministic oracle, structural defects are repaired, and the
//! gate requires exactly the gate-eligible verification steps. The hardener
//! is a pure function of `(workflow, diagnostics, options)`: equal inputs
//! give equal outputs, and hardening a hardened workflow changes nothing.
//!
//! Passes, in order:
//! 1. [`normalize`]: legacy types, phases, ids, payload repairs, relocation.
//! 2. Conversion of verification prompts through the [`rules::RuleSet`].
//! 3. [`strengthen`]: content filters on stateful curl checks.
//! 4. Coverage augmentation for uncovered agentic goals.
//! 5. [`navigation`]: re-navigation before UI assertions.
//! 6. Last-resort oracle.
//! 7. Gate repair.

pub mod navigation;
pub mod normalize;
pub mod rules;
pub mod strengthen;

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::coverage;
use crate::core::ids::IdAllocator;
use crate::core::shell::STATEFUL_ENDPOINT_MARKERS;
use crate::core::types::{Diagnostic, DiagnosticKind};
use crate::workflow::{CheckType, Phase, Step, StepType, Workflow};
use rules::{RewriteContext, RuleSet};

/// Project language used to pick lint/typecheck invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Python,
    Rust,
}

static RUST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:rust|cargo|clippy|rustc)\b").expect("rust regex"));
static PYTHON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:python3?|mypy|ruff|pyright|flake8|pylint|pytest|poetry|uv)\b")
        .expect("python regex")
});
static TYPESCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:typescript|javascript|tsc|eslint|npm|npx|pnpm|yarn|node|next\.?js|react)\b")
        .expect("typescript regex")
});

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Rust => "rust",
        }
    }

    pub fn mentioned_in(text: &str) -> Option<Language> {
        if RUST_RE.is_match(text) {
            Some(Language::Rust)
        } else if PYTHON_RE.is_match(text) {
            Some(Language::Python)
        } else if TYPESCRIPT_RE.is_match(text) {
            Some(Language::TypeScript)
        } else {
            None
        }
    }
}

/// Standard invocations for one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTools {
    pub lint: String,
    pub typecheck: String,
}

/// Check appended when verification would otherwise have no oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackCheck {
    pub name: String,
    pub command: String,
    pub tool: String,
}

/// Tunable hardener inputs; the `[hardener]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardenerSettings {
    /// UI-bridge SDK root used by generated curl checks.
    pub sdk_base_url: String,
    pub stateful_endpoint_markers: Vec<String>,
    pub default_language: Language,
    pub typescript: LanguageTools,
    pub python: LanguageTools,
    pub rust: LanguageTools,
    pub fallback_check: FallbackCheck,
    /// Retries given to generated ui_bridge assertions.
    pub assert_retry_count: u32,
    pub assert_retry_delay_ms: u64,
}

impl Default for HardenerSettings {
    fn default() -> Self {
        Self {
            sdk_base_url: "http://localhost:9876/ui-bridge/sdk".to_string(),
            stateful_endpoint_markers: STATEFUL_ENDPOINT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
            default_language: Language::TypeScript,
            typescript: LanguageTools {
                lint: "npx eslint .".to_string(),
                typecheck: "npx tsc --noEmit".to_string(),
            },
            python: LanguageTools {
                lint: "ruff check .".to_string(),
                typecheck: "mypy .".to_string(),
            },
            rust: LanguageTools {
                lint: "cargo clippy -- -D warnings".to_string(),
                typecheck: "cargo check".to_string(),
            },
            fallback_check: FallbackCheck {
                name: "Working tree has no whitespace errors or conflict markers".to_string(),
                command: "git diff --check".to_string(),
                tool: "git".to_string(),
            },
            assert_retry_count: 5,
            assert_retry_delay_ms: 3000,
        }
    }
}

impl HardenerSettings {
    pub fn tools_for(&self, language: Language) -> &LanguageTools {
        match language {
            Language::TypeScript => &self.typescript,
            Language::Python => &self.python,
            Language::Rust => &self.rust,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HardenOptions {
    pub settings: HardenerSettings,
    pub rules: RuleSet,
}

impl HardenOptions {
    pub fn new(settings: HardenerSettings) -> Self {
        Self {
            settings,
            rules: RuleSet::standard(),
        }
    }
}

/// One change the hardener made. Every removed step shows up as `Dropped`
/// or as the `source` of a `Converted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HardenAction {
    NormalizedType {
        step_id: String,
        from: String,
        to: String,
    },
    RenamedDuplicateId {
        from: String,
        to: String,
    },
    FixedPhase {
        step_id: String,
        phase: Phase,
    },
    RepairedField {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        field: String,
        detail: String,
    },
    Dropped {
        step_id: String,
        reason: String,
    },
    MovedToVerification {
        step_id: String,
    },
    WrappedAsPrompt {
        step_id: String,
    },
    Converted {
        source: String,
        rule: String,
        replacements: Vec<String>,
        /// Whether part of the prompt stayed behind as a subjective residual.
        residual: bool,
    },
    Strengthened {
        step_id: String,
        expected: String,
    },
    AddedCoverage {
        source: String,
        goal: String,
        step_ids: Vec<String>,
    },
    InjectedNavigation {
        source: String,
        step_id: String,
    },
    AddedFallbackCheck {
        step_id: String,
    },
    RepairedGate {
        gate_id: String,
        required: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardenReport {
    pub actions: Vec<HardenAction>,
}

impl HardenReport {
    pub fn push(&mut self, action: HardenAction) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Harden with default options.
pub fn harden(workflow: &Workflow, diagnostics: &[Diagnostic]) -> Workflow {
    harden_with_report(workflow, diagnostics, &HardenOptions::default()).0
}

pub fn harden_with_report(
    workflow: &Workflow,
    diagnostics: &[Diagnostic],
    options: &HardenOptions,
) -> (Workflow, HardenReport) {
    let mut hardened = workflow.clone();
    let mut report = HardenReport::default();

    normalize::normalize(&mut hardened, &mut report);

    let mut ids = IdAllocator::from_workflow(&hardened);
    let hints = ProjectHints::from_workflow(&hardened, &options.settings);

    convert_prompts(&mut hardened, options, &mut ids, &hints, &mut report);
    strengthen::strengthen(&mut hardened, &options.settings, &mut report);
    augment_coverage(&mut hardened, diagnostics, options, &mut ids, &hints, &mut report);
    navigation::inject(&mut hardened, &options.settings, &mut ids, &mut report);
    ensure_oracle(&mut hardened, &options.settings, &mut ids, &mut report);
    repair_gate(&mut hardened, &mut ids, &mut report);

    (hardened, report)
}

/// Workflow-wide context for generated steps.
struct ProjectHints {
    language: Language,
    working_directory: Option<String>,
}

impl ProjectHints {
    fn from_workflow(workflow: &Workflow, settings: &HardenerSettings) -> Self {
        let commands = || {
            workflow
                .all_steps()
                .map(|(_, step)| step)
                .filter(|step| step.step_type == StepType::Command)
        };
        let language = commands()
            .find_map(|step| {
                let text = format!(
                    "{} {}",
                    step.command.as_deref().unwrap_or_default(),
                    step.tool.as_deref().unwrap_or_default()
                );
                Language::mentioned_in(&text)
            })
            .unwrap_or(settings.default_language);
        let working_directory = commands().find_map(|step| step.working_directory.clone());
        Self {
            language,
            working_directory,
        }
    }
}

/// Pass 2: replace convertible verification prompts.
fn convert_prompts(
    workflow: &mut Workflow,
    options: &HardenOptions,
    ids: &mut IdAllocator,
    hints: &ProjectHints,
    report: &mut HardenReport,
) {
    let steps = std::mem::take(workflow.steps_mut(Phase::Verification));
    let mut rebuilt = Vec::with_capacity(steps.len());

    for step in steps {
        if !step.is_prompt() {
            rebuilt.push(step);
            continue;
        }
        let text = step.content.clone().unwrap_or_else(|| step.name.clone());
        let mut replacements = Vec::new();
        let mut leftover = Vec::new();
        let mut rule_names = Vec::new();

        for clause in coverage::clauses(&text) {
            match options.rules.detect(&clause) {
                Some((rule, assertion)) => {
                    let mut ctx = RewriteContext {
                        settings: &options.settings,
                        ids: &mut *ids,
                        source_id: &step.id,
                        clause: &clause,
                        working_directory: hints.working_directory.as_deref(),
                        language: hints.language,
                    };
                    replacements.extend((rule.rewrite)(&assertion, &mut ctx));
                    if !rule_names.contains(&rule.name) {
                        rule_names.push(rule.name);
                    }
                }
                None => leftover.push(clause),
            }
        }

        if replacements.is_empty() {
            rebuilt.push(step);
            continue;
        }

        report.push(HardenAction::Converted {
            source: step.id.clone(),
            rule: rule_names.join(","),
            replacements: replacements.iter().map(|s| s.id.clone()).collect(),
            residual: !leftover.is_empty(),
        });
        rebuilt.extend(replacements);
        if !leftover.is_empty() {
            let mut residual = step;
            residual.content = Some(format!("{}.", leftover.join(". ")));
            rebuilt.push(residual);
        }
    }

    *workflow.steps_mut(Phase::Verification) = rebuilt;
}

/// Pass 4: add checks for agentic goals that verification never mentions.
///
/// Candidates are the supplied advisories followed by the goals still
/// uncovered in the current workflow, so goals whose covering step was
/// dropped earlier are picked up in the same run. Each candidate is
/// re-checked before anything is added.
fn augment_coverage(
    workflow: &mut Workflow,
    diagnostics: &[Diagnostic],
    options: &HardenOptions,
    ids: &mut IdAllocator,
    hints: &ProjectHints,
    report: &mut HardenReport,
) {
    let mut candidates: Vec<(String, String)> = diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::UncoveredAgenticGoal)
        .filter_map(|d| Some((d.step_id.clone()?, d.goal.clone()?)))
        .collect();
    for pair in coverage::uncovered_goals(workflow) {
        if !candidates.contains(&pair) {
            candidates.push(pair);
        }
    }

    for (source, goal) in candidates {
        let source_is_agentic_prompt = workflow
            .steps(Phase::Agentic)
            .iter()
            .any(|step| step.id == source && step.is_prompt());
        if !source_is_agentic_prompt || coverage::is_covered(&goal, workflow) {
            continue;
        }
        let Some((rule, assertion)) = options.rules.detect(&goal) else {
            continue;
        };
        let mut ctx = RewriteContext {
            settings: &options.settings,
            ids: &mut *ids,
            source_id: &source,
            clause: &goal,
            working_directory: hints.working_directory.as_deref(),
            language: hints.language,
        };
        let added = (rule.rewrite)(&assertion, &mut ctx);
        if added.is_empty() {
            continue;
        }
        report.push(HardenAction::AddedCoverage {
            source,
            goal,
            step_ids: added.iter().map(|step| step.id.clone()).collect(),
        });
        workflow.steps_mut(Phase::Verification).extend(added);
    }
}

/// Pass 6: guarantee at least one oracle when verification is required.
fn ensure_oracle(
    workflow: &mut Workflow,
    settings: &HardenerSettings,
    ids: &mut IdAllocator,
    report: &mut HardenReport,
) {
    let required = !workflow.verification_steps.is_empty() || !workflow.agentic_steps.is_empty();
    if !required || workflow.verification_steps.iter().any(Step::is_oracle) {
        return;
    }
    let fallback = &settings.fallback_check;
    let id = ids.mint("fallback_check", &workflow.name, &fallback.command);
    let mut step =
        Step::new(id.clone(), StepType::Command, fallback.name.clone()).in_phase(Phase::Verification);
    step.command = Some(fallback.command.clone());
    step.check_type = Some(CheckType::CustomCommand);
    step.tool = Some(fallback.tool.clone());
    workflow.verification_steps.push(step);
    report.push(HardenAction::AddedFallbackCheck { step_id: id });
}

/// Pass 7: exactly one terminal gate requiring every gate-eligible step.
fn repair_gate(workflow: &mut Workflow, ids: &mut IdAllocator, report: &mut HardenReport) {
    if workflow.verification_steps.is_empty() {
        return;
    }
    let before = workflow.verification_steps.clone();
    let (mut gates, mut steps): (Vec<Step>, Vec<Step>) =
        std::mem::take(&mut workflow.verification_steps)
            .into_iter()
            .partition(Step::is_gate);

    // The last gate is the one the validator and scheduler treat as terminal.
    let mut gate = gates.pop().unwrap_or_else(|| {
        let id = ids.claim("step-gate");
        Step::new(id, StepType::Command, "All verification checks pass")
    });
    for extra in gates {
        report.push(HardenAction::Dropped {
            step_id: extra.id,
            reason: format!("earlier gate superseded by `{}`", gate.id),
        });
    }

    let required: Vec<String> = steps
        .iter()
        .filter(|step| step.is_gate_eligible())
        .map(|step| step.id.clone())
        .collect();
    gate.step_type = StepType::Command;
    gate.phase = Some(Phase::Verification);
    gate.command = None;
    gate.code = None;
    gate.check_type = None;
    gate.test_type = None;
    gate.required_steps = Some(required.clone());
    let gate_id = gate.id.clone();
    steps.push(gate);
    workflow.verification_steps = steps;

    if workflow.verification_steps != before {
        report.push(HardenAction::RepairedGate { gate_id, required });
    }
}
