//! Workflow wire model.
//!
//! Mirrors the persisted JSON shape exactly: four phase-keyed step lists,
//! `max_iterations`, and metadata. Every struct keeps the fields it does not
//! interpret in a flattened `extra` map, and remembers the key layout it was
//! read with, so that load → store is lossless down to explicit `null`s and
//! empty values. Enumerated string fields keep unrecognised values verbatim
//! (`Other`) so the validator can name them instead of failing
//! deserialization.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// `max_iterations` used when the persisted workflow omits it.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            /// Value outside the known set, preserved as written.
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Other(raw) => raw,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.as_str() {
                    $($text => Self::$variant,)+
                    _ => Self::Other(raw),
                }
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $text.to_string(),)+
                    $name::Other(raw) => raw,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Step kind. Only three kinds are legal; legacy kinds land in `Other`.
    StepType {
        Command => "command",
        UiBridge => "ui_bridge",
        Prompt => "prompt",
    }
}

wire_enum! {
    /// Deterministic code-quality check mode of a command step.
    CheckType {
        Lint => "lint",
        Typecheck => "typecheck",
        Format => "format",
        Analyze => "analyze",
        Security => "security",
        CustomCommand => "custom_command",
    }
}

wire_enum! {
    /// Test-execution mode of a command step.
    TestType {
        Playwright => "playwright",
        QontinuiVision => "qontinui_vision",
        Python => "python",
        Repository => "repository",
        CustomCommand => "custom_command",
    }
}

wire_enum! {
    UiAction {
        Navigate => "navigate",
        Execute => "execute",
        Assert => "assert",
        Snapshot => "snapshot",
    }
}

wire_enum! {
    AssertType {
        Visible => "visible",
        Hidden => "hidden",
        Enabled => "enabled",
        Disabled => "disabled",
        Checked => "checked",
        Unchecked => "unchecked",
        Focused => "focused",
        ContainsText => "containsText",
        HasText => "hasText",
    }
}

/// Key layout of the JSON object a model struct was read from.
///
/// Unset fields are skipped on output, so the layout puts back keys that were
/// written as `null`, `""` or `[]`, drops defaulted keys the input never had,
/// and keeps the input key order. Values built in code carry no layout and
/// serialize as derived. Layout never takes part in equality.
#[derive(Debug, Clone, Default)]
struct WireShape {
    /// Input keys in order, with the value kept when serialization would skip it.
    keys: Option<Vec<(String, Option<Value>)>>,
}

impl PartialEq for WireShape {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

fn skipped_when_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn is_default(value: &Value) -> bool {
    skipped_when_unset(value) || value.as_u64() == Some(0)
}

impl WireShape {
    fn capture(value: &Value) -> Self {
        let keys = value.as_object().map(|object| {
            object
                .iter()
                .map(|(key, field)| (key.clone(), skipped_when_unset(field).then(|| field.clone())))
                .collect()
        });
        Self { keys }
    }

    fn restore(&self, value: Value, defaulted: &[&str]) -> Value {
        let Some(keys) = &self.keys else {
            return value;
        };
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return other,
        };
        let mut restored = Map::new();
        for (key, unset) in keys {
            if let Some(field) = fields.shift_remove(key) {
                restored.insert(key.clone(), field);
            } else if let Some(unset) = unset {
                restored.insert(key.clone(), unset.clone());
            }
        }
        for (key, field) in fields {
            if defaulted.contains(&key.as_str()) && is_default(&field) {
                continue;
            }
            restored.insert(key, field);
        }
        Value::Object(restored)
    }
}

/// Serde impls that route the derived (`remote = "Self"`) ones through the
/// struct's [`WireShape`]. `defaulted` names keys filled in by `#[serde(default)]`.
macro_rules! shaped_serde {
    ($name:ident, defaulted = [$($key:literal),* $(,)?]) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let value = $name::serialize(self, serde_json::value::Serializer)
                    .map_err(<S::Error as serde::ser::Error>::custom)?;
                self.shape.restore(value, &[$($key),*]).serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Value::deserialize(deserializer)?;
                let shape = WireShape::capture(&value);
                let mut parsed =
                    $name::deserialize(value).map_err(<D::Error as serde::de::Error>::custom)?;
                parsed.shape = shape;
                Ok(parsed)
            }
        }
    };
}

impl TestType {
    /// Test modes whose body is a shell `command`; the rest execute `code`.
    pub fn runs_command(&self) -> bool {
        matches!(self, Self::Repository | Self::CustomCommand)
    }
}

impl AssertType {
    /// Text assertions compare against `expected`.
    pub fn is_text_based(&self) -> bool {
        matches!(self, Self::ContainsText | Self::HasText)
    }
}

/// Execution phase. Phases run in declaration order with a
/// verification ↔ agentic loop in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Verification,
    Agentic,
    Completion,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Setup,
        Phase::Verification,
        Phase::Agentic,
        Phase::Completion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Verification => "verification",
            Phase::Agentic => "agentic",
            Phase::Completion => "completion",
        }
    }

    /// Name of the workflow list holding this phase's steps.
    pub fn list_name(self) -> &'static str {
        match self {
            Phase::Setup => "setup_steps",
            Phase::Verification => "verification_steps",
            Phase::Agentic => "agentic_steps",
            Phase::Completion => "completion_steps",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-delay retry policy of a command step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct RetryPolicy {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    shape: WireShape,
}

shaped_serde!(RetryPolicy, defaulted = ["count", "delay_ms"]);

impl RetryPolicy {
    pub fn new(count: u32, delay_ms: u64) -> Self {
        Self {
            count,
            delay_ms,
            extra: Map::new(),
            shape: WireShape::default(),
        }
    }
}

/// A single workflow step.
///
/// Kind payloads are flat optional fields, matching the stored format. Which
/// fields are required depends on `step_type` (and `action` for ui_bridge);
/// the validator enforces that, not deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,

    #[serde(default, alias = "ui_bridge_action", skip_serializing_if = "Option::is_none")]
    pub action: Option<UiAction>,
    #[serde(default, alias = "ui_bridge_url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "ui_bridge_instruction", skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, alias = "ui_bridge_target", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, alias = "ui_bridge_assert_type", skip_serializing_if = "Option::is_none")]
    pub assert_type: Option<AssertType>,
    #[serde(default, alias = "ui_bridge_expected", skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_steps: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    shape: WireShape,
}

shaped_serde!(Step, defaulted = []);

impl Step {
    /// Bare step of the given kind with every payload field unset.
    pub fn new(id: impl Into<String>, step_type: StepType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step_type,
            name: name.into(),
            phase: None,
            command: None,
            code: None,
            working_directory: None,
            timeout_seconds: None,
            fail_on_error: None,
            retry: None,
            check_type: None,
            tool: None,
            test_type: None,
            action: None,
            url: None,
            instruction: None,
            target: None,
            assert_type: None,
            expected: None,
            timeout_ms: None,
            retry_count: None,
            retry_delay_ms: None,
            content: None,
            required_steps: None,
            extra: Map::new(),
            shape: WireShape::default(),
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// A gate is identified by its `required_steps` list.
    pub fn is_gate(&self) -> bool {
        self.required_steps.is_some()
    }

    pub fn is_prompt(&self) -> bool {
        self.step_type == StepType::Prompt
    }

    /// True for steps whose pass/fail is reproducible from system state:
    /// command steps in check or test mode and ui_bridge assertions.
    pub fn is_oracle(&self) -> bool {
        if self.is_gate() {
            return false;
        }
        match self.step_type {
            StepType::Command => self.check_type.is_some() || self.test_type.is_some(),
            StepType::UiBridge => self.action == Some(UiAction::Assert),
            StepType::Prompt | StepType::Other(_) => false,
        }
    }

    /// Verification steps that a gate must require: everything but prompts
    /// and the gate itself.
    pub fn is_gate_eligible(&self) -> bool {
        !self.is_gate() && !self.is_prompt()
    }

    /// `fail_on_error` with its default applied.
    pub fn fails_on_error(&self) -> bool {
        self.fail_on_error.unwrap_or(true)
    }

    /// Total attempts allowed by the step's own retry fields.
    pub fn max_attempts(&self) -> u32 {
        let retries = match self.step_type {
            StepType::Command => self.retry.as_ref().map_or(0, |retry| retry.count),
            StepType::UiBridge => self.retry_count.unwrap_or(0),
            StepType::Prompt | StepType::Other(_) => 0,
        };
        retries.saturating_add(1)
    }

    /// Constant delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        let millis = match self.step_type {
            StepType::Command => self.retry.as_ref().map_or(0, |retry| retry.delay_ms),
            StepType::UiBridge => self.retry_delay_ms.unwrap_or(0),
            StepType::Prompt | StepType::Other(_) => 0,
        };
        Duration::from_millis(millis)
    }

    /// Free text describing what the step touches, used for goal coverage.
    pub fn searchable_text(&self) -> String {
        [
            Some(self.name.as_str()),
            self.command.as_deref(),
            self.url.as_deref(),
            self.instruction.as_deref(),
            self.target.as_deref(),
            self.expected.as_deref(),
            self.tool.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(remote = "Self")]
pub struct Workflow {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub setup_steps: Vec<Step>,
    #[serde(default)]
    pub verification_steps: Vec<Step>,
    #[serde(default)]
    pub agentic_steps: Vec<Step>,
    #[serde(default)]
    pub completion_steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    shape: WireShape,
}

shaped_serde!(
    Workflow,
    defaulted = ["setup_steps", "verification_steps", "agentic_steps", "completion_steps"]
);

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: None,
            tags: Vec::new(),
            setup_steps: Vec::new(),
            verification_steps: Vec::new(),
            agentic_steps: Vec::new(),
            completion_steps: Vec::new(),
            max_iterations: None,
            extra: Map::new(),
            shape: WireShape::default(),
        }
    }

    /// Iteration budget with the default applied.
    pub fn iteration_budget(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS)
    }

    pub fn steps(&self, phase: Phase) -> &[Step] {
        match phase {
            Phase::Setup => &self.setup_steps,
            Phase::Verification => &self.verification_steps,
            Phase::Agentic => &self.agentic_steps,
            Phase::Completion => &self.completion_steps,
        }
    }

    pub fn steps_mut(&mut self, phase: Phase) -> &mut Vec<Step> {
        match phase {
            Phase::Setup => &mut self.setup_steps,
            Phase::Verification => &mut self.verification_steps,
            Phase::Agentic => &mut self.agentic_steps,
            Phase::Completion => &mut self.completion_steps,
        }
    }

    /// Every step paired with the list it sits in, in phase order.
    pub fn all_steps(&self) -> impl Iterator<Item = (Phase, &Step)> {
        Phase::ALL
            .into_iter()
            .flat_map(move |phase| self.steps(phase).iter().map(move |step| (phase, step)))
    }

    pub fn find_step(&self, id: &str) -> Option<&Step> {
        self.all_steps()
            .map(|(_, step)| step)
            .find(|step| step.id == id)
    }

    /// The terminal verification gate, if the last verification step is one.
    pub fn gate(&self) -> Option<&Step> {
        self.verification_steps.last().filter(|step| step.is_gate())
    }

    /// Whether any step drives the shared browser session, either as a
    /// ui_bridge step or as a command hitting the UI-bridge endpoints.
    pub fn uses_browser(&self) -> bool {
        self.all_steps().any(|(_, step)| match step.step_type {
            StepType::UiBridge => true,
            StepType::Command => step
                .command
                .as_deref()
                .is_some_and(|command| command.contains("/ui-bridge/")),
            StepType::Prompt | StepType::Other(_) => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_step_type_is_preserved() {
        let step: Step = serde_json::from_value(json!({
            "id": "step-gate",
            "type": "gate",
            "name": "All checks pass",
            "required_steps": ["a"]
        }))
        .expect("parse step");
        assert_eq!(step.step_type, StepType::Other("gate".to_string()));
        assert!(step.is_gate());
        let back = serde_json::to_value(&step).expect("serialize");
        assert_eq!(back["type"], "gate");
    }

    #[test]
    fn legacy_ui_bridge_field_names_are_accepted() {
        let step: Step = serde_json::from_value(json!({
            "id": "step-verify",
            "type": "ui_bridge",
            "name": "Verify heading",
            "phase": "verification",
            "ui_bridge_action": "assert",
            "ui_bridge_target": "Settings",
            "ui_bridge_assert_type": "visible",
            "retry_count": 5,
            "retry_delay_ms": 3000
        }))
        .expect("parse step");
        assert_eq!(step.action, Some(UiAction::Assert));
        assert_eq!(step.target.as_deref(), Some("Settings"));
        assert_eq!(step.assert_type, Some(AssertType::Visible));
        assert_eq!(step.max_attempts(), 6);
        assert_eq!(step.retry_delay(), Duration::from_millis(3000));
        assert!(step.is_oracle());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = json!({
            "name": "wf",
            "setup_steps": [],
            "verification_steps": [{
                "id": "check-ruff",
                "type": "command",
                "name": "ruff",
                "check_type": "lint",
                "tool": "ruff",
                "command": "ruff check .",
                "severity": "high"
            }],
            "agentic_steps": [],
            "completion_steps": [],
            "max_iterations": 3,
            "owner": {"team": "qa"}
        });
        let workflow: Workflow = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(workflow.extra["owner"]["team"], "qa");
        assert_eq!(serde_json::to_value(&workflow).expect("serialize"), raw);
    }

    #[test]
    fn explicit_nulls_and_empty_values_round_trip() {
        let raw = json!({
            "name": "wf",
            "description": "",
            "category": null,
            "tags": [],
            "verification_steps": [{
                "id": "check-ruff",
                "type": "command",
                "name": "",
                "command": "ruff check .",
                "code": null,
                "phase": null,
                "retry": {"count": 1}
            }],
            "max_iterations": null
        });
        let workflow: Workflow = serde_json::from_value(raw.clone()).expect("parse");
        let back = serde_json::to_value(&workflow).expect("serialize");
        assert_eq!(back, raw);
        let keys: Vec<_> = back.as_object().expect("object").keys().cloned().collect();
        assert_eq!(
            keys,
            ["name", "description", "category", "tags", "verification_steps", "max_iterations"]
        );
    }

    #[test]
    fn edits_replace_remembered_empty_values() {
        let raw = json!({
            "name": "wf",
            "verification_steps": [{"id": "a", "type": "command", "name": "", "phase": null}]
        });
        let mut workflow: Workflow = serde_json::from_value(raw).expect("parse");
        workflow.verification_steps[0].name = "ruff".to_string();
        workflow.verification_steps[0].phase = Some(Phase::Verification);
        workflow.setup_steps.push(Step::new("b", StepType::Command, "b"));

        let back = serde_json::to_value(&workflow).expect("serialize");
        assert_eq!(back["verification_steps"][0]["name"], "ruff");
        assert_eq!(back["verification_steps"][0]["phase"], "verification");
        assert_eq!(back["setup_steps"][0]["id"], "b");
        assert!(back.get("agentic_steps").is_none());
    }

    #[test]
    fn built_workflows_list_every_phase() {
        let back = serde_json::to_value(Workflow::new("wf")).expect("serialize");
        assert_eq!(
            back,
            json!({
                "name": "wf",
                "setup_steps": [],
                "verification_steps": [],
                "agentic_steps": [],
                "completion_steps": []
            })
        );
    }

    #[test]
    fn assert_type_uses_camel_case_wire_names() {
        let value: AssertType = serde_json::from_value(json!("containsText")).expect("parse");
        assert_eq!(value, AssertType::ContainsText);
        assert!(value.is_text_based());
    }

    #[test]
    fn command_retry_counts_extra_attempts() {
        let mut step = Step::new("c", StepType::Command, "c");
        assert_eq!(step.max_attempts(), 1);
        step.retry = Some(RetryPolicy::new(2, 10));
        assert_eq!(step.max_attempts(), 3);
    }

    #[test]
    fn gate_is_only_the_terminal_verification_step() {
        let mut workflow = Workflow::new("wf");
        let mut gate = Step::new("gate", StepType::Command, "gate");
        gate.required_steps = Some(vec![]);
        workflow.verification_steps.push(gate);
        workflow
            .verification_steps
            .push(Step::new("late", StepType::Command, "late"));
        assert!(workflow.gate().is_none());
    }
}
