//! Test-only builders for workflows and scripted execution seams.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use anyhow::{Result, anyhow};

use crate::core::shell::program_name;
use crate::io::agent::{PromptExecutor, PromptOutcome, PromptRequest};
use crate::io::command::{CommandBody, CommandExecutor, CommandOutcome, CommandRequest};
use crate::io::ui_bridge::{UiBridgeDriver, UiBridgeOutcome, UiBridgeRequest};
use crate::workflow::{AssertType, CheckType, Phase, Step, StepType, UiAction, Workflow};

/// Plain command step.
pub fn command_step(id: &str, command: &str) -> Step {
    let mut step = Step::new(id, StepType::Command, id);
    step.command = Some(command.to_string());
    step
}

/// Command step in check mode; the tool is the command's program.
pub fn check_step(id: &str, command: &str) -> Step {
    let mut step = command_step(id, command);
    step.check_type = Some(CheckType::CustomCommand);
    step.tool = program_name(command);
    step
}

/// ui_bridge assertion that `target` is visible.
pub fn assert_step(id: &str, target: &str) -> Step {
    let mut step = Step::new(id, StepType::UiBridge, id);
    step.action = Some(UiAction::Assert);
    step.target = Some(target.to_string());
    step.assert_type = Some(AssertType::Visible);
    step
}

pub fn prompt_step(id: &str, content: &str) -> Step {
    let mut step = Step::new(id, StepType::Prompt, id);
    step.content = Some(content.to_string());
    step
}

pub fn gate_step(id: &str, required: &[&str]) -> Step {
    let mut step = Step::new(id, StepType::Command, "All checks pass");
    step.required_steps = Some(required.iter().map(|id| id.to_string()).collect());
    step
}

/// Workflow whose steps carry the phase of the list they are placed in.
pub fn workflow(
    name: &str,
    setup: Vec<Step>,
    verification: Vec<Step>,
    agentic: Vec<Step>,
    completion: Vec<Step>,
) -> Workflow {
    let mut workflow = Workflow::new(name);
    for (phase, steps) in [
        (Phase::Setup, setup),
        (Phase::Verification, verification),
        (Phase::Agentic, agentic),
        (Phase::Completion, completion),
    ] {
        *workflow.steps_mut(phase) = steps.into_iter().map(|step| step.in_phase(phase)).collect();
    }
    workflow
}

/// Per-step queues of scripted answers. The last answer repeats.
#[derive(Debug)]
struct Script<T> {
    queues: RefCell<HashMap<String, VecDeque<T>>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queues: RefCell::new(HashMap::new()),
        }
    }

    fn push(&self, step_id: &str, answers: impl IntoIterator<Item = T>) {
        self.queues
            .borrow_mut()
            .entry(step_id.to_string())
            .or_default()
            .extend(answers);
    }

    fn next(&self, step_id: &str) -> Option<T> {
        let mut queues = self.queues.borrow_mut();
        let queue = queues.get_mut(step_id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Command executor answering from per-step exit-code scripts.
/// Unscripted steps exit 0.
#[derive(Debug)]
pub struct ScriptedCommandExecutor {
    script: Script<std::result::Result<i32, String>>,
    calls: RefCell<Vec<CommandRequest>>,
}

impl ScriptedCommandExecutor {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn script(&self, step_id: &str, exit_codes: &[i32]) {
        self.script.push(step_id, exit_codes.iter().copied().map(Ok));
    }

    /// Make `step_id` fail to run at all.
    pub fn fail_with(&self, step_id: &str, error: &str) {
        self.script.push(step_id, [Err(error.to_string())]);
    }

    /// Ids of every executed step, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|req| req.step_id.clone()).collect()
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.calls.borrow().clone()
    }
}

impl Default for ScriptedCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for ScriptedCommandExecutor {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutcome> {
        self.calls.borrow_mut().push(request.clone());
        let exit_code = match self.script.next(&request.step_id).unwrap_or(Ok(0)) {
            Ok(code) => code,
            Err(message) => return Err(anyhow!(message)),
        };
        let body = match &request.body {
            CommandBody::Shell(command) => command.clone(),
            CommandBody::Code { code, .. } => code.clone(),
        };
        Ok(CommandOutcome {
            exit_code: Some(exit_code),
            timed_out: false,
            output: format!("{body}: exit {exit_code}"),
        })
    }
}

/// UI bridge answering from per-step success scripts. Unscripted steps pass.
#[derive(Debug)]
pub struct ScriptedUiBridge {
    script: Script<bool>,
    calls: RefCell<Vec<UiBridgeRequest>>,
}

impl ScriptedUiBridge {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn script(&self, step_id: &str, results: &[bool]) {
        self.script.push(step_id, results.iter().copied());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|req| req.step_id.clone()).collect()
    }
}

impl Default for ScriptedUiBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl UiBridgeDriver for ScriptedUiBridge {
    fn perform(&self, request: &UiBridgeRequest) -> Result<UiBridgeOutcome> {
        self.calls.borrow_mut().push(request.clone());
        let success = self.script.next(&request.step_id).unwrap_or(true);
        Ok(UiBridgeOutcome {
            success,
            detail: format!("{} {}", request.action, if success { "ok" } else { "failed" }),
        })
    }
}

/// Agent that records every rendered prompt. Unscripted prompts succeed.
#[derive(Debug)]
pub struct ScriptedAgent {
    script: Script<bool>,
    prompts: RefCell<Vec<PromptRequest>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            script: Script::new(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn script(&self, step_id: &str, results: &[bool]) {
        self.script.push(step_id, results.iter().copied());
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().iter().map(|req| req.prompt.clone()).collect()
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptExecutor for ScriptedAgent {
    fn run(&self, request: &PromptRequest) -> Result<PromptOutcome> {
        self.prompts.borrow_mut().push(request.clone());
        let success = self.script.next(&request.step_id).unwrap_or(true);
        Ok(PromptOutcome {
            success,
            output: if success { "done".to_string() } else { "agent gave up".to_string() },
        })
    }
}
