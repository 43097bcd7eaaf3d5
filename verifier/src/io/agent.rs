//! Prompt-step execution through an external agent process.
//!
//! Prompt steps carry no oracle: the agent runs once per agentic pass with
//! its instruction plus the unmet verification steps, and success only
//! means the agent process exited cleanly.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

const AGENTIC_TEMPLATE: &str = include_str!("prompts/agentic.md");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub step_id: String,
    /// Fully rendered instruction.
    pub prompt: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOutcome {
    pub success: bool,
    pub output: String,
}

/// Abstraction over agent backends.
pub trait PromptExecutor {
    fn run(&self, request: &PromptRequest) -> Result<PromptOutcome>;
}

/// One unmet required step, as shown to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    pub id: String,
    pub name: String,
    /// `failed` or `missing`.
    pub reason: String,
    /// Tail of the step's captured output.
    pub output: String,
}

/// Inputs of the agentic instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgenticContext {
    pub iteration: u32,
    pub max_iterations: u32,
    pub failures: Vec<FailureContext>,
}

/// Render a prompt step's content together with the failed-step context.
pub fn render_agentic_prompt(instruction: &str, ctx: &AgenticContext) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("agentic", AGENTIC_TEMPLATE)
        .context("load agentic template")?;
    let template = env.get_template("agentic")?;
    let rendered = template.render(context! {
        instruction => instruction.trim(),
        iteration => ctx.iteration,
        max_iterations => ctx.max_iterations,
        failures => &ctx.failures,
    })?;
    Ok(rendered)
}

/// Agent invoked as a child process with the prompt on stdin.
pub struct AgentCommandExecutor {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub output_limit_bytes: usize,
}

impl AgentCommandExecutor {
    pub fn new(command: Vec<String>, workdir: &Path, output_limit_bytes: usize) -> Self {
        Self {
            command,
            workdir: workdir.to_path_buf(),
            output_limit_bytes,
        }
    }
}

impl PromptExecutor for AgentCommandExecutor {
    #[instrument(skip_all, fields(step_id = %request.step_id, timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &PromptRequest) -> Result<PromptOutcome> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        info!(program = %program, "starting agent");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run agent {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
        } else {
            debug!("agent completed");
        }
        Ok(PromptOutcome {
            success: output.succeeded(),
            output: output.combined(),
        })
    }
}
