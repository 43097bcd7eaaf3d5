//! Command-step execution.
//!
//! The [`CommandExecutor`] trait decouples the scheduler from process
//! spawning. Tests use scripted executors that return predetermined
//! outcomes without running anything.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::config::InterpreterConfig;
use crate::io::process::run_command_with_timeout;
use crate::workflow::TestType;

/// What a command step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandBody {
    /// POSIX shell text, run with `sh -c`.
    Shell(String),
    /// A code body fed to the interpreter for its test type.
    Code {
        code: String,
        test_type: Option<TestType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub step_id: String,
    pub body: CommandBody,
    pub working_directory: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Bounded stdout and stderr.
    pub output: String,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Abstraction over command backends.
///
/// `Err` means the command could not be run at all (spawn failure, missing
/// interpreter); a command that ran and failed is an `Ok` outcome.
pub trait CommandExecutor {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutcome>;
}

/// Executor that spawns real processes.
pub struct ShellCommandExecutor {
    /// Base for relative `working_directory` values.
    pub root: PathBuf,
    pub interpreters: InterpreterConfig,
    pub output_limit_bytes: usize,
}

impl ShellCommandExecutor {
    pub fn new(root: &Path, interpreters: InterpreterConfig, output_limit_bytes: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            interpreters,
            output_limit_bytes,
        }
    }

    fn workdir(&self, request: &CommandRequest) -> PathBuf {
        match &request.working_directory {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        }
    }
}

impl CommandExecutor for ShellCommandExecutor {
    #[instrument(skip_all, fields(step_id = %request.step_id, timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &CommandRequest) -> Result<CommandOutcome> {
        let workdir = self.workdir(request);
        if !workdir.is_dir() {
            return Err(anyhow!("working directory {} does not exist", workdir.display()));
        }

        let (mut cmd, stdin) = match &request.body {
            CommandBody::Shell(script) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                (cmd, None)
            }
            CommandBody::Code { code, test_type } => {
                let argv = self.interpreters.argv_for(test_type.as_ref());
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| anyhow!("empty interpreter command"))?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                (cmd, Some(code.as_bytes()))
            }
        };
        cmd.current_dir(&workdir);

        debug!(workdir = %workdir.display(), "running command step");
        let output = run_command_with_timeout(cmd, stdin, request.timeout, self.output_limit_bytes)
            .with_context(|| format!("run step {}", request.step_id))?;
        if output.timed_out {
            warn!(step_id = %request.step_id, "command step timed out");
        }
        Ok(CommandOutcome {
            exit_code: output.status.code(),
            timed_out: output.timed_out,
            output: output.combined(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(root: &Path) -> ShellCommandExecutor {
        ShellCommandExecutor::new(root, InterpreterConfig::default(), 10_000)
    }

    fn request(body: CommandBody) -> CommandRequest {
        CommandRequest {
            step_id: "step".to_string(),
            body,
            working_directory: None,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn shell_commands_run_in_the_working_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(temp.path().join("app")).expect("mkdir");
        std::fs::write(temp.path().join("app").join("README.md"), "hi").expect("write");

        let mut req = request(CommandBody::Shell("test -f README.md".to_string()));
        req.working_directory = Some(PathBuf::from("app"));
        let outcome = executor(temp.path()).run(&req).expect("run");
        assert!(outcome.succeeded());

        let outcome = executor(temp.path())
            .run(&request(CommandBody::Shell("test -f README.md".to_string())))
            .expect("run");
        assert_eq!(outcome.exit_code, Some(1));
    }

    /// Code bodies go to the configured interpreter on stdin.
    #[test]
    fn code_is_fed_to_the_interpreter() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut interpreters = InterpreterConfig::default();
        interpreters.python = vec!["sh".to_string(), "-s".to_string()];
        let executor = ShellCommandExecutor::new(temp.path(), interpreters, 10_000);

        let outcome = executor
            .run(&request(CommandBody::Code {
                code: "echo from-stdin".to_string(),
                test_type: Some(TestType::Python),
            }))
            .expect("run");
        assert!(outcome.succeeded());
        assert!(outcome.output.contains("from-stdin"));
    }

    #[test]
    fn missing_working_directory_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(CommandBody::Shell("true".to_string()));
        req.working_directory = Some(PathBuf::from("nope"));
        let err = executor(temp.path()).run(&req).expect_err("missing dir");
        assert!(err.to_string().contains("does not exist"));
    }
}
