//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Exited with status 0 within the timeout.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout then stderr as one lossy string, with truncation notices.
    pub fn combined(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stderr_truncated > 0 {
            buf.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        if self.timed_out {
            buf.push_str("\n[timed out]\n");
        }
        buf
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is fed and output is read concurrently while the child runs.
/// `output_limit_bytes` bounds the amount of stdout/stderr stored in memory
/// (bytes beyond this are discarded while still draining the pipe).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || {
                // A child that exits without reading its input closes the pipe.
                if let Err(e) = child_stdin.write_all(&input)
                    && e.kind() != std::io::ErrorKind::BrokenPipe
                {
                    warn!(err = %e, "failed to write child stdin");
                }
            }))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle
        && handle.join().is_err()
    {
        return Err(anyhow!("stdin writer thread panicked"));
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Keep at most the last `limit` bytes of `text`, on a char boundary.
pub fn tail(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_both_streams_and_status() {
        let output = run_command_with_timeout(
            sh("echo out; echo err >&2; exit 3"),
            None,
            Duration::from_secs(10),
            1000,
        )
        .expect("run");
        assert_eq!(output.status.code(), Some(3));
        assert!(!output.succeeded());
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn feeds_stdin() {
        let output =
            run_command_with_timeout(sh("cat"), Some(b"hello"), Duration::from_secs(10), 1000)
                .expect("run");
        assert!(output.succeeded());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn kills_on_timeout() {
        let output = run_command_with_timeout(sh("sleep 5"), None, Duration::from_millis(100), 1000)
            .expect("run");
        assert!(output.timed_out);
        assert!(!output.succeeded());
    }

    #[test]
    fn bounds_captured_output() {
        let output = run_command_with_timeout(
            sh("printf '0123456789'"),
            None,
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("héllo", 4), "llo");
        assert_eq!(tail("ok", 10), "ok");
    }
}
