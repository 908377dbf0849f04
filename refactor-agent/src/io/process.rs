//! Helpers for running child processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub truncated_bytes: usize,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    /// Combined stdout/stderr tail as lossy UTF-8, bounded by `limit` bytes.
    pub fn combined_tail(&self, limit: usize) -> String {
        let mut combined = String::new();
        combined.push_str(&String::from_utf8_lossy(&self.stdout));
        if !self.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if combined.len() > limit {
            let start = combined.len() - limit;
            // Avoid splitting a UTF-8 sequence.
            let start = (start..combined.len())
                .find(|i| combined.is_char_boundary(*i))
                .unwrap_or(combined.len());
            combined = format!("...{}", &combined[start..]);
        }
        combined
    }
}

/// Run a command with a timeout, capturing stdout/stderr without risking pipe
/// deadlocks. Output is read concurrently while the child runs;
/// `output_limit_bytes` bounds what is kept in memory per stream.
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

    let start = Instant::now();
    debug!(timeout_secs = timeout.as_secs(), "spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr")?;
    let truncated_bytes = stdout_dropped + stderr_dropped;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "command output truncated");
    }

    let duration = start.elapsed();
    debug!(exit_code = ?status.code(), timed_out, duration_ms = duration.as_millis() as u64, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        truncated_bytes,
        timed_out,
        duration,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
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
            dropped += n.saturating_sub(keep);
        } else {
            dropped += n;
        }
    }

    Ok((buf, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let out =
            run_command_with_timeout(cmd, None, Duration::from_secs(5), 1024).expect("run");
        assert!(out.status.success());
        assert!(!out.timed_out);
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn enforces_timeout_and_reports_it() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let out =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024).expect("run");
        assert!(out.timed_out);
    }

    #[test]
    fn bounds_captured_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "head -c 100000 /dev/zero"]);
        let out = run_command_with_timeout(cmd, None, Duration::from_secs(5), 64).expect("run");
        assert_eq!(out.stdout.len(), 64);
        assert!(out.truncated_bytes > 0);
    }

    #[test]
    fn feeds_stdin_to_the_child() {
        let mut cmd = Command::new("cat");
        cmd.arg("-");
        let out = run_command_with_timeout(cmd, Some(b"ping"), Duration::from_secs(5), 1024)
            .expect("run");
        assert_eq!(out.stdout, b"ping");
    }

    #[test]
    fn combined_tail_keeps_the_end() {
        let out = CommandOutput {
            status: Command::new("true").status().expect("status"),
            stdout: b"abcdefgh".to_vec(),
            stderr: Vec::new(),
            truncated_bytes: 0,
            timed_out: false,
            duration: Duration::from_millis(1),
        };
        assert_eq!(out.combined_tail(4), "...efgh");
    }
}
