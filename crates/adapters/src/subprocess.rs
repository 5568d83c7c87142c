// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocking subprocess execution with kill-on-timeout.
//!
//! Output pipes are drained on helper threads so a chatty child can never
//! deadlock against a full pipe buffer; the parent polls `try_wait` and
//! kills the child when the deadline passes.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a subprocess run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `sh -c <command>` in `dir`, optionally feeding stdin.
pub fn run_shell(
    command: &str,
    dir: &Path,
    timeout: Duration,
    stdin: Option<&str>,
) -> std::io::Result<CommandOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    run(cmd, dir, timeout, stdin)
}

/// Run an argv vector in `dir`, optionally feeding stdin.
pub fn run_argv(
    argv: &[&str],
    dir: &Path,
    timeout: Duration,
    stdin: Option<&str>,
) -> std::io::Result<CommandOutput> {
    let Some((program, args)) = argv.split_first() else {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"));
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    run(cmd, dir, timeout, stdin)
}

fn run(
    mut cmd: Command,
    dir: &Path,
    timeout: Duration,
    stdin: Option<&str>,
) -> std::io::Result<CommandOutput> {
    cmd.current_dir(dir)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    if let Some(data) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let data = data.to_string();
            std::thread::spawn(move || {
                let _ = pipe.write_all(data.as_bytes());
                // Dropping the pipe closes the child's stdin.
            });
        }
    }

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || drain(stdout_pipe));
    let stderr_thread = std::thread::spawn(move || drain(stderr_pipe));

    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait()? {
            Some(status) => break status.code().unwrap_or(-1),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break -1;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    Ok(CommandOutput {
        exit_code,
        stdout: stdout_thread.join().unwrap_or_default(),
        stderr: stderr_thread.join().unwrap_or_default(),
        timed_out,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
