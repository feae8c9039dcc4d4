//! Device command execution with timeout and exponential backoff.
//!
//! Every interaction with the device goes through [`AdbExecutor`]. Bounded
//! calls enforce a per-call wall clock limit and retry transient failures,
//! sleeping `2^attempt` seconds between attempts. Exhaustion is reported as
//! a distinguished outcome value, never as an error: callers treat missing
//! output as a valid negative result.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one device command after all retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Zero exit status; carries trimmed stdout.
    Success(String),
    /// Non-zero exit status on the final attempt.
    Failure,
    /// The command never completed: per-call timeout, kill, or spawn failure
    /// on the final attempt.
    TimedOut,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecOutcome::Success(_))
    }

    /// Captured stdout, if the command succeeded.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecOutcome::Success(out) => Some(out),
            _ => None,
        }
    }

    /// Short tag for audit entries and reason strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecOutcome::Success(_) => "SUCCESS",
            ExecOutcome::Failure => "FAILURE",
            ExecOutcome::TimedOut => "TIMEOUT",
        }
    }
}

enum RunError {
    TimedOut,
    Spawn(std::io::Error),
}

struct RunOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Bounded, retrying runner for the device control program.
#[derive(Clone, Debug)]
pub struct AdbExecutor {
    program: String,
    timeout: Duration,
    max_retries: u32,
}

impl AdbExecutor {
    pub fn new(program: impl Into<String>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            program: program.into(),
            timeout,
            max_retries: max_retries.max(1),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.adb_program.clone(), cfg.command_timeout, cfg.max_retries)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Render `program arg arg ...` for logs and error values.
    pub fn describe(&self, args: &[&str]) -> String {
        let mut line = self.program.clone();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run with the configured retry cap.
    pub fn execute(&self, args: &[&str]) -> ExecOutcome {
        self.execute_with_retries(args, self.max_retries)
    }

    /// Run with an explicit retry cap. Makes at most `max_retries` calls and
    /// sleeps `2^attempt` seconds between consecutive calls.
    pub fn execute_with_retries(&self, args: &[&str], max_retries: u32) -> ExecOutcome {
        let retries = max_retries.max(1);

        for attempt in 0..retries {
            let last = attempt + 1 == retries;
            match self.run_once(args, Some(self.timeout)) {
                Ok(run) if run.success => {
                    return ExecOutcome::Success(run.stdout.trim().to_string());
                }
                Ok(run) => {
                    debug!(
                        command = %self.describe(args),
                        attempt,
                        stderr = %run.stderr.trim(),
                        "device command returned non-zero"
                    );
                    if last {
                        return ExecOutcome::Failure;
                    }
                }
                Err(RunError::TimedOut) => {
                    debug!(command = %self.describe(args), attempt, "device command timed out");
                    if last {
                        return ExecOutcome::TimedOut;
                    }
                }
                Err(RunError::Spawn(err)) => {
                    warn!(command = %self.describe(args), attempt, %err, "failed to spawn");
                    if last {
                        return ExecOutcome::TimedOut;
                    }
                }
            }
            thread::sleep(backoff_delay(attempt));
        }

        ExecOutcome::TimedOut
    }

    /// Run without a deadline and without retries. Reserved for the backup
    /// trigger, which blocks on physical confirmation at the device screen.
    pub fn execute_unbounded(&self, args: &[&str]) -> ExecOutcome {
        match self.run_once(args, None) {
            Ok(run) if run.success => ExecOutcome::Success(run.stdout.trim().to_string()),
            Ok(run) => {
                debug!(
                    command = %self.describe(args),
                    stderr = %run.stderr.trim(),
                    "unbounded command returned non-zero"
                );
                ExecOutcome::Failure
            }
            Err(RunError::Spawn(err)) => {
                warn!(command = %self.describe(args), %err, "failed to spawn");
                ExecOutcome::Failure
            }
            Err(RunError::TimedOut) => ExecOutcome::TimedOut,
        }
    }

    /// True when at least one authorized device is attached.
    pub fn device_ready(&self) -> bool {
        match self.execute(&["devices"]) {
            ExecOutcome::Success(out) => out.lines().any(|line| line.ends_with("\tdevice")),
            _ => false,
        }
    }

    fn run_once(&self, args: &[&str], timeout: Option<Duration>) -> Result<RunOutput, RunError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunError::Spawn)?;

        // Drain pipes on reader threads so large outputs (dumpsys and
        // friends exceed the pipe buffer) cannot deadlock the wait loop.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Ok(RunOutput {
                        success: status.success(),
                        stdout: join_reader(stdout),
                        stderr: join_reader(stderr),
                    });
                }
                Ok(None) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        let _ = child.kill();
                        let _ = child.wait();
                        join_reader(stdout);
                        join_reader(stderr);
                        return Err(RunError::TimedOut);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    join_reader(stdout);
                    join_reader(stderr);
                    return Err(RunError::Spawn(err));
                }
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
