//! Subprocess execution.
//!
//! [`ProcessRunner`] is the seam between orchestration and the operating
//! system: [`TokioProcessRunner`] spawns real processes, the mock in
//! [`crate::mock`] replays scripted ones.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};

/// Output line of a subprocess.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

impl LogLine {
    pub fn new(stream: LogStream, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            message: message.into(),
        }
    }
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Result of a command run to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty output line, for error messages.
    pub fn last_line(&self) -> &str {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .filter(|l| !l.trim().is_empty())
            .last()
            .unwrap_or("no output")
    }
}

/// Control side of a spawned process.
pub struct ProcessHandle {
    pid: Option<u32>,
    exit: watch::Receiver<Option<i32>>,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code once the process has ended (`-1` when killed by a signal).
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit_code().is_none()
    }

    /// Wait for the process to end, up to `timeout`.
    pub async fn wait(&mut self, timeout: Duration) -> Option<i32> {
        let _ = tokio::time::timeout(timeout, self.exit.wait_for(|code| code.is_some())).await;
        self.exit_code()
    }

    /// Ask the supervisor to kill the process. Idempotent.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// A spawned long-running process: its output lines and its handle.
pub struct RunningProcess {
    pub lines: mpsc::Receiver<LogLine>,
    pub handle: ProcessHandle,
}

impl RunningProcess {
    /// Assemble from channels driven by a supervisor task.
    ///
    /// The supervisor kills the process when `kill` fires or is dropped, and
    /// publishes the exit code on `exit`.
    pub fn from_channels(
        pid: Option<u32>,
        lines: mpsc::Receiver<LogLine>,
        exit: watch::Receiver<Option<i32>>,
        kill: oneshot::Sender<()>,
    ) -> Self {
        Self {
            lines,
            handle: ProcessHandle {
                pid,
                exit,
                kill: Some(kill),
            },
        }
    }
}

/// Executes subprocesses.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, killing it after `timeout`.
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> RunnerResult<ExecutionResult>;

    /// Spawn a long-running command and stream its output.
    async fn spawn(&self, spec: &CommandSpec) -> RunnerResult<RunningProcess>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn spawn_failed(spec: &CommandSpec, e: std::io::Error) -> RunnerError {
        RunnerError::SpawnFailed {
            command: spec.display(),
            message: e.to_string(),
        }
    }
}

/// Forward every line of `reader` to `tx`, logging at debug.
fn forward_lines<R>(reader: R, stream: LogStream, tx: mpsc::Sender<LogLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] {}", stream, line);
            if tx.send(LogLine::new(stream, line)).await.is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> RunnerResult<ExecutionResult> {
        info!("Running: {}", spec);
        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = Self::command(spec)
            .spawn()
            .map_err(|e| Self::spawn_failed(spec, e))?;

        let (tx, mut rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, LogStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, LogStream::Stderr, tx.clone());
        }
        drop(tx);

        let collect = async {
            let mut stdout = String::new();
            let mut stderr = String::new();
            while let Some(line) = rx.recv().await {
                let buffer = match line.stream {
                    LogStream::Stdout => &mut stdout,
                    LogStream::Stderr => &mut stderr,
                };
                buffer.push_str(&line.message);
                buffer.push('\n');
            }
            let status = child.wait().await;
            (status, stdout, stderr)
        };

        let (status, stdout, stderr) = match tokio::time::timeout(timeout, collect).await {
            Ok(done) => done,
            Err(_) => {
                // kill_on_drop reaps the child once the future is gone
                warn!("{} timed out after {}s", spec, timeout.as_secs());
                return Err(RunnerError::Timeout(timeout.as_secs()));
            }
        };

        let status = status.map_err(|e| Self::spawn_failed(spec, e))?;
        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("{} exited with {} after {}ms", spec, exit_code, duration_ms);

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }

    async fn spawn(&self, spec: &CommandSpec) -> RunnerResult<RunningProcess> {
        info!("Spawning: {}", spec);
        let mut child = Self::command(spec)
            .spawn()
            .map_err(|e| Self::spawn_failed(spec, e))?;
        let pid = child.id();

        let (tx, rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, LogStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, LogStream::Stderr, tx);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let label = spec.display();

        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => status.ok().and_then(|s| s.code()).unwrap_or(-1),
                _ = kill_rx => {
                    debug!("Killing {}", label);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {}: {}", label, e);
                    }
                    -1
                }
            };
            debug!("{} ended with {}", label, code);
            let _ = exit_tx.send(Some(code));
        });

        Ok(RunningProcess::from_channels(pid, rx, exit_rx, kill_tx))
    }
}
