//! Mock process runner for testing.
//!
//! Replays scripted results for `run` and scripted output for `spawn`, and
//! captures every call so tests can check what the orchestrator executed
//! without touching a package manager.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::CommandSpec;
use crate::error::{RunnerError, RunnerResult};
use crate::process::{ExecutionResult, LogLine, LogStream, ProcessRunner, RunningProcess};

/// Predefined result for a `run` call.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Fail the call with this spawn error instead of returning a result
    pub spawn_error: Option<String>,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
            spawn_error: None,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
            spawn_error: None,
        }
    }

    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::failure(-1, "")
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Scripted long-running process for `spawn`.
#[derive(Debug, Clone, Default)]
pub struct MockProcess {
    /// Lines emitted on stdout, in order
    pub lines: Vec<String>,
    /// Exit after emitting the lines; `None` keeps running until killed
    pub exit_code: Option<i32>,
    /// Pause before each line
    pub delay: Duration,
}

impl MockProcess {
    /// Emits `lines` then keeps running.
    pub fn serving<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Emits `lines` then exits with `code`.
    pub fn exiting<I, S>(lines: I, code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exit_code: Some(code),
            ..Self::serving(lines)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    /// `run` or `spawn`
    pub method: String,
    pub command: String,
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

/// Mock process runner.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    /// Responses keyed by a substring of the command line; first match wins
    run_rules: Arc<RwLock<Vec<(String, MockResponse)>>>,
    /// Processes handed out by successive `spawn` calls
    processes: Arc<RwLock<Vec<MockProcess>>>,
    process_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Number of spawned processes that have been killed
    kills: Arc<AtomicUsize>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `run` calls whose command line contains `pattern`.
    pub fn on_run(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.run_rules.write().push((pattern.into(), response));
        self
    }

    /// Add a process for the next `spawn` call. The last one is reused.
    pub fn add_process(self, process: MockProcess) -> Self {
        self.processes.write().push(process);
        self
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Whether any call's command line contains `pattern`.
    pub fn ran(&self, pattern: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.command.contains(pattern))
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn record_call(&self, method: &str, spec: &CommandSpec) {
        self.captured_calls.write().push(CapturedCall {
            method: method.to_string(),
            command: spec.display(),
            workdir: spec.workdir.clone(),
            env: spec.env.clone(),
        });
    }

    fn response_for(&self, command: &str) -> MockResponse {
        self.run_rules
            .read()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| MockResponse::success(""))
    }

    fn next_process(&self) -> MockProcess {
        let processes = self.processes.read();
        if processes.is_empty() {
            return MockProcess::serving(["ready in 1 ms"]);
        }
        let index = self.process_index.fetch_add(1, Ordering::SeqCst);
        processes
            .get(index.min(processes.len() - 1))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, spec: &CommandSpec, timeout: Duration) -> RunnerResult<ExecutionResult> {
        self.record_call("run", spec);
        let response = self.response_for(&spec.display());

        if let Some(message) = response.spawn_error {
            return Err(RunnerError::SpawnFailed {
                command: spec.display(),
                message,
            });
        }
        if Duration::from_millis(response.duration_ms) > timeout {
            return Err(RunnerError::Timeout(timeout.as_secs()));
        }

        let now = Utc::now();
        Ok(ExecutionResult {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at: now,
            finished_at: now,
            duration_ms: response.duration_ms,
        })
    }

    async fn spawn(&self, spec: &CommandSpec) -> RunnerResult<RunningProcess> {
        self.record_call("spawn", spec);
        let script = self.next_process();

        let (line_tx, line_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let kills = self.kills.clone();

        tokio::spawn(async move {
            for line in script.lines {
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                if line_tx.send(LogLine::new(LogStream::Stdout, line)).await.is_err() {
                    break;
                }
            }
            drop(line_tx);

            let code = match script.exit_code {
                Some(code) => code,
                None => {
                    if (&mut kill_rx).await.is_ok() {
                        kills.fetch_add(1, Ordering::SeqCst);
                    }
                    -1
                }
            };
            let _ = exit_tx.send(Some(code));
        });

        Ok(RunningProcess::from_channels(
            Some(4242),
            line_rx,
            exit_rx,
            kill_tx,
        ))
    }
}
