//! Worker process lifecycle.
//!
//! [`WorkerLauncher`] abstracts how an admitted job's isolated execution
//! context is started, so orchestration logic is independent of the
//! isolation mechanism. [`ProcessLauncher`] is the production
//! implementation: one OS process per job running the worker binary,
//! with the job request written to its stdin and the single terminal
//! report read back from its stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

use iva_core::protocol::{AnalysisRequest, WorkerReport};

use super::signals;

/// Maximum stderr captured per worker for diagnostics (256 KiB).
const MAX_STDERR_BYTES: usize = 256 * 1024;

/// Failure taxonomy for one worker run.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// No terminal report arrived within the wall-clock budget.
    #[error("Analysis timed out after {budget_secs}s and the worker was terminated")]
    Timeout { budget_secs: u64 },

    /// The worker exited without writing a terminal report.
    #[error("Worker exited without reporting a result (exit code {exit_code})")]
    Crashed { exit_code: i32, stderr: String },

    /// The worker reported a failure through the result channel.
    #[error("Analysis failed: {message}")]
    Reported {
        message: String,
        diagnostic: Option<String>,
    },

    /// Reading the result channel failed unexpectedly.
    #[error("Failed to read worker result: {0}")]
    Channel(#[source] std::io::Error),

    /// The worker process could not be started.
    #[error("Failed to launch worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A running worker owned by exactly one job task.
#[async_trait]
pub trait WorkerProcess: Send {
    /// Read the worker's terminal report from the result channel.
    ///
    /// Resolves to `Ok(None)` when the channel closes without a report
    /// (abnormal worker exit). Must be called before [`wait`](Self::wait):
    /// a report larger than the channel's transport buffer blocks the
    /// worker's final write until it is read.
    async fn recv_report(&mut self) -> std::io::Result<Option<WorkerReport>>;

    /// Ask the worker to stop gracefully.
    fn request_termination(&mut self);

    /// Force-kill the worker.
    async fn force_kill(&mut self);

    /// Wait up to `limit` for exit; `None` if still running after that.
    async fn wait(&mut self, limit: Duration) -> Option<i32>;

    /// Captured stderr tail, for diagnostics after exit.
    async fn stderr_tail(&mut self) -> String;

    /// OS pid, while the process has not been reaped.
    fn pid(&self) -> Option<u32>;
}

/// Starts isolated workers for admitted jobs.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, request: &AnalysisRequest)
        -> Result<Box<dyn WorkerProcess>, WorkerError>;
}

// ---------------------------------------------------------------------------
// OS-process implementation
// ---------------------------------------------------------------------------

/// Launches one OS process per job from a configured command line.
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Build from a whitespace-split command line (e.g. `iva-worker`).
    pub fn new(command_line: &str) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        Self {
            program: parts.next().unwrap_or_else(|| "iva-worker".to_string()),
            args: parts.collect(),
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Box<dyn WorkerProcess>, WorkerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::Spawn)?;

        // Write the request, then close stdin so the worker sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            let bytes = serde_json::to_vec(request).unwrap_or_default();
            // Best-effort write; a worker that dies instantly is caught
            // by the empty result channel.
            let _ = stdin.write_all(&bytes).await;
            drop(stdin);
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            WorkerError::Spawn(std::io::Error::other("worker stdout was not captured"))
        })?;

        // Drain stderr concurrently so the worker can never block on a
        // full stderr pipe while we read stdout.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut h) = stderr {
                let _ = (&mut h)
                    .take(MAX_STDERR_BYTES as u64)
                    .read_to_end(&mut buf)
                    .await;
            }
            buf
        });

        let pid = child.id();
        Ok(Box::new(SpawnedWorker {
            child,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            stderr_tail: None,
            pid,
        }))
    }
}

/// A live worker process and its result channel.
struct SpawnedWorker {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<tokio::task::JoinHandle<Vec<u8>>>,
    stderr_tail: Option<String>,
    pid: Option<u32>,
}

#[async_trait]
impl WorkerProcess for SpawnedWorker {
    async fn recv_report(&mut self) -> std::io::Result<Option<WorkerReport>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<WorkerReport>(trimmed) {
                Ok(report) => return Ok(Some(report)),
                Err(_) => {
                    // Stray output on the result channel; ignore it.
                    tracing::debug!(line = %trimmed, "Skipping non-report worker output");
                }
            }
        }
    }

    fn request_termination(&mut self) {
        if let Some(pid) = self.child.id() {
            if let Err(e) = signals::send_term(pid) {
                tracing::warn!(pid, error = %e, "Failed to signal worker termination");
            }
        }
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to force-kill worker");
        }
    }

    async fn wait(&mut self, limit: Duration) -> Option<i32> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Some(status.code().unwrap_or(-1)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Waiting on worker failed");
                Some(-1)
            }
            Err(_elapsed) => None,
        }
    }

    async fn stderr_tail(&mut self) -> String {
        if let Some(task) = self.stderr_task.take() {
            let bytes = match tokio::time::timeout(Duration::from_secs(1), task).await {
                Ok(Ok(bytes)) => bytes,
                _ => Vec::new(),
            };
            self.stderr_tail = Some(String::from_utf8_lossy(&bytes).trim().to_string());
        }
        self.stderr_tail.clone().unwrap_or_default()
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}
