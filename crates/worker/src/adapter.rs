//! Analysis adapter boundary.
//!
//! The vision/LLM analysis pipeline is an external collaborator; this
//! module only defines the seam. [`CommandAdapter`] is the bundled
//! implementation: it invokes the configured pipeline command with the
//! request JSON on stdin and parses the report JSON from stdout.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use iva_core::protocol::AnalysisRequest;

/// Maximum stdout or stderr size captured from the pipeline (10 MiB).
///
/// Output exceeding this limit is truncated to prevent memory exhaustion
/// from extremely verbose pipelines.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Environment variable naming the analysis pipeline command line.
const PIPELINE_CMD_ENV: &str = "ANALYSIS_PIPELINE_CMD";

/// Default pipeline command when the env var is unset.
const DEFAULT_PIPELINE_CMD: &str = "python3 -m app_server.app_main";

/// Errors from one adapter invocation.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Analysis pipeline exited with code {exit_code}: {stderr}")]
    PipelineFailed { exit_code: i32, stderr: String },

    #[error("Analysis pipeline produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("I/O error running analysis pipeline: {0}")]
    Io(#[from] std::io::Error),
}

/// One isolated analysis run.
///
/// Implementations must be safe to invoke concurrently from sibling
/// worker processes; they may not rely on process-global mutable state.
pub trait AnalysisAdapter: Send + Sync {
    /// Run the analysis and return the raw report payload.
    fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> impl std::future::Future<Output = Result<Value, AdapterError>> + Send;
}

/// Adapter that shells out to the external analysis pipeline.
pub struct CommandAdapter {
    program: String,
    args: Vec<String>,
}

impl CommandAdapter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build the adapter from `ANALYSIS_PIPELINE_CMD` (whitespace-split
    /// command line), falling back to the bundled pipeline entry point.
    pub fn from_env() -> Self {
        let raw = std::env::var(PIPELINE_CMD_ENV).unwrap_or_else(|_| DEFAULT_PIPELINE_CMD.into());
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "python3".to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }
}

impl AnalysisAdapter for CommandAdapter {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AdapterError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Write the request, then close stdin so the pipeline sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            let bytes = serde_json::to_vec(request).unwrap_or_default();
            let _ = stdin.write_all(&bytes).await;
            drop(stdin);
        }

        // Drain both streams concurrently so neither pipe can fill up
        // while we wait for exit.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_capped(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_capped(stderr_handle).await });

        let status = child.wait().await?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(AdapterError::PipelineFailed {
                exit_code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&stdout);
        serde_json::from_str(text.trim())
            .map_err(|e| AdapterError::InvalidOutput(format!("{e} (stdout was not report JSON)")))
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
