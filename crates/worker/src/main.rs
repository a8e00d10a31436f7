use std::process::ExitCode;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iva_core::protocol::{AnalysisRequest, WorkerReport};
use iva_worker::adapter::{AdapterError, AnalysisAdapter, CommandAdapter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // stdout carries the single report line; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iva_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let request = match read_request().await {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read job request from stdin");
            emit(&WorkerReport::failed(format!("Invalid job request: {e}"), None)).await;
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        job_id = %request.job_id,
        device_type = %request.device_type,
        video = %request.video_path.display(),
        "Worker starting analysis",
    );

    let adapter = CommandAdapter::from_env();

    // A graceful-termination request aborts the run; dropping the runtime
    // tears down the pipeline child via kill_on_drop.
    let result = tokio::select! {
        result = adapter.analyze(&request) => result,
        _ = termination_signal() => {
            tracing::warn!(job_id = %request.job_id, "Termination requested, abandoning analysis");
            return ExitCode::FAILURE;
        }
    };

    let report = match result {
        Ok(payload) => {
            tracing::info!(job_id = %request.job_id, "Analysis finished");
            WorkerReport::completed(payload)
        }
        Err(AdapterError::PipelineFailed { exit_code, stderr }) => {
            tracing::error!(job_id = %request.job_id, exit_code, "Analysis pipeline failed");
            WorkerReport::failed(
                format!("Analysis pipeline exited with code {exit_code}"),
                Some(stderr),
            )
        }
        Err(e) => {
            tracing::error!(job_id = %request.job_id, error = %e, "Analysis failed");
            WorkerReport::failed(e.to_string(), None)
        }
    };

    emit(&report).await;
    ExitCode::SUCCESS
}

/// Read the complete [`AnalysisRequest`] JSON document from stdin.
async fn read_request() -> Result<AnalysisRequest, String> {
    let mut buf = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buf)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&buf).map_err(|e| e.to_string())
}

/// Write the terminal report as one JSON line on stdout and flush.
async fn emit(report: &WorkerReport) {
    let mut line = serde_json::to_vec(report).unwrap_or_default();
    line.push(b'\n');
    let mut stdout = tokio::io::stdout();
    if let Err(e) = stdout.write_all(&line).await {
        tracing::error!(error = %e, "Failed to write report to stdout");
    }
    let _ = stdout.flush().await;
}

/// Resolve when the orchestrator asks this worker to stop gracefully.
#[cfg(unix)]
async fn termination_signal() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() {
    std::future::pending::<()>().await;
}
