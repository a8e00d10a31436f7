//! Per-job orchestration.
//!
//! One task per submitted job: wait for an admission slot, move the
//! record to `processing`, launch the isolated worker, and record the
//! terminal state. The worker interaction follows a strict order:
//! drain the result channel first, only then wait for process exit. A
//! report larger than the pipe's transport buffer blocks the worker's
//! final write until the orchestrator reads it; an orchestrator that
//! waited on exit first would deadlock against that write.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use iva_core::error::CoreError;
use iva_core::job::JobStatus;
use iva_core::protocol::AnalysisRequest;

use super::gate::ConcurrencyGate;
use super::registry::JobRegistry;
use super::tracker::WorkerTable;
use super::worker::{WorkerError, WorkerLauncher, WorkerProcess};

/// Bounded join after a report has been received.
const EXIT_GRACE: Duration = Duration::from_secs(30);

/// Wait after a graceful termination request before force-killing.
const TERM_GRACE: Duration = Duration::from_secs(10);

/// Wait after a force-kill before giving up on the process.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Shared handles driving all job tasks.
///
/// Cheap to clone; every field is behind an `Arc`, so clones observe
/// the same registry, gate, and worker table.
#[derive(Clone)]
pub struct AnalysisEngine {
    pub registry: Arc<JobRegistry>,
    pub gate: Arc<ConcurrencyGate>,
    pub launcher: Arc<dyn WorkerLauncher>,
    pub workers: Arc<WorkerTable>,
    job_timeout: Duration,
}

impl AnalysisEngine {
    pub fn new(
        registry: Arc<JobRegistry>,
        gate: Arc<ConcurrencyGate>,
        launcher: Arc<dyn WorkerLauncher>,
        workers: Arc<WorkerTable>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            launcher,
            workers,
            job_timeout,
        }
    }

    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Spawn the orchestration task for a freshly created job.
    pub fn spawn_job(&self, job_id: Uuid, request: AnalysisRequest) {
        let engine = self.clone();
        tokio::spawn(async move {
            run_job(engine, job_id, request).await;
        });
    }
}

/// Drive one job from `pending` to a terminal state.
pub async fn run_job(engine: AnalysisEngine, job_id: Uuid, request: AnalysisRequest) {
    // Surface queueing to the client before suspending on admission.
    let capacity = engine.gate.capacity();
    let running = engine.gate.active();
    if running >= capacity {
        let _ = engine
            .registry
            .update(job_id, |rec| {
                rec.current_stage = format!("Waiting for a free analysis slot ({running}/{capacity} in use)");
                rec.push_log(format!(
                    "Queued: concurrency limit reached ({running}/{capacity} analyses running)"
                ));
            })
            .await;
    }

    // Slot is released on every exit path below when `_slot` drops.
    let _slot = engine.gate.acquire().await;

    let admitted: Result<Result<(), CoreError>, CoreError> = engine
        .registry
        .update(job_id, |rec| {
            rec.transition(JobStatus::Processing)?;
            rec.progress = 5;
            rec.current_stage = "Initializing analysis".to_string();
            rec.push_log(format!(
                "Analysis started (device type {}, timeout {}s)",
                rec.device_type,
                engine.job_timeout.as_secs(),
            ));
            Ok(())
        })
        .await;
    if let Err(e) = admitted.and_then(|inner| inner) {
        tracing::error!(job_id = %job_id, error = %e, "Could not mark job as processing");
        return;
    }

    tracing::info!(
        job_id = %job_id,
        device_type = %request.device_type,
        active = engine.gate.active(),
        capacity,
        "Analysis admitted",
    );

    let outcome = execute(&engine, job_id, &request).await;
    record_outcome(&engine.registry, job_id, &request, outcome).await;
}

/// Launch the worker and run the drain-then-join protocol.
async fn execute(
    engine: &AnalysisEngine,
    job_id: Uuid,
    request: &AnalysisRequest,
) -> Result<Value, WorkerError> {
    let mut worker = engine.launcher.launch(request).await?;
    if let Some(pid) = worker.pid() {
        engine.workers.insert(job_id, pid);
    }

    let result = drive(worker.as_mut(), engine.job_timeout).await;
    engine.workers.remove(job_id);
    result
}

/// Drain the result channel (bounded by the job budget), then reap the
/// process with short secondary bounds.
async fn drive(
    worker: &mut dyn WorkerProcess,
    budget: Duration,
) -> Result<Value, WorkerError> {
    match tokio::time::timeout(budget, worker.recv_report()).await {
        // A fully-read report beats the deadline by construction: the
        // timeout only fires if the read has not completed.
        Ok(Ok(Some(report))) => {
            reap_after_report(worker).await;
            report.into_outcome().map_err(|failure| WorkerError::Reported {
                message: failure.message,
                diagnostic: failure.diagnostic,
            })
        }
        Ok(Ok(None)) => {
            // Channel closed with no report: abnormal worker exit.
            let exit_code = worker.wait(EXIT_GRACE).await.unwrap_or(-1);
            let stderr = worker.stderr_tail().await;
            Err(WorkerError::Crashed { exit_code, stderr })
        }
        Ok(Err(e)) => {
            terminate_with_escalation(worker).await;
            Err(WorkerError::Channel(e))
        }
        Err(_elapsed) => {
            terminate_with_escalation(worker).await;
            Err(WorkerError::Timeout {
                budget_secs: budget.as_secs(),
            })
        }
    }
}

/// Join a worker that already delivered its report, force-killing if it
/// lingers past the bound.
async fn reap_after_report(worker: &mut dyn WorkerProcess) {
    if worker.wait(EXIT_GRACE).await.is_none() {
        tracing::warn!("Worker still running after delivering its report; force-killing");
        worker.force_kill().await;
        worker.wait(KILL_GRACE).await;
    }
}

/// Graceful termination, then forced: signal, wait, kill, wait.
async fn terminate_with_escalation(worker: &mut dyn WorkerProcess) {
    worker.request_termination();
    if worker.wait(TERM_GRACE).await.is_some() {
        return;
    }
    tracing::warn!("Worker ignored graceful termination; force-killing");
    worker.force_kill().await;
    if worker.wait(KILL_GRACE).await.is_none() {
        tracing::error!("Worker did not exit after force-kill");
    }
}

/// Write the terminal state into the registry.
async fn record_outcome(
    registry: &JobRegistry,
    job_id: Uuid,
    request: &AnalysisRequest,
    outcome: Result<Value, WorkerError>,
) {
    let update = match outcome {
        Ok(payload) => {
            tracing::info!(job_id = %job_id, "Analysis completed");
            // The raw export keeps the full report plus job metadata;
            // `result` carries the report alone.
            let raw = serde_json::json!({
                "jobId": job_id,
                "deviceType": request.device_type,
                "report": payload.clone(),
            });
            registry
                .update(job_id, |rec| {
                    rec.push_log("Analysis completed");
                    rec.complete(payload, raw)
                })
                .await
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Analysis failed");
            if let WorkerError::Reported {
                diagnostic: Some(diagnostic),
                ..
            } = &e
            {
                tracing::debug!(job_id = %job_id, %diagnostic, "Worker failure diagnostic");
            }
            if let WorkerError::Crashed { stderr, .. } = &e {
                if !stderr.is_empty() {
                    tracing::debug!(job_id = %job_id, %stderr, "Worker stderr tail");
                }
            }
            registry
                .update(job_id, |rec| {
                    rec.push_log("Analysis failed");
                    rec.fail(e.to_string())
                })
                .await
        }
    };

    if let Err(e) = update.and_then(|inner| inner) {
        tracing::error!(job_id = %job_id, error = %e, "Could not record job outcome");
    }
}
