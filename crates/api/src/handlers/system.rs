//! Service configuration and statistics endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use iva_core::job::JobStatus;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub concurrency_limit: usize,
    pub timeout_seconds: u64,
    pub retention_hours: u64,
    pub models: Vec<String>,
}

/// GET /api/config -- static service configuration.
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        concurrency_limit: state.config.max_concurrent_jobs,
        timeout_seconds: state.config.job_timeout_secs,
        retention_hours: state.config.retention_hours,
        models: state.config.llm_models.clone(),
    })
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Jobs currently holding an admission slot.
    pub current_analyses: usize,
    /// Jobs queued for a slot.
    pub waiting_analyses: usize,
    pub max_concurrent_analyses: usize,
    pub pending_analyses: usize,
    pub processing_analyses: usize,
    pub completed_analyses: usize,
    pub error_analyses: usize,
    pub uploaded_files: usize,
    pub uploaded_size_bytes: u64,
}

/// GET /api/stats -- gate occupancy, per-status job counts, and
/// artifact directory usage.
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let counts = state.engine.registry.status_counts().await;
    let count = |status: JobStatus| counts.get(&status).copied().unwrap_or(0);

    let (uploaded_files, uploaded_size_bytes) = artifact_usage(&state).await;

    Json(StatsResponse {
        current_analyses: state.engine.gate.active(),
        waiting_analyses: state.engine.gate.waiting(),
        max_concurrent_analyses: state.engine.gate.capacity(),
        pending_analyses: count(JobStatus::Pending),
        processing_analyses: count(JobStatus::Processing),
        completed_analyses: count(JobStatus::Completed),
        error_analyses: count(JobStatus::Error),
        uploaded_files,
        uploaded_size_bytes,
    })
}

/// Count files and bytes in the artifact directory. Errors degrade to
/// zeros; stats must never fail the request.
async fn artifact_usage(state: &AppState) -> (usize, u64) {
    let mut files = 0;
    let mut bytes = 0;
    let Ok(mut entries) = tokio::fs::read_dir(&state.config.artifact_dir).await else {
        return (0, 0);
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(metadata) = entry.metadata().await {
            if metadata.is_file() {
                files += 1;
                bytes += metadata.len();
            }
        }
    }
    (files, bytes)
}
