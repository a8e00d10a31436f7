//! Handlers for the `/analysis` resource.
//!
//! Submission creates the registry record and spawns the orchestration
//! task; it never blocks on admission. Status and result queries only
//! ever read registry snapshots.

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use iva_core::error::CoreError;
use iva_core::job::JobStatus;
use iva_core::protocol::AnalysisRequest;
use iva_core::submission::{validate_device_type, ALLOWED_VIDEO_EXTENSIONS};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Rough per-job duration hint returned to the client, in seconds.
const ESTIMATED_ANALYSIS_SECS: u64 = 300;

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisRequest {
    pub video_id: String,
    pub device_type: String,
    #[serde(default)]
    pub save_individual_report: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisResponse {
    pub analysis_id: Uuid,
    pub estimated_time: u64,
}

/// POST /api/analysis/start
///
/// Validate the submission, create a `pending` job record, and spawn
/// its orchestration task. Always returns immediately; admission
/// happens asynchronously behind the concurrency gate.
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(input): Json<StartAnalysisRequest>,
) -> AppResult<impl IntoResponse> {
    validate_device_type(&input.device_type)?;

    // Video ids are uuids we issued at upload time; parsing prevents
    // path traversal through the id.
    let video_id: Uuid = input.video_id.parse().map_err(|_| {
        AppError::Core(CoreError::Validation(format!(
            "Invalid video id: {}",
            input.video_id
        )))
    })?;

    let video_path = find_uploaded_video(&state, video_id).await.ok_or_else(|| {
        AppError::Core(CoreError::Validation(format!(
            "No uploaded video found for id {video_id}"
        )))
    })?;

    let job_id = state
        .engine
        .registry
        .create(&input.device_type, video_path.clone())
        .await;

    let request = AnalysisRequest {
        job_id,
        device_type: input.device_type.clone(),
        video_path,
        llm_models: state.config.llm_models.clone(),
        save_individual_report: input.save_individual_report,
    };
    state.engine.spawn_job(job_id, request);

    tracing::info!(
        job_id = %job_id,
        device_type = %input.device_type,
        "Analysis job submitted",
    );

    Ok(Json(StartAnalysisResponse {
        analysis_id: job_id,
        estimated_time: ESTIMATED_ANALYSIS_SECS,
    }))
}

/// Locate the uploaded video for `video_id` among the allowed container
/// extensions.
async fn find_uploaded_video(state: &AppState, video_id: Uuid) -> Option<std::path::PathBuf> {
    for ext in ALLOWED_VIDEO_EXTENSIONS {
        let candidate = state.config.artifact_dir.join(format!("{video_id}.{ext}"));
        if tokio::fs::metadata(&candidate).await.is_ok() {
            return Some(candidate);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    pub current_stage: String,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/analysis/status/{id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AnalysisStatusResponse>> {
    let record = state
        .engine
        .registry
        .get(id)
        .await
        .ok_or(CoreError::JobNotFound(id))?;

    Ok(Json(AnalysisStatusResponse {
        status: record.status,
        progress: record.progress,
        current_stage: record.current_stage,
        logs: record.logs,
        error: record.error,
    }))
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// GET /api/analysis/result/{id}
///
/// All-or-nothing: the payload is returned only once the job is
/// `completed`; before that the call is rejected.
pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let record = state
        .engine
        .registry
        .get(id)
        .await
        .ok_or(CoreError::JobNotFound(id))?;

    if record.status != JobStatus::Completed {
        return Err(CoreError::JobNotReady(id).into());
    }

    let result = record.result.ok_or_else(|| {
        AppError::InternalError(format!("Completed job {id} has no result payload"))
    })?;

    Ok(Json(result))
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// GET /api/analysis/download/{id}
///
/// Serialize the raw result to the artifact directory and return it as
/// a JSON attachment.
pub async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .engine
        .registry
        .get(id)
        .await
        .ok_or(CoreError::JobNotFound(id))?;

    if record.status != JobStatus::Completed {
        return Err(CoreError::JobNotReady(id).into());
    }

    let raw = record
        .raw_result
        .or(record.result)
        .ok_or_else(|| AppError::InternalError(format!("Completed job {id} has no payload")))?;

    let bytes = serde_json::to_vec_pretty(&raw)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize result: {e}")))?;

    // Keep a copy on disk next to the input; the retention sweeper
    // reclaims it with everything else.
    let file_path = state.config.artifact_dir.join(format!("{id}_result.json"));
    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        tracing::warn!(job_id = %id, error = %e, "Failed to persist result file");
    }

    let headers = [
        (CONTENT_TYPE, "application/json".to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"analysis_result_{id}.json\""),
        ),
    ];
    Ok((headers, bytes))
}
