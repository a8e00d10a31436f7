pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /video/upload              upload a video (POST, multipart)
///
/// /analysis/start            submit an analysis job (POST)
/// /analysis/status/{id}      job status, progress, and logs
/// /analysis/result/{id}      completed result payload
/// /analysis/download/{id}    raw result as a JSON attachment
///
/// /config                    static service configuration
/// /stats                     gate occupancy and job counts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/video/upload", post(handlers::video::upload_video))
        .route("/analysis/start", post(handlers::analysis::start_analysis))
        .route("/analysis/status/{id}", get(handlers::analysis::get_status))
        .route("/analysis/result/{id}", get(handlers::analysis::get_result))
        .route(
            "/analysis/download/{id}",
            get(handlers::analysis::download_result),
        )
        .route("/config", get(handlers::system::get_config))
        .route("/stats", get(handlers::system::get_stats))
}
