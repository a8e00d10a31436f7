use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::runner::AnalysisEngine;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job orchestration engine (registry, gate, worker launcher).
    pub engine: Arc<AnalysisEngine>,
}
