#![allow(dead_code)]

//! Shared helpers for integration tests: a scripted stand-in for the
//! worker launcher, engine/state construction, and the router with the
//! same middleware stack production uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;

use iva_api::config::ServerConfig;
use iva_api::engine::gate::ConcurrencyGate;
use iva_api::engine::registry::JobRegistry;
use iva_api::engine::runner::AnalysisEngine;
use iva_api::engine::tracker::WorkerTable;
use iva_api::engine::worker::{WorkerError, WorkerLauncher, WorkerProcess};
use iva_api::routes;
use iva_api::state::AppState;
use iva_core::protocol::{AnalysisRequest, WorkerReport};

// ---------------------------------------------------------------------------
// Stub worker launcher
// ---------------------------------------------------------------------------

/// Scripted behavior for stub workers.
#[derive(Clone)]
pub enum StubBehavior {
    /// Deliver a success report after `delay`.
    Succeed { payload: Value, delay: Duration },
    /// Deliver a failure report immediately.
    Fail { message: String },
    /// Close the result channel without a report, then exit with `exit_code`.
    Crash { exit_code: i32 },
    /// Never report. If `obeys_termination`, exit on the graceful
    /// signal; otherwise only a force-kill ends it.
    Hang { obeys_termination: bool },
}

/// Launcher producing [`StubWorker`]s with a fixed behavior.
///
/// The shared flags record whether any launched worker received a
/// graceful termination request or a force-kill.
pub struct StubLauncher {
    behavior: StubBehavior,
    pub termination_requested: Arc<AtomicBool>,
    pub force_killed: Arc<AtomicBool>,
}

impl StubLauncher {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            termination_requested: Arc::new(AtomicBool::new(false)),
            force_killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn succeed_with(payload: Value) -> Self {
        Self::new(StubBehavior::Succeed {
            payload,
            delay: Duration::from_millis(0),
        })
    }
}

#[async_trait]
impl WorkerLauncher for StubLauncher {
    async fn launch(
        &self,
        _request: &AnalysisRequest,
    ) -> Result<Box<dyn WorkerProcess>, WorkerError> {
        Ok(Box::new(StubWorker {
            behavior: self.behavior.clone(),
            terminated: Arc::clone(&self.termination_requested),
            killed: Arc::clone(&self.force_killed),
        }))
    }
}

pub struct StubWorker {
    behavior: StubBehavior,
    terminated: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl WorkerProcess for StubWorker {
    async fn recv_report(&mut self) -> std::io::Result<Option<WorkerReport>> {
        match &self.behavior {
            StubBehavior::Succeed { payload, delay } => {
                tokio::time::sleep(*delay).await;
                Ok(Some(WorkerReport::completed(payload.clone())))
            }
            StubBehavior::Fail { message } => Ok(Some(WorkerReport::failed(
                message.clone(),
                Some("stub diagnostic".to_string()),
            ))),
            StubBehavior::Crash { .. } => Ok(None),
            StubBehavior::Hang { .. } => std::future::pending().await,
        }
    }

    fn request_termination(&mut self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    async fn force_kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    async fn wait(&mut self, limit: Duration) -> Option<i32> {
        match &self.behavior {
            StubBehavior::Succeed { .. } | StubBehavior::Fail { .. } => Some(0),
            StubBehavior::Crash { exit_code } => Some(*exit_code),
            StubBehavior::Hang { obeys_termination } => {
                if self.killed.load(Ordering::SeqCst) {
                    return Some(-1);
                }
                if *obeys_termination && self.terminated.load(Ordering::SeqCst) {
                    return Some(143);
                }
                tokio::time::sleep(limit).await;
                if self.killed.load(Ordering::SeqCst) {
                    Some(-1)
                } else if *obeys_termination && self.terminated.load(Ordering::SeqCst) {
                    Some(143)
                } else {
                    None
                }
            }
        }
    }

    async fn stderr_tail(&mut self) -> String {
        match &self.behavior {
            StubBehavior::Crash { .. } => "stub stderr".to_string(),
            _ => String::new(),
        }
    }

    fn pid(&self) -> Option<u32> {
        None
    }
}

// ---------------------------------------------------------------------------
// Engine and app construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` rooted at the given artifact directory.
pub fn test_config(artifact_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_concurrent_jobs: 2,
        job_timeout_secs: 5,
        retention_hours: 24,
        artifact_dir: artifact_dir.to_path_buf(),
        max_upload_bytes: 10 * 1024 * 1024,
        worker_command: "iva-worker".to_string(),
        llm_models: vec!["gpt-4.1".to_string()],
        pid_file: artifact_dir.join("test.pid"),
    }
}

/// Build an engine wired to the given launcher.
///
/// The returned engine is a cheap handle; clones share the same
/// registry, gate, and worker table.
pub fn build_engine(
    launcher: Arc<dyn WorkerLauncher>,
    capacity: usize,
    job_timeout: Duration,
) -> AnalysisEngine {
    AnalysisEngine::new(
        Arc::new(JobRegistry::new()),
        Arc::new(ConcurrencyGate::new(capacity)),
        launcher,
        Arc::new(WorkerTable::new()),
        job_timeout,
    )
}

/// Build the application router with the same middleware stack that
/// production uses (CORS, request ID, timeout, tracing, panic recovery).
pub fn build_test_app(config: ServerConfig, engine: AnalysisEngine) -> Router {
    use axum::extract::DefaultBodyLimit;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{HeaderName, Method};
    use tower_http::catch_panic::CatchPanicLayer;
    use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
    use tower_http::timeout::TimeoutLayer;
    use tower_http::trace::TraceLayer;

    let max_upload = config.max_upload_bytes as usize + 1024;
    let request_timeout = config.request_timeout_secs;
    let state = AppState {
        config: Arc::new(config),
        engine: Arc::new(engine),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout),
        ))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Issue a GET request against the app.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("build request"),
    )
    .await
    .expect("request")
}

/// Issue a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request"),
    )
    .await
    .expect("request")
}

/// Issue a multipart POST uploading `bytes` as the `file` field.
pub async fn post_file(app: Router, uri: &str, file_name: &str, bytes: &[u8]) -> Response<Body> {
    let boundary = "iva-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("build request"),
    )
    .await
    .expect("request")
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}
