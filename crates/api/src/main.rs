use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iva_api::config::ServerConfig;
use iva_api::engine::gate::ConcurrencyGate;
use iva_api::engine::registry::JobRegistry;
use iva_api::engine::runner::AnalysisEngine;
use iva_api::engine::singleton::SingletonGuard;
use iva_api::engine::tracker::WorkerTable;
use iva_api::engine::worker::{ProcessLauncher, WorkerLauncher};
use iva_api::state::AppState;
use iva_api::{background, routes};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iva_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        max_concurrent_jobs = config.max_concurrent_jobs,
        job_timeout_secs = config.job_timeout_secs,
        retention_hours = config.retention_hours,
        "Loaded server configuration",
    );
    config.warn_on_risky_retention();

    // --- Single-instance ownership ---
    // Must come before anything else touches shared state on disk; two
    // live orchestrators sharing the artifact directory is unsafe.
    let guard = SingletonGuard::acquire(&config.pid_file)
        .await
        .expect("Failed to take single-instance ownership");

    // --- Artifact directory ---
    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .expect("Failed to create artifact directory");

    // --- Orchestration engine ---
    let registry = Arc::new(JobRegistry::new());
    let gate = Arc::new(ConcurrencyGate::new(config.max_concurrent_jobs));
    let launcher: Arc<dyn WorkerLauncher> = Arc::new(ProcessLauncher::new(&config.worker_command));
    let workers = Arc::new(WorkerTable::new());
    let engine = AnalysisEngine::new(
        Arc::clone(&registry),
        Arc::clone(&gate),
        launcher,
        Arc::clone(&workers),
        Duration::from_secs(config.job_timeout_secs),
    );
    tracing::info!("Orchestration engine ready");

    // --- Artifact retention sweeper ---
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_handle = tokio::spawn(background::artifact_retention::run(
        config.artifact_dir.clone(),
        Duration::from_secs(config.retention_hours * 3600),
        sweep_cancel.clone(),
    ));

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        engine: Arc::new(engine),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api).
        .merge(routes::health::router())
        // API routes.
        .nest("/api", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Allow video uploads past the default 2 MB body cap; the
        // upload handler enforces the real limit mid-stream.
        .layer(DefaultBodyLimit::max(config.max_upload_bytes as usize + 1024))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // --- Post-shutdown cleanup ---
    // Runs for graceful shutdown and top-level server failure alike.
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the retention sweeper.
    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;
    tracing::info!("Artifact retention sweeper stopped");

    // Drain worker processes before giving up service ownership.
    workers.shutdown_all().await;

    guard.release();

    if let Err(e) = serve_result {
        tracing::error!(error = %e, "Server terminated with an error");
        std::process::exit(1);
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles SIGINT (Ctrl-C), SIGTERM, and SIGHUP so the server shuts
/// down cleanly whether stopped interactively, by a process manager
/// (e.g. systemd, Docker, Kubernetes), or by a closing terminal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(unix)]
    let hangup = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .expect("Failed to install SIGHUP handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = hangup => {
            tracing::info!("Received SIGHUP, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
