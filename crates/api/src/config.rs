use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Maximum number of simultaneously running analyses (default: `5`).
    pub max_concurrent_jobs: usize,
    /// Wall-clock budget per analysis in seconds (default: `3600`).
    pub job_timeout_secs: u64,
    /// Artifact retention window in hours (default: `24`).
    pub retention_hours: u64,
    /// Directory holding uploaded videos and serialized results.
    pub artifact_dir: PathBuf,
    /// Maximum accepted upload size in bytes (default: 500 MiB).
    pub max_upload_bytes: u64,
    /// Command line used to launch one worker process.
    pub worker_command: String,
    /// Vision/LLM models passed to every analysis, in voting order.
    pub llm_models: Vec<String>,
    /// Path of the single-instance PID file.
    pub pid_file: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `8000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `MAX_CONCURRENT_JOBS`  | `5`                        |
    /// | `JOB_TIMEOUT_SECS`     | `3600`                     |
    /// | `RETENTION_HOURS`      | `24`                       |
    /// | `ARTIFACT_DIR`         | `uploads`                  |
    /// | `MAX_UPLOAD_MB`        | `500`                      |
    /// | `WORKER_COMMAND`       | `iva-worker`               |
    /// | `LLM_MODELS`           | `gpt-4.1,gpt-4.1`          |
    /// | `PID_FILE`             | `iva-api.pid`              |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_concurrent_jobs: usize = std::env::var("MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("MAX_CONCURRENT_JOBS must be a valid usize");
        assert!(
            max_concurrent_jobs > 0,
            "MAX_CONCURRENT_JOBS must be at least 1"
        );

        let job_timeout_secs: u64 = std::env::var("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("JOB_TIMEOUT_SECS must be a valid u64");

        let retention_hours: u64 = std::env::var("RETENTION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .expect("RETENTION_HOURS must be a valid u64");

        let artifact_dir =
            PathBuf::from(std::env::var("ARTIFACT_DIR").unwrap_or_else(|_| "uploads".into()));

        let max_upload_mb: u64 = std::env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("MAX_UPLOAD_MB must be a valid u64");

        let worker_command =
            std::env::var("WORKER_COMMAND").unwrap_or_else(|_| "iva-worker".into());

        let llm_models: Vec<String> = std::env::var("LLM_MODELS")
            .unwrap_or_else(|_| "gpt-4.1,gpt-4.1".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let pid_file =
            PathBuf::from(std::env::var("PID_FILE").unwrap_or_else(|_| "iva-api.pid".into()));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_concurrent_jobs,
            job_timeout_secs,
            retention_hours,
            artifact_dir,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            worker_command,
            llm_models,
            pid_file,
        }
    }

    /// Warn when the retention window does not comfortably exceed the job
    /// budget. The sweeper deletes by modification time, so a window
    /// shorter than the longest possible run could reclaim the input of
    /// a still-running analysis. Operator responsibility beyond this check.
    pub fn warn_on_risky_retention(&self) {
        if self.retention_hours * 3600 <= self.job_timeout_secs {
            tracing::warn!(
                retention_hours = self.retention_hours,
                job_timeout_secs = self.job_timeout_secs,
                "Retention window does not exceed the job timeout; running jobs may lose artifacts",
            );
        }
    }
}
