//! Periodic cleanup of expired artifacts.
//!
//! Spawns a background task that deletes uploaded videos and serialized
//! result files older than the configured retention window, measured
//! from their modification time. Runs once immediately at startup, then
//! on a fixed interval. Per-file failures are logged by the scan and
//! never abort the sweep or the service.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use iva_core::retention::sweep_older_than;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the artifact retention loop.
///
/// Deletes files in `artifact_dir` older than `retention`. The first
/// sweep happens immediately (the interval's initial tick); the loop
/// runs until `cancel` is triggered.
pub async fn run(artifact_dir: PathBuf, retention: Duration, cancel: CancellationToken) {
    tracing::info!(
        dir = %artifact_dir.display(),
        retention_secs = retention.as_secs(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Artifact retention sweeper started",
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Artifact retention sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = SystemTime::now() - retention;
                let dir = artifact_dir.clone();
                // The scan does blocking filesystem work; keep it off
                // the event loop.
                match tokio::task::spawn_blocking(move || sweep_older_than(&dir, cutoff)).await {
                    Ok(stats) => {
                        if stats.deleted > 0 {
                            tracing::info!(
                                deleted = stats.deleted,
                                bytes = stats.bytes_reclaimed,
                                "Artifact retention: purged expired files",
                            );
                        } else {
                            tracing::debug!(
                                scanned = stats.scanned,
                                "Artifact retention: nothing to purge",
                            );
                        }
                        if stats.failed > 0 {
                            tracing::warn!(
                                failed = stats.failed,
                                "Artifact retention: some files could not be removed",
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Artifact retention: sweep task failed");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweeps_immediately_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let expired = dir.path().join("old.mp4");
        std::fs::write(&expired, b"stale").unwrap();
        // Make sure the file's mtime is strictly before the sweep cutoff.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            dir.path().to_path_buf(),
            // Zero retention: every existing file is already expired.
            Duration::from_secs(0),
            cancel.clone(),
        ));

        // The first interval tick fires immediately; give it a moment.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!expired.exists(), "startup sweep should remove expired file");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn retains_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.mp4");
        std::fs::write(&fresh, b"new").unwrap();

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            dir.path().to_path_buf(),
            Duration::from_secs(24 * 3600),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(fresh.exists());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop on cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            dir.path().to_path_buf(),
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit promptly after cancel")
            .unwrap();
    }
}
