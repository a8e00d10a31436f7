//! Single-instance ownership via PID file.
//!
//! Exactly one orchestrator may own the service at a time: two live
//! instances sharing the artifact directory and worker fleet would be
//! unsafe. At startup the new instance preempts any live previous
//! holder (graceful signal, bounded wait, force-kill), then writes its
//! own pid. On shutdown the file is removed only if it still names this
//! process.
//!
//! The check-then-signal protocol is racy if the OS recycles the old
//! pid between the liveness probe and the kill; accepted here because
//! the externally observable contract (old instance preempted, new
//! instance takes ownership) has to be preserved as-is.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::signals;

/// Wait after asking the previous instance to terminate.
const PREEMPT_TERM_GRACE: Duration = Duration::from_secs(3);

/// Wait after force-killing the previous instance.
const PREEMPT_KILL_GRACE: Duration = Duration::from_secs(1);

/// Poll interval while waiting for the previous instance to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum SingletonError {
    #[error("Previous instance (pid {pid}) could not be terminated")]
    PreemptFailed { pid: u32 },

    #[error("Failed to write PID file {path}: {source}")]
    WritePidFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ownership of the service's well-known PID file.
pub struct SingletonGuard {
    pid_file: PathBuf,
    pid: u32,
}

impl SingletonGuard {
    /// Take ownership, preempting any live previous instance.
    ///
    /// Failure here is fatal for the caller: without ownership, a second
    /// live orchestrator could be running.
    pub async fn acquire(pid_file: impl Into<PathBuf>) -> Result<Self, SingletonError> {
        let pid_file = pid_file.into();
        let pid = std::process::id();

        if let Some(old_pid) = read_pid(&pid_file) {
            if old_pid != pid && signals::is_alive(old_pid) {
                preempt(old_pid).await?;
            }
            // Stale or just-terminated holder; clear the file.
            let _ = fs::remove_file(&pid_file);
        }

        fs::write(&pid_file, pid.to_string()).map_err(|source| SingletonError::WritePidFile {
            path: pid_file.clone(),
            source,
        })?;
        tracing::info!(pid, file = %pid_file.display(), "Instance owns the service");

        Ok(Self { pid_file, pid })
    }

    /// Remove the PID file if it still names this process.
    pub fn release(&self) {
        match read_pid(&self.pid_file) {
            Some(pid) if pid == self.pid => {
                if let Err(e) = fs::remove_file(&self.pid_file) {
                    tracing::warn!(file = %self.pid_file.display(), error = %e, "Failed to remove PID file");
                } else {
                    tracing::info!(file = %self.pid_file.display(), "PID file removed");
                }
            }
            Some(other) => {
                tracing::warn!(
                    other,
                    "PID file now names another instance; leaving it in place",
                );
            }
            None => {}
        }
    }

    pub fn path(&self) -> &Path {
        &self.pid_file
    }
}

/// Terminate the previous holder: graceful signal, bounded wait,
/// force-kill, bounded wait.
async fn preempt(old_pid: u32) -> Result<(), SingletonError> {
    tracing::info!(old_pid, "Terminating previous instance");
    let _ = signals::send_term(old_pid);
    if wait_for_exit(old_pid, PREEMPT_TERM_GRACE).await {
        tracing::info!(old_pid, "Previous instance exited");
        return Ok(());
    }

    tracing::warn!(old_pid, "Previous instance ignored graceful signal; force-killing");
    let _ = signals::send_kill(old_pid);
    if wait_for_exit(old_pid, PREEMPT_KILL_GRACE).await {
        return Ok(());
    }

    Err(SingletonError::PreemptFailed { pid: old_pid })
}

/// Poll until `pid` is gone or `limit` elapses.
async fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if !signals::is_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Parse the pid named by the file, if any.
fn read_pid(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;
    contents.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
