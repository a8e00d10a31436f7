//! Live worker process table.
//!
//! Tracks the pid of every running worker so the shutdown path can
//! terminate children whose `Child` handles are owned by job tasks.
//! Escalation mirrors the per-job path: graceful signal, bounded grace,
//! then force-kill.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use super::signals;

/// How long shutdown waits for workers after the graceful signal.
const SHUTDOWN_TERM_GRACE: Duration = Duration::from_secs(5);

/// How long shutdown waits after force-killing survivors.
const SHUTDOWN_KILL_GRACE: Duration = Duration::from_secs(1);

/// Poll interval while waiting for signalled workers to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Table of live worker pids keyed by job id.
#[derive(Default)]
pub struct WorkerTable {
    pids: Mutex<HashMap<Uuid, u32>>,
}

impl WorkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: Uuid, pid: u32) {
        self.pids.lock().expect("worker table poisoned").insert(job_id, pid);
    }

    pub fn remove(&self, job_id: Uuid) {
        self.pids.lock().expect("worker table poisoned").remove(&job_id);
    }

    pub fn len(&self) -> usize {
        self.pids.lock().expect("worker table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate every tracked worker: SIGTERM all, wait up to the grace
    /// period, SIGKILL survivors, wait again. Called from the shutdown
    /// sequence after the HTTP listener has stopped.
    pub async fn shutdown_all(&self) {
        let pids: Vec<u32> = {
            let mut table = self.pids.lock().expect("worker table poisoned");
            table.drain().map(|(_, pid)| pid).collect()
        };
        if pids.is_empty() {
            return;
        }

        tracing::info!(count = pids.len(), "Terminating active worker processes");
        for pid in &pids {
            let _ = signals::send_term(*pid);
        }

        let survivors = wait_until_gone(&pids, SHUTDOWN_TERM_GRACE).await;
        if survivors.is_empty() {
            tracing::info!("All workers exited after graceful signal");
            return;
        }

        tracing::warn!(
            count = survivors.len(),
            "Workers ignored graceful termination; force-killing",
        );
        for pid in &survivors {
            let _ = signals::send_kill(*pid);
        }

        let stubborn = wait_until_gone(&survivors, SHUTDOWN_KILL_GRACE).await;
        if !stubborn.is_empty() {
            tracing::error!(pids = ?stubborn, "Workers survived SIGKILL");
        }
    }
}

/// Poll until all `pids` are gone or `limit` elapses; returns survivors.
async fn wait_until_gone(pids: &[u32], limit: Duration) -> Vec<u32> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let alive: Vec<u32> = pids
            .iter()
            .copied()
            .filter(|pid| signals::is_alive(*pid))
            .collect();
        if alive.is_empty() || tokio::time::Instant::now() >= deadline {
            return alive;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
