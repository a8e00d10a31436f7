//! In-memory job registry.
//!
//! The only state shared across concurrent handlers. Locking is
//! two-level: the outer map lock is held just long enough to look up or
//! insert a record slot, and each record carries its own lock, so
//! writers to different jobs never contend on a record lock. Records are
//! never removed; retention applies to on-disk artifacts, not registry
//! entries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use iva_core::error::CoreError;
use iva_core::job::{JobRecord, JobStatus};

type RecordSlot = Arc<RwLock<JobRecord>>;

/// Registry of all jobs submitted during this process's lifetime.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, RecordSlot>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh `pending` record and return its id.
    pub async fn create(&self, device_type: &str, input_path: PathBuf) -> Uuid {
        let id = Uuid::new_v4();
        let record = JobRecord::new(id, device_type, input_path);
        self.jobs
            .write()
            .await
            .insert(id, Arc::new(RwLock::new(record)));
        id
    }

    /// Snapshot a record by id.
    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        let slot = self.jobs.read().await.get(&id).cloned()?;
        let record = slot.read().await;
        Some(record.clone())
    }

    /// Mutate a single record under its own lock.
    ///
    /// The closure's return value is passed through, so callers can
    /// surface transition errors from inside the critical section.
    pub async fn update<F, R>(&self, id: Uuid, f: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut JobRecord) -> R,
    {
        let slot = self
            .jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::JobNotFound(id))?;
        let mut record = slot.write().await;
        Ok(f(&mut record))
    }

    /// Number of records ever created.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Count records per status, for the stats endpoint.
    pub async fn status_counts(&self) -> HashMap<JobStatus, usize> {
        let slots: Vec<RecordSlot> = self.jobs.read().await.values().cloned().collect();
        let mut counts = HashMap::new();
        for slot in slots {
            let status = slot.read().await.status;
            *counts.entry(status).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
