//! Job records and the status state machine.
//!
//! A [`JobRecord`] is the single source of truth for one submitted
//! analysis, from submission to terminal state. Status transitions are
//! monotonic: `pending -> processing -> {completed | error}`. Terminal
//! states are absorbing; retrying the same video means submitting a new
//! job with a fresh id.

use std::path::PathBuf;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

/// Lifecycle state of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for a concurrency slot.
    Pending,
    /// Admitted; a worker process is running the analysis.
    Processing,
    /// Finished successfully; `result` is populated.
    Completed,
    /// Finished unsuccessfully; `error` is populated.
    Error,
}

impl JobStatus {
    /// Whether this status is absorbing (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether the `self -> next` transition is allowed.
    ///
    /// The only legal sequences are `pending -> processing -> completed`
    /// and `pending -> processing -> error`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory record for one submitted analysis job.
///
/// Mutated only by the job's own scheduling task; readers receive
/// snapshot clones from the registry.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub status: JobStatus,
    /// Coarse completion percentage, 0-100.
    pub progress: u8,
    /// Human-readable description of the current phase.
    pub current_stage: String,
    /// Append-only, timestamped progress log shown to the client.
    pub logs: Vec<String>,
    /// Failure description, set iff `status == Error`.
    pub error: Option<String>,
    /// Client-facing result payload, set iff `status == Completed`.
    pub result: Option<Value>,
    /// Superset payload kept for export/download.
    pub raw_result: Option<Value>,
    pub device_type: String,
    pub input_path: PathBuf,
}

impl JobRecord {
    /// Create a fresh `pending` record.
    pub fn new(id: Uuid, device_type: impl Into<String>, input_path: PathBuf) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            current_stage: "Queued".to_string(),
            logs: Vec::new(),
            error: None,
            result: None,
            raw_result: None,
            device_type: device_type.into(),
            input_path,
        }
    }

    /// Move the record to `next`, enforcing the transition table.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Internal(format!(
                "Illegal job status transition: {} -> {next}",
                self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Append a `[HH:MM:SS] message` line to the progress log.
    pub fn push_log(&mut self, message: impl AsRef<str>) {
        self.logs.push(format!(
            "[{}] {}",
            Local::now().format("%H:%M:%S"),
            message.as_ref()
        ));
    }

    /// Mark the job completed with its result payloads.
    pub fn complete(&mut self, result: Value, raw_result: Value) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.current_stage = "Analysis complete".to_string();
        self.result = Some(result);
        self.raw_result = Some(raw_result);
        Ok(())
    }

    /// Mark the job failed with a descriptive message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Error)?;
        let message = message.into();
        self.current_stage = "Analysis failed".to_string();
        self.error = Some(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(Uuid::new_v4(), "pMDI", PathBuf::from("/tmp/video.mp4"))
    }

    #[test]
    fn new_record_is_pending() {
        let rec = record();
        assert_eq!(rec.status, JobStatus::Pending);
        assert_eq!(rec.progress, 0);
        assert!(rec.result.is_none());
        assert!(rec.error.is_none());
    }

    #[test]
    fn legal_transition_chain_completed() {
        let mut rec = record();
        rec.transition(JobStatus::Processing).unwrap();
        rec.complete(serde_json::json!({"score": 80}), serde_json::json!({}))
            .unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.progress, 100);
        assert!(rec.result.is_some());
    }

    #[test]
    fn legal_transition_chain_error() {
        let mut rec = record();
        rec.transition(JobStatus::Processing).unwrap();
        rec.fail("analysis blew up").unwrap();
        assert_eq!(rec.status, JobStatus::Error);
        assert_eq!(rec.error.as_deref(), Some("analysis blew up"));
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let mut rec = record();
        assert!(rec.complete(serde_json::json!({}), serde_json::json!({})).is_err());
        assert_eq!(rec.status, JobStatus::Pending);
    }

    #[test]
    fn pending_cannot_fail_directly() {
        let mut rec = record();
        assert!(rec.fail("nope").is_err());
        assert_eq!(rec.status, JobStatus::Pending);
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut rec = record();
        rec.transition(JobStatus::Processing).unwrap();
        rec.transition(JobStatus::Completed).unwrap();
        assert!(rec.transition(JobStatus::Processing).is_err());
        assert!(rec.transition(JobStatus::Error).is_err());
        assert!(rec.transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn no_backwards_transition() {
        let mut rec = record();
        rec.transition(JobStatus::Processing).unwrap();
        assert!(rec.transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn push_log_appends_timestamped_lines() {
        let mut rec = record();
        rec.push_log("first");
        rec.push_log("second");
        assert_eq!(rec.logs.len(), 2);
        assert!(rec.logs[0].ends_with("first"));
        assert!(rec.logs[0].starts_with('['));
        assert!(rec.logs[1].ends_with("second"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
