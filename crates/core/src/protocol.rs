//! Wire protocol between the orchestrator and worker processes.
//!
//! The orchestrator writes one [`AnalysisRequest`] JSON document to the
//! worker's stdin. The worker writes exactly one [`WorkerReport`] JSON
//! line to its stdout before exiting. That single line is the only
//! result channel; everything on stderr is diagnostics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Parameters handed to a worker process for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub job_id: Uuid,
    pub device_type: String,
    pub video_path: PathBuf,
    /// Vision/LLM models to run, in voting order.
    pub llm_models: Vec<String>,
    #[serde(default)]
    pub save_individual_report: bool,
}

/// The single terminal message a worker emits before exiting.
///
/// Either `{"success": true, "payload": ...}` or
/// `{"success": false, "error": ..., "diagnostic": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backtrace or other failure context, never shown to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Failure half of a decoded [`WorkerReport`].
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub message: String,
    pub diagnostic: Option<String>,
}

impl WorkerReport {
    pub fn completed(payload: Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            diagnostic: None,
        }
    }

    pub fn failed(error: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            diagnostic,
        }
    }

    /// Decode the report into a success payload or a failure.
    ///
    /// A report claiming success without a payload is treated as a
    /// failure rather than surfacing an empty result to clients.
    pub fn into_outcome(self) -> Result<Value, WorkerFailure> {
        if self.success {
            match self.payload {
                Some(payload) => Ok(payload),
                None => Err(WorkerFailure {
                    message: "Worker reported success without a payload".to_string(),
                    diagnostic: self.diagnostic,
                }),
            }
        } else {
            Err(WorkerFailure {
                message: self
                    .error
                    .unwrap_or_else(|| "Worker reported an unspecified failure".to_string()),
                diagnostic: self.diagnostic,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_report_round_trips() {
        let report = WorkerReport::completed(serde_json::json!({"score": 75.0}));
        let line = serde_json::to_string(&report).unwrap();
        let back: WorkerReport = serde_json::from_str(&line).unwrap();
        assert!(back.success);
        assert_eq!(back.into_outcome().unwrap()["score"], 75.0);
    }

    #[test]
    fn failure_report_round_trips() {
        let report = WorkerReport::failed("model quota exceeded", Some("trace...".into()));
        let line = serde_json::to_string(&report).unwrap();
        let back: WorkerReport = serde_json::from_str(&line).unwrap();
        let failure = back.into_outcome().unwrap_err();
        assert_eq!(failure.message, "model quota exceeded");
        assert_eq!(failure.diagnostic.as_deref(), Some("trace..."));
    }

    #[test]
    fn success_without_payload_is_failure() {
        let report: WorkerReport = serde_json::from_str(r#"{"success": true}"#).unwrap();
        let failure = report.into_outcome().unwrap_err();
        assert!(failure.message.contains("without a payload"));
    }

    #[test]
    fn failure_without_message_gets_default() {
        let report: WorkerReport = serde_json::from_str(r#"{"success": false}"#).unwrap();
        let failure = report.into_outcome().unwrap_err();
        assert!(failure.message.contains("unspecified"));
    }

    #[test]
    fn request_round_trips() {
        let req = AnalysisRequest {
            job_id: Uuid::new_v4(),
            device_type: "DPI".to_string(),
            video_path: PathBuf::from("/data/uploads/abc.mp4"),
            llm_models: vec!["gpt-4.1".to_string(), "gemini-2.5-pro".to_string()],
            save_individual_report: true,
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: AnalysisRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, req.job_id);
        assert_eq!(back.llm_models.len(), 2);
        assert!(back.save_individual_report);
    }

    #[test]
    fn request_save_flag_defaults_false() {
        let json = format!(
            r#"{{"job_id":"{}","device_type":"pMDI","video_path":"/v.mp4","llm_models":[]}}"#,
            Uuid::new_v4()
        );
        let back: AnalysisRequest = serde_json::from_str(&json).unwrap();
        assert!(!back.save_individual_report);
    }
}
