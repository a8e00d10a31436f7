use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Analysis job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Analysis job {0} has not completed yet")]
    JobNotReady(Uuid),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
