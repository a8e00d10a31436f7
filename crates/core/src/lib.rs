//! Domain logic for the inhaler video analysis service.
//!
//! Pure types and functions shared by the API server and the worker
//! binary: job records and their status state machine, the wire protocol
//! spoken between orchestrator and worker processes, submission
//! validation, and artifact retention scanning. Zero internal
//! dependencies by design.

pub mod error;
pub mod job;
pub mod protocol;
pub mod retention;
pub mod submission;
