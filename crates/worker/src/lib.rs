//! Worker-side execution of one analysis job.
//!
//! The worker binary is launched by the orchestrator with a JSON
//! [`iva_core::protocol::AnalysisRequest`] on stdin. It runs the
//! analysis through an [`adapter::AnalysisAdapter`] and writes exactly
//! one [`iva_core::protocol::WorkerReport`] line to stdout before
//! exiting. Each worker owns an isolated address space; sibling workers
//! share no mutable state.

pub mod adapter;
