//! Job orchestration and process-isolation engine.
//!
//! Control flow for one job: the submit handler creates a `pending`
//! registry record and spawns a runner task. The runner waits for a
//! [`gate::ConcurrencyGate`] slot, launches an isolated worker process,
//! drains the worker's result channel *before* waiting for process exit
//! (see [`runner`] for why that order matters), escalates termination on
//! timeout, and records the terminal state. [`singleton`] guarantees one
//! orchestrator instance owns the service at a time.

pub mod gate;
pub mod registry;
pub mod runner;
pub mod signals;
pub mod singleton;
pub mod tracker;
pub mod worker;
