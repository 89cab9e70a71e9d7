//! Background text-to-speech jobs.
//!
//! A [`JobOrchestrator`](orchestrator::JobOrchestrator) validates and
//! persists jobs, then drives each one through a
//! [`RetryExecutor`](executor::RetryExecutor) against a synthesis backend:
//! either a remote TTS service or a [`SynthesisWorker`](worker::SynthesisWorker)
//! that serializes every call onto one non-reentrant model.

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod precondition;
pub mod state_machine;
pub mod store;
pub mod synthesis;
pub mod ui;
pub mod worker;
