mod job;
mod state;

pub use job::{
    Backoff, DEFAULT_PRESET, FailureKind, Job, JobFailure, Requester, RetryPolicy, SynthesisInput,
    SynthesisOutput,
};
pub use state::{InvalidTransition, JobStatus};
