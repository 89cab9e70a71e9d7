pub mod client;
pub mod error;
pub mod resource;
pub mod types;

use async_trait::async_trait;

use crate::state_machine::{Requester, SynthesisInput, SynthesisOutput};

pub use client::HttpSynthesizer;
pub use error::{SynthesisError, SynthesisErrorKind};
pub use resource::{SimulatedResource, SynthesisResource};
pub use types::{GenerateAudioRequest, GenerateAudioResponse};

/// Everything a backend needs to synthesize one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisTask {
    pub job_id: String,
    pub owner: Requester,
    pub input: SynthesisInput,
}

/// Where the retry executor sends each attempt: a remote service
/// ([`HttpSynthesizer`]) or the local serialized worker
/// ([`WorkerHandle`](crate::worker::WorkerHandle)).
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, task: &SynthesisTask) -> Result<SynthesisOutput, SynthesisError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{SynthesisBackend, SynthesisError, SynthesisTask};
    use crate::state_machine::SynthesisOutput;

    /// Replays canned outcomes in order, then repeats `fallback` forever.
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<SynthesisOutput, SynthesisError>>>,
        fallback: Result<SynthesisOutput, SynthesisError>,
        latency: Duration,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        pub(crate) fn new(
            script: Vec<Result<SynthesisOutput, SynthesisError>>,
            fallback: Result<SynthesisOutput, SynthesisError>,
        ) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                latency: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }

        pub(crate) fn always(outcome: Result<SynthesisOutput, SynthesisError>) -> Self {
            Self::new(Vec::new(), outcome)
        }

        pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub(crate) fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub(crate) fn output(name: &str) -> SynthesisOutput {
        SynthesisOutput {
            audio_name: name.to_string(),
            audio_path: format!("output/{name}"),
            mime_type: "audio/wav".into(),
            sample_rate: 24_000,
            ..Default::default()
        }
    }

    #[async_trait]
    impl SynthesisBackend for ScriptedBackend {
        async fn synthesize(
            &self,
            _task: &SynthesisTask,
        ) -> Result<SynthesisOutput, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }
}
