//! Configuration loaded from `narrator.toml`.
//!
//! [`NarratorConfig`] holds every tunable. Keys missing from the file take
//! sensible defaults, and `TTS_API_URL` in the environment takes precedence
//! over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::precondition::Voice;
use crate::state_machine::{Backoff, DEFAULT_PRESET, RetryPolicy};
use crate::synthesis::SimulatedResource;
use crate::worker::WorkerConfig;

pub const CONFIG_FILE: &str = "narrator.toml";

const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;
const MAX_RETRY_DELAY_MS: u64 = 3_600_000;
const MAX_WORKER_LATENCY_MS: u64 = 600_000;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Base URL of the remote TTS service.
    pub tts_api_url: String,

    /// Per-request timeout for the remote service, in seconds.
    pub request_timeout_secs: u64,

    /// Preset used when a request does not name one.
    pub preset: String,

    /// Total synthesis attempts per job, first attempt included.
    pub max_attempts: u32,

    /// Base delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,

    pub backoff: Backoff,

    /// Cap on a single backoff delay, in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Maximum queued requests on the local worker. Absent means unbounded.
    pub queue_capacity: Option<usize>,

    /// Per-call latency of the simulated local model, in milliseconds.
    pub worker_latency_ms: u64,

    /// Directory holding one JSON file per job.
    pub store_dir: PathBuf,

    /// Where the local model places generated audio.
    pub output_dir: PathBuf,

    /// Voice catalogue consulted at job creation.
    pub voices: Vec<Voice>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            tts_api_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            preset: DEFAULT_PRESET.to_string(),
            max_attempts: 5,
            retry_delay_ms: 1000,
            backoff: Backoff::Exponential,
            max_retry_delay_ms: 30_000,
            queue_capacity: Some(64),
            worker_latency_ms: 250,
            store_dir: PathBuf::from(".narrator/jobs"),
            output_dir: PathBuf::from("output"),
            voices: vec![
                Voice::default_for("narrator-en", "en"),
                Voice::default_for("narrator-vi", "vi"),
            ],
        }
    }
}

impl NarratorConfig {
    /// Load `narrator.toml` from the current directory, or `path` if given.
    /// Falls back to defaults when the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<NarratorConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_tts_url_override(std::env::var("TTS_API_URL").ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_tts_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value
            && !url.is_empty()
        {
            self.tts_api_url = url;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_attempts >= 1, "max_attempts must be at least 1");
        anyhow::ensure!(
            self.queue_capacity != Some(0),
            "queue_capacity must be positive when set"
        );
        anyhow::ensure!(
            (1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs),
            "request_timeout_secs must be between 1 and {MAX_REQUEST_TIMEOUT_SECS}"
        );
        anyhow::ensure!(
            self.retry_delay_ms <= MAX_RETRY_DELAY_MS && self.max_retry_delay_ms <= MAX_RETRY_DELAY_MS,
            "retry delays must not exceed {MAX_RETRY_DELAY_MS} ms"
        );
        anyhow::ensure!(
            self.worker_latency_ms <= MAX_WORKER_LATENCY_MS,
            "worker_latency_ms must not exceed {MAX_WORKER_LATENCY_MS}"
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.retry_delay_ms,
            backoff: self.backoff,
            max_delay_ms: self.max_retry_delay_ms,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            queue_capacity: self.queue_capacity,
            ..WorkerConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_latency(&self) -> Duration {
        Duration::from_millis(self.worker_latency_ms)
    }

    /// Upper bound on how long one job may take under the retry policy.
    /// Saturates instead of overflowing.
    pub fn job_deadline(&self) -> Duration {
        let per_attempt = self
            .request_timeout()
            .saturating_add(self.worker_latency())
            .saturating_add(Duration::from_millis(self.max_retry_delay_ms));
        per_attempt.saturating_mul(self.max_attempts.max(1))
    }

    /// Simulated local model with the configured voices loaded.
    pub fn local_resource(&self) -> SimulatedResource {
        SimulatedResource::new(self.worker_latency())
            .with_voices(self.voices.iter().map(|v| v.name.clone()))
            .with_output_dir(self.output_dir.clone())
    }
}
