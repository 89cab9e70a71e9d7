use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::SynthesisError;
use super::types::{GenerateAudioRequest, GenerateAudioResponse};
use super::{SynthesisBackend, SynthesisTask};
use crate::state_machine::SynthesisOutput;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls a remote TTS service directly over HTTP.
///
/// The remote service does its own serialization, so this backend needs no
/// local worker.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpSynthesizer {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/generate_audio", self.base_url)
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesizer {
    async fn synthesize(&self, task: &SynthesisTask) -> Result<SynthesisOutput, SynthesisError> {
        let body = GenerateAudioRequest::from(task);
        debug!(job_id = %task.job_id, url = %self.endpoint(), "posting synthesis request");

        let response = self.client.post(self.endpoint()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SynthesisError::from_status(status.as_u16(), message));
        }

        let body = response.json::<GenerateAudioResponse>().await?;
        Ok(body.output)
    }
}
