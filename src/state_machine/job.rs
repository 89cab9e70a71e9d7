use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::JobStatus;

/// Preset used when a request does not name one.
pub const DEFAULT_PRESET: &str = "ultra_fast";

/// Who asked for the audio. Every job has exactly one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Requester {
    User(String),
    Guest(String),
}

impl Requester {
    pub fn id(&self) -> &str {
        match self {
            Requester::User(id) | Requester::Guest(id) => id,
        }
    }

    /// The `user_type` string understood by the remote TTS service.
    pub fn kind(&self) -> &'static str {
        match self {
            Requester::User(_) => "user",
            Requester::Guest(_) => "guest",
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Requester::Guest(_))
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Immutable synthesis parameters. Opaque to the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisInput {
    pub text: String,
    pub language: String,
    pub voice: String,
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}

impl SynthesisInput {
    pub fn new(text: impl Into<String>, language: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            voice: voice.into(),
            preset: default_preset(),
        }
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

/// Audio produced by a successful synthesis, plus its metadata.
///
/// Every field has a default so partial responses from a remote service
/// still decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOutput {
    pub audio_path: String,
    pub file_url: String,
    pub delete_url: String,
    pub audio_name: String,
    /// Size in bytes.
    pub audio_size: u64,
    /// Duration in seconds.
    pub audio_duration: f64,
    /// Wall-clock seconds the resource spent generating.
    pub generation_time: f64,
    pub mime_type: String,
    pub sample_rate: u32,
    pub language: String,
    pub preset: String,
    pub text_length: usize,
    pub voice_name: String,
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The resource does not know a referenced entity. Never retried.
    NotFound,
    /// The resource rejected the request as permanently invalid.
    Rejected,
    /// Every allowed attempt failed transiently.
    Exhausted,
    /// The serialized worker was shut down before serving the request.
    WorkerUnavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::Exhausted => write!(f, "retries exhausted"),
            FailureKind::WorkerUnavailable => write!(f, "worker unavailable"),
        }
    }
}

/// Failure details kept on a `Failed` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Last error reported by the synthesis side.
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

/// Bounded retry policy applied by the retry executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    pub backoff: Backoff,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            backoff: Backoff::Exponential,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms: delay_ms,
            backoff: Backoff::Fixed,
            max_delay_ms: delay_ms,
        }
    }

    /// `max_attempts` clamped to at least one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// Exponential: delay = base_delay_ms * 2^(attempt - 1), capped at
    /// `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential => {
                let factor = 2u64
                    .checked_pow(attempt.saturating_sub(1))
                    .unwrap_or(u64::MAX);
                self.base_delay_ms.saturating_mul(factor)
            }
        };
        Duration::from_millis(ms.min(self.max_delay_ms.max(self.base_delay_ms)))
    }
}

/// One synthesis request and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub owner: Requester,
    pub input: SynthesisInput,
    pub status: JobStatus,
    /// Present only when `status` is `Ready`.
    pub result: Option<SynthesisOutput>,
    /// Present only when `status` is `Failed`.
    pub failure: Option<JobFailure>,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(owner: Requester, input: SynthesisInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            input,
            status: JobStatus::Created,
            result: None,
            failure: None,
            attempt_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_creation_defaults() {
        let job = Job::new(
            Requester::Guest("abc".into()),
            SynthesisInput::new("Xin chào", "vi", "narrator-vi"),
        );
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.attempt_count, 0);
        assert!(job.result.is_none());
        assert!(job.failure.is_none());
        assert_eq!(job.input.preset, DEFAULT_PRESET);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn job_ids_are_unique() {
        let input = SynthesisInput::new("hi", "en", "narrator-en");
        let a = Job::new(Requester::User("1".into()), input.clone());
        let b = Job::new(Requester::User("1".into()), input);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn retry_policy_exponential_backoff() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay_ms: 1000,
            backoff: Backoff::Exponential,
            max_delay_ms: 5000,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(90), Duration::from_millis(5000));
    }

    #[test]
    fn retry_policy_fixed_backoff() {
        let policy = RetryPolicy::fixed(500, 1000);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(499), Duration::from_millis(1000));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let policy = RetryPolicy::fixed(0, 10);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn requester_reports_remote_user_type() {
        assert_eq!(Requester::User("7".into()).kind(), "user");
        assert_eq!(Requester::Guest("g1".into()).kind(), "guest");
        assert_eq!(Requester::Guest("g1".into()).to_string(), "guest:g1");
    }

    #[test]
    fn requester_serializes_tagged() {
        let json = serde_json::to_string(&Requester::User("7".into())).unwrap();
        assert_eq!(json, r#"{"type":"user","id":"7"}"#);
    }

    #[test]
    fn partial_output_decodes_with_defaults() {
        let out: SynthesisOutput =
            serde_json::from_str(r#"{"audio_path":"out/a.wav","sample_rate":24000}"#).unwrap();
        assert_eq!(out.audio_path, "out/a.wav");
        assert_eq!(out.sample_rate, 24000);
        assert_eq!(out.audio_size, 0);
        assert!(out.mime_type.is_empty());
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = Job::new(
            Requester::User("1".into()),
            SynthesisInput::new("Serialize me", "en", "narrator-en"),
        );
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
