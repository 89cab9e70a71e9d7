use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{NarratorError, PreconditionError};
use crate::executor::{ExecutionOutcome, RetryExecutor};
use crate::precondition::PreconditionChecker;
use crate::state_machine::{DEFAULT_PRESET, Job, JobStatus, Requester, SynthesisInput};
use crate::store::JobStore;
use crate::synthesis::{SynthesisBackend, SynthesisTask};

/// Caller-supplied parameters for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobRequest {
    pub owner: Requester,
    pub text: String,
    pub language: String,
    /// Falls back to the default voice for `language` when absent.
    pub voice: Option<String>,
    pub preset: Option<String>,
}

impl CreateJobRequest {
    /// Request for `text` in `language`, using the language's default voice
    /// and the orchestrator's default preset.
    pub fn new(owner: Requester, text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            owner,
            text: text.into(),
            language: language.into(),
            voice: None,
            preset: None,
        }
    }

    /// Use a specific voice instead of the language default.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Override the orchestrator's default preset for this job.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }
}

/// Owns job records and drives each one through its lifecycle.
///
/// Every status write for a job happens either in `create_job` (the initial
/// `Created` record) or in the single background task spawned for that job.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    checker: Arc<dyn PreconditionChecker>,
    backend: Arc<dyn SynthesisBackend>,
    executor: RetryExecutor,
    default_preset: String,
}

impl JobOrchestrator {
    /// Wire an orchestrator to its store, precondition checker, synthesis
    /// backend and retry policy. Jobs get the `ultra_fast` preset unless
    /// configured otherwise.
    pub fn new(
        store: Arc<dyn JobStore>,
        checker: Arc<dyn PreconditionChecker>,
        backend: Arc<dyn SynthesisBackend>,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            store,
            checker,
            backend,
            executor,
            default_preset: DEFAULT_PRESET.to_string(),
        }
    }

    /// Preset applied to requests that do not name one.
    pub fn with_default_preset(mut self, preset: impl Into<String>) -> Self {
        self.default_preset = preset.into();
        self
    }

    /// Validate, persist a `Created` job and schedule its execution.
    ///
    /// Returns as soon as the record is stored. Must be called from within a
    /// Tokio runtime.
    pub fn create_job(&self, request: CreateJobRequest) -> Result<Job, NarratorError> {
        let input = self.validate(&request)?;
        let job = Job::new(request.owner, input);
        self.store.put(&job)?;
        info!(
            job_id = %job.id,
            owner = %job.owner,
            voice = %job.input.voice,
            "job created"
        );

        let orchestrator = self.clone();
        let background = job.clone();
        tokio::spawn(async move {
            orchestrator.run_job(background).await;
        });

        Ok(job)
    }

    fn validate(&self, request: &CreateJobRequest) -> Result<SynthesisInput, PreconditionError> {
        let owner_id = request.owner.id();
        if owner_id.is_empty() || !owner_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PreconditionError::InvalidRequester(owner_id.to_string()));
        }
        if request.text.trim().is_empty() {
            return Err(PreconditionError::EmptyText);
        }

        let voice = match &request.voice {
            Some(voice) => voice.clone(),
            None => self
                .checker
                .default_voice_for(&request.language)
                .ok_or_else(|| PreconditionError::UnsupportedLanguage(request.language.clone()))?,
        };

        if !self.checker.voice_exists(&voice) {
            return Err(PreconditionError::VoiceNotFound(voice));
        }
        if !self.checker.ownership_valid(&voice, &request.owner) {
            return Err(if request.owner.is_guest() {
                PreconditionError::GuestCustomVoice
            } else {
                PreconditionError::ForeignVoice
            });
        }
        if !self.checker.is_ready(&voice) {
            return Err(PreconditionError::VoiceNotReady(voice));
        }

        let preset = request
            .preset
            .clone()
            .unwrap_or_else(|| self.default_preset.clone());
        Ok(SynthesisInput::new(request.text.clone(), request.language.clone(), voice).with_preset(preset))
    }

    /// Background execution for one job. Runs at most once per job.
    async fn run_job(&self, mut job: Job) {
        if let Err(e) = job.transition(JobStatus::Processing) {
            error!(job_id = %job.id, error = %e, "refusing to run job");
            return;
        }
        // Best effort: a lost PROCESSING write is superseded by the final one.
        self.persist(&job);

        let task = SynthesisTask {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            input: job.input.clone(),
        };
        let outcome = self
            .executor
            .execute(self.backend.as_ref(), &task, |attempt| {
                job.record_attempt(attempt);
                self.persist(&job);
            })
            .await;

        let attempts = outcome.attempts();
        job.record_attempt(attempts);
        let finalized = match outcome {
            ExecutionOutcome::Succeeded { output, .. } => job.complete(output),
            ExecutionOutcome::Failed { failure, .. } => job.fail(failure),
        };
        if let Err(e) = finalized {
            error!(job_id = %job.id, error = %e, "could not finalize job");
            return;
        }

        match self.store.put(&job) {
            Ok(()) => info!(
                job_id = %job.id,
                status = %job.status,
                attempts,
                "job finished"
            ),
            Err(e) => error!(
                job_id = %job.id,
                status = %job.status,
                error = %e,
                "failed to persist final job state; job left for reconciliation"
            ),
        }
    }

    fn persist(&self, job: &Job) {
        match self.store.put(job) {
            Ok(()) => {
                debug!(job_id = %job.id, status = %job.status, attempts = job.attempt_count, "job updated")
            }
            Err(e) => {
                warn!(job_id = %job.id, status = %job.status, error = %e, "job update not persisted")
            }
        }
    }

    /// Current record for `id`, or [`NarratorError::JobNotFound`].
    ///
    /// Reads never change the job, so repeated reads of a terminal job are
    /// identical.
    pub fn get_job(&self, id: &str) -> Result<Job, NarratorError> {
        self.store
            .get(id)?
            .ok_or_else(|| NarratorError::JobNotFound(id.to_string()))
    }

    /// Jobs filtered by owner and status, oldest first.
    pub fn list_jobs(
        &self,
        owner: Option<&Requester>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, NarratorError> {
        let jobs = self
            .store
            .list()?
            .into_iter()
            .filter(|j| owner.is_none_or(|o| &j.owner == o))
            .filter(|j| status.is_none_or(|s| j.status == s))
            .collect();
        Ok(jobs)
    }

    /// Poll until the job reaches a terminal state.
    pub async fn await_terminal(
        &self,
        id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Job, NarratorError> {
        let started = Instant::now();
        loop {
            let job = self.get_job(id)?;
            if job.is_terminal() {
                return Ok(job);
            }
            if started.elapsed() >= timeout {
                return Err(NarratorError::Timeout(id.to_string()));
            }
            sleep(poll_interval).await;
        }
    }

    /// Non-terminal jobs not updated for at least `older_than`.
    ///
    /// Covers `Processing` jobs whose final write was lost and `Created` jobs
    /// whose background task never ran or never got a write through. These
    /// are candidates for operator reconciliation; nothing here changes them.
    pub fn stale_jobs(&self, older_than: Duration) -> Result<Vec<Job>, NarratorError> {
        let threshold = chrono::Duration::from_std(older_than)
            .map_err(|e| NarratorError::Config(e.to_string()))?;
        let cutoff = chrono::Utc::now() - threshold;
        let jobs = self
            .list_jobs(None, None)?
            .into_iter()
            .filter(|j| !j.is_terminal() && j.updated_at <= cutoff)
            .collect();
        Ok(jobs)
    }
}
