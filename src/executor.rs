use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::state_machine::{FailureKind, JobFailure, RetryPolicy, SynthesisOutput};
use crate::synthesis::{SynthesisBackend, SynthesisError, SynthesisErrorKind, SynthesisTask};
use crate::worker::WorkerError;

/// Final result of running one job through the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Succeeded { output: SynthesisOutput, attempts: u32 },
    Failed { failure: JobFailure, attempts: u32 },
}

impl ExecutionOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionOutcome::Succeeded { attempts, .. }
            | ExecutionOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp(FailureKind),
}

/// Runs synthesis attempts against a backend under a bounded retry policy.
///
/// Holds nothing but the policy, so one executor may serve any number of
/// jobs concurrently.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Classify the error from the given (1-based) attempt.
    ///
    /// - `NotFound`: terminal, never retried.
    /// - `Other`: terminal; a shut-down worker is reported separately.
    /// - `Transient`: retried after the policy's delay until attempts run out.
    pub fn decide(&self, attempt: u32, err: &SynthesisError) -> RetryDecision {
        match err.kind() {
            SynthesisErrorKind::NotFound => RetryDecision::GiveUp(FailureKind::NotFound),
            SynthesisErrorKind::Other => match err {
                SynthesisError::Worker(WorkerError::ShutDown) => {
                    RetryDecision::GiveUp(FailureKind::WorkerUnavailable)
                }
                _ => RetryDecision::GiveUp(FailureKind::Rejected),
            },
            SynthesisErrorKind::Transient => {
                if attempt >= self.policy.attempts() {
                    RetryDecision::GiveUp(FailureKind::Exhausted)
                } else {
                    RetryDecision::Retry {
                        delay: self.policy.delay_for_attempt(attempt),
                    }
                }
            }
        }
    }

    /// Attempt `task` until it succeeds or the policy gives up.
    ///
    /// `on_attempt` is called with the attempt number right before each
    /// attempt starts, so callers can persist a monotonically increasing
    /// attempt count.
    pub async fn execute<F>(
        &self,
        backend: &dyn SynthesisBackend,
        task: &SynthesisTask,
        mut on_attempt: F,
    ) -> ExecutionOutcome
    where
        F: FnMut(u32) + Send,
    {
        let max = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            on_attempt(attempt);

            let err = match backend.synthesize(task).await {
                Ok(output) => {
                    info!(job_id = %task.job_id, attempt, "synthesis succeeded");
                    return ExecutionOutcome::Succeeded {
                        output,
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            match self.decide(attempt, &err) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        job_id = %task.job_id,
                        attempt,
                        max_attempts = max,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "synthesis attempt failed, retrying"
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp(kind) => {
                    error!(
                        job_id = %task.job_id,
                        attempt,
                        max_attempts = max,
                        reason = %kind,
                        error = %err,
                        "synthesis failed"
                    );
                    return ExecutionOutcome::Failed {
                        failure: JobFailure::new(kind, err.to_string()),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Backoff, Requester, SynthesisInput};
    use crate::synthesis::mock::{ScriptedBackend, output};
    use std::time::Instant;

    fn task() -> SynthesisTask {
        SynthesisTask {
            job_id: "job-1".into(),
            owner: Requester::User("42".into()),
            input: SynthesisInput::new("hello", "en", "narrator-en"),
        }
    }

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::fixed(max_attempts, 1))
    }

    fn transient() -> SynthesisError {
        SynthesisError::Transient("connection refused".into())
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let backend = ScriptedBackend::always(Ok(output("a.wav")));
        let mut seen = Vec::new();

        let outcome = executor(5)
            .execute(&backend, &task(), |n| seen.push(n))
            .await;

        assert_eq!(
            outcome,
            ExecutionOutcome::Succeeded {
                output: output("a.wav"),
                attempts: 1
            }
        );
        assert_eq!(seen, vec![1]);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_and_stops() {
        let backend = ScriptedBackend::new(
            vec![Err(transient()), Err(transient()), Ok(output("late.wav"))],
            Err(SynthesisError::Other("should never be reached".into())),
        );
        let mut seen = Vec::new();

        let outcome = executor(10)
            .execute(&backend, &task(), |n| seen.push(n))
            .await;

        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, ExecutionOutcome::Succeeded { .. }));
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn always_transient_exhausts_exactly_max_attempts() {
        let backend = ScriptedBackend::always(Err(transient()));
        let mut seen = Vec::new();

        let outcome = executor(4)
            .execute(&backend, &task(), |n| seen.push(n))
            .await;

        match outcome {
            ExecutionOutcome::Failed { failure, attempts } => {
                assert_eq!(attempts, 4);
                assert_eq!(failure.kind, FailureKind::Exhausted);
                assert!(failure.message.contains("connection refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn not_found_is_never_retried() {
        let backend =
            ScriptedBackend::always(Err(SynthesisError::NotFound("voice 'x' missing".into())));

        let outcome = executor(500).execute(&backend, &task(), |_| {}).await;

        match outcome {
            ExecutionOutcome::Failed { failure, attempts } => {
                assert_eq!(attempts, 1);
                assert_eq!(failure.kind, FailureKind::NotFound);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn other_errors_are_rejected_without_retry() {
        let backend = ScriptedBackend::always(Err(SynthesisError::Other("bad preset".into())));
        let outcome = executor(5).execute(&backend, &task(), |_| {}).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed { ref failure, attempts: 1 } if failure.kind == FailureKind::Rejected
        ));
    }

    #[tokio::test]
    async fn worker_shutdown_is_terminal() {
        let backend = ScriptedBackend::always(Err(WorkerError::ShutDown.into()));
        let outcome = executor(5).execute(&backend, &task(), |_| {}).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Failed { ref failure, attempts: 1 } if failure.kind == FailureKind::WorkerUnavailable
        ));
    }

    #[tokio::test]
    async fn busy_worker_is_retried() {
        let backend = ScriptedBackend::new(
            vec![Err(WorkerError::Busy { capacity: 2 }.into())],
            Ok(output("ok.wav")),
        );
        let outcome = executor(3).execute(&backend, &task(), |_| {}).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Succeeded { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let backend = ScriptedBackend::new(
            vec![Err(transient()), Err(transient())],
            Ok(output("ok.wav")),
        );
        let started = Instant::now();
        let outcome = RetryExecutor::new(RetryPolicy::fixed(5, 20))
            .execute(&backend, &task(), |_| {})
            .await;
        assert_eq!(outcome.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn decide_uses_backoff_schedule() {
        let exec = RetryExecutor::new(RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
            backoff: Backoff::Exponential,
            max_delay_ms: 1000,
        });
        assert_eq!(
            exec.decide(1, &transient()),
            RetryDecision::Retry {
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            exec.decide(3, &transient()),
            RetryDecision::Retry {
                delay: Duration::from_millis(400)
            }
        );
        assert_eq!(
            exec.decide(4, &transient()),
            RetryDecision::GiveUp(FailureKind::Exhausted)
        );
        assert_eq!(
            exec.decide(1, &SynthesisError::NotFound("v".into())),
            RetryDecision::GiveUp(FailureKind::NotFound)
        );
    }
}
