//! Serialized synthesis worker.
//!
//! One dedicated OS thread owns the [`SynthesisResource`] and pulls requests
//! off an unbounded FIFO channel, one at a time. Any number of callers may
//! [`WorkerHandle::submit`] concurrently; each request carries its own
//! single-use response channel, so every caller gets exactly its own result.
//!
//! Worker loop: `Idle → Dequeuing → Invoking → Delivering → Idle`, until
//! shutdown. On shutdown new submissions are rejected and every request still
//! queued is answered with [`WorkerError::ShutDown`] without touching the
//! resource.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::state_machine::SynthesisOutput;
use crate::synthesis::{SynthesisBackend, SynthesisError, SynthesisResource, SynthesisTask};

/// Reasons the worker refuses or abandons a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("work queue is full ({capacity} pending requests)")]
    Busy { capacity: usize },

    #[error("synthesis worker has shut down")]
    ShutDown,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum queued-but-not-started requests. `None` means unbounded.
    pub queue_capacity: Option<usize>,
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            thread_name: "synthesis-worker".to_string(),
        }
    }
}

/// Observable phase of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Dequeuing = 1,
    Invoking = 2,
    Delivering = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Dequeuing,
            2 => WorkerState::Invoking,
            3 => WorkerState::Delivering,
            _ => WorkerState::Stopped,
        }
    }
}

type Reply = Result<SynthesisOutput, SynthesisError>;

/// A queued request: the task plus the channel its caller is waiting on.
struct SynthesisRequest {
    task: SynthesisTask,
    respond_to: oneshot::Sender<Reply>,
}

enum Command {
    Synthesize(SynthesisRequest),
    Shutdown,
}

#[derive(Default)]
struct Shared {
    depth: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    shutting_down: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Cheap, cloneable front door to the worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    capacity: Option<usize>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("queue_depth", &self.queue_depth())
            .field("capacity", &self.capacity)
            .field("state", &self.state())
            .finish()
    }
}

impl WorkerHandle {
    /// Enqueue `task` and wait for the worker to deliver its outcome.
    pub async fn submit(&self, task: SynthesisTask) -> Reply {
        let rx = self.enqueue(task)?;
        rx.await
            .map_err(|_| SynthesisError::from(WorkerError::ShutDown))?
    }

    /// Like [`submit`](Self::submit), for plain threads.
    ///
    /// Panics if called from within an async runtime.
    pub fn blocking_submit(&self, task: SynthesisTask) -> Reply {
        let rx = self.enqueue(task)?;
        rx.blocking_recv()
            .map_err(|_| SynthesisError::from(WorkerError::ShutDown))?
    }

    fn enqueue(&self, task: SynthesisTask) -> Result<oneshot::Receiver<Reply>, WorkerError> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(WorkerError::ShutDown);
        }

        let previous = self.shared.depth.fetch_add(1, Ordering::SeqCst);
        if let Some(capacity) = self.capacity
            && previous >= capacity
        {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            warn!(job_id = %task.job_id, capacity, "work queue full, rejecting request");
            return Err(WorkerError::Busy { capacity });
        }

        let (respond_to, rx) = oneshot::channel();
        let job_id = task.job_id.clone();
        if self
            .tx
            .send(Command::Synthesize(SynthesisRequest { task, respond_to }))
            .is_err()
        {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(WorkerError::ShutDown);
        }
        debug!(job_id = %job_id, depth = previous + 1, "request queued");
        Ok(rx)
    }

    /// Stop accepting work. Requests already queued are drained with
    /// [`WorkerError::ShutDown`]; an in-flight invocation finishes normally.
    pub fn shutdown(&self) {
        if !self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            info!("synthesis worker shutdown requested");
            // The loop may already be gone; that is fine.
            let _ = self.tx.send(Command::Shutdown);
        }
    }

    /// Requests queued but not yet picked up.
    pub fn queue_depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }

    /// Resource invocations completed, successful or not.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::SeqCst)
    }

    /// Resource invocations that returned an error or panicked.
    pub fn failed(&self) -> u64 {
        self.shared.failed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutting_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for WorkerHandle {
    async fn synthesize(&self, task: &SynthesisTask) -> Reply {
        self.submit(task.clone()).await
    }
}

/// Owner of the worker thread. Dropping it requests shutdown.
pub struct SynthesisWorker {
    handle: WorkerHandle,
    thread: Option<JoinHandle<()>>,
}

impl SynthesisWorker {
    /// Move `resource` onto a dedicated thread and start serving requests.
    pub fn spawn<R: SynthesisResource>(resource: R, config: WorkerConfig) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let loop_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(resource, rx, loop_shared))?;

        info!(
            thread = %config.thread_name,
            capacity = ?config.queue_capacity,
            "synthesis worker started"
        );
        Ok(Self {
            handle: WorkerHandle {
                tx,
                shared,
                capacity: config.queue_capacity,
            },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Request shutdown and wait for the loop to drain and exit.
    ///
    /// Blocks the calling thread.
    pub fn join(mut self) -> thread::Result<()> {
        self.handle.shutdown();
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}

impl Drop for SynthesisWorker {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

fn run<R: SynthesisResource>(
    mut resource: R,
    mut rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
) {
    shared.set_state(WorkerState::Idle);
    while let Some(command) = rx.blocking_recv() {
        shared.set_state(WorkerState::Dequeuing);
        match command {
            Command::Synthesize(request) => {
                shared.depth.fetch_sub(1, Ordering::SeqCst);
                if shared.shutting_down.load(Ordering::SeqCst) {
                    debug!(job_id = %request.task.job_id, "draining queued request after shutdown");
                    let _ = request.respond_to.send(Err(WorkerError::ShutDown.into()));
                    continue;
                }

                shared.set_state(WorkerState::Invoking);
                let outcome = invoke(&mut resource, &request.task);

                shared.set_state(WorkerState::Delivering);
                shared.processed.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = &outcome {
                    shared.failed.fetch_add(1, Ordering::SeqCst);
                    debug!(job_id = %request.task.job_id, error = %e, "synthesis failed");
                }
                if request.respond_to.send(outcome).is_err() {
                    debug!(job_id = %request.task.job_id, "caller went away before delivery");
                }
            }
            Command::Shutdown => {
                // Anything still buffered is drained by the branch above.
                rx.close();
            }
        }
        shared.set_state(WorkerState::Idle);
    }
    shared.set_state(WorkerState::Stopped);
    info!(
        processed = shared.processed.load(Ordering::SeqCst),
        "synthesis worker stopped"
    );
}

fn invoke<R: SynthesisResource>(resource: &mut R, task: &SynthesisTask) -> Reply {
    match panic::catch_unwind(AssertUnwindSafe(|| resource.synthesize(task))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(job_id = %task.job_id, panic = %message, "synthesis resource panicked");
            Err(SynthesisError::Other(format!(
                "synthesis resource panicked: {message}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
