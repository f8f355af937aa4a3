use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

use tsbench_core::{HandlerError, Request, TaskHandler};

use crate::inflight::InflightGuard;

/// Maximum number of re-queues after the initial attempt.
pub const RETRY_MAX: u32 = 3;

/// Delay before a retried job re-enters the dispatcher intake.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// A failed execution attempt, carrying enough context to be reported.
#[derive(Debug, thiserror::Error)]
#[error(
    "job for host {host} failed on worker {worker_id} (attempt {attempt}): {source}",
    host = .request.host_id
)]
pub struct JobError {
    /// The request the job was servicing.
    pub request: Request,
    /// Zero-based retry count at the time of the failure.
    pub attempt: u32,
    /// The worker that observed the failure.
    pub worker_id: usize,
    /// The underlying handler failure.
    #[source]
    pub source: HandlerError,
}

/// A dispatch-ready unit of work.
///
/// Owned by the dispatcher until a worker dequeues it, then by that worker
/// until execution terminates. The dispatcher only ever sees this contract,
/// never a concrete job type.
#[async_trait]
pub trait Job: Send {
    /// Run one attempt on worker `worker_id`.
    async fn execute(&mut self, worker_id: usize) -> Result<(), JobError>;

    /// Whether the job wants another attempt after `error`. May mutate
    /// internal retry state; a `true` answer commits the job to re-queueing.
    fn should_retry(&mut self, error: &JobError) -> bool;

    /// Record a terminal failure. Called at most once, after the last
    /// attempt.
    fn fail(&self, error: JobError);
}

/// A boxed job moving through the dispatcher's channels.
pub type BoxJob = Box<dyn Job>;

type ExecuteFn = Box<dyn FnMut(usize) -> Result<(), JobError> + Send>;
type ShouldRetryFn = Box<dyn FnMut(&JobError) -> bool + Send>;
type FailFn = Box<dyn Fn(JobError) + Send>;

/// A [`Job`] assembled from three closures.
///
/// Useful for exercising the dispatcher contract without a full envelope
/// type, and for tests that script each lifecycle hook independently.
pub struct FuncJob {
    execute: ExecuteFn,
    should_retry: ShouldRetryFn,
    fail: FailFn,
}

impl FuncJob {
    /// Build a job from its `execute`, `should_retry`, and `fail` hooks.
    pub fn new(
        execute: impl FnMut(usize) -> Result<(), JobError> + Send + 'static,
        should_retry: impl FnMut(&JobError) -> bool + Send + 'static,
        fail: impl Fn(JobError) + Send + 'static,
    ) -> Self {
        Self {
            execute: Box::new(execute),
            should_retry: Box::new(should_retry),
            fail: Box::new(fail),
        }
    }
}

#[async_trait]
impl Job for FuncJob {
    async fn execute(&mut self, worker_id: usize) -> Result<(), JobError> {
        (self.execute)(worker_id)
    }

    fn should_retry(&mut self, error: &JobError) -> bool {
        (self.should_retry)(error)
    }

    fn fail(&self, error: JobError) {
        (self.fail)(error)
    }
}

/// The benchmark's job: one [`Request`] bound to the task handler that will
/// service it, with the deadline-exceeded retry policy and an in-flight
/// guard released when the job terminates.
pub struct QueryJob {
    request: Request,
    retries: u32,
    handler: Arc<dyn TaskHandler>,
    give_ups: Arc<AtomicUsize>,
    _inflight: InflightGuard,
}

impl QueryJob {
    /// Build a job around `request`. `inflight` keeps the job counted until
    /// it terminates; `give_ups` is bumped once if the job ultimately fails.
    pub fn new(
        request: Request,
        handler: Arc<dyn TaskHandler>,
        inflight: InflightGuard,
        give_ups: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            request,
            retries: 0,
            handler,
            give_ups,
            _inflight: inflight,
        }
    }
}

#[async_trait]
impl Job for QueryJob {
    async fn execute(&mut self, worker_id: usize) -> Result<(), JobError> {
        self.handler
            .process(&self.request, worker_id)
            .await
            .map_err(|source| JobError {
                request: self.request.clone(),
                attempt: self.retries,
                worker_id,
                source,
            })
    }

    fn should_retry(&mut self, error: &JobError) -> bool {
        if error.source.is_transient() && self.retries < RETRY_MAX {
            self.retries += 1;
            return true;
        }
        false
    }

    fn fail(&self, error: JobError) {
        self.give_ups.fetch_add(1, Ordering::SeqCst);
        error!(error = %error, "giving up on job");
    }
}
