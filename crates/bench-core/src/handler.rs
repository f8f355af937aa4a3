use async_trait::async_trait;

use crate::request::Request;

/// Failure modes a handler can surface to the engine.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The per-query deadline elapsed before a result arrived. Transient:
    /// the job retry policy re-queues these.
    #[error("query deadline exceeded")]
    DeadlineExceeded,
    /// Any other handler failure (connection, schema, logic). Not retried.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl HandlerError {
    /// Whether the retry policy should consider re-running the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::DeadlineExceeded)
    }
}

/// Executes one invocation of the server-side benchmark function and
/// reports the elapsed milliseconds it measured.
///
/// Implementations must be safe to invoke concurrently from up to `W`
/// workers; a single-row empty result is `Ok(0.0)`, not an error.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Run the query described by `request` once.
    async fn process(&self, request: &Request) -> Result<f64, HandlerError>;
}

/// The contract a dispatched job executes against: called exactly once per
/// accepted job per attempt, with the id of the worker running it.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Service `request` on worker `worker_id`.
    async fn process(&self, request: &Request, worker_id: usize) -> Result<(), HandlerError>;
}
