use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

use tsbench_core::{HandlerError, QueryHandler, Request, TaskHandler};

use crate::stats::Sample;

/// How many samples may sit unread before workers block on publishing.
/// Intentional backpressure: the collector is a plain append loop, so the
/// buffer only papers over scheduling jitter.
pub(crate) const SAMPLE_STREAM_CAPACITY: usize = 10;

/// Wraps a [`QueryHandler`] as the pipeline's [`TaskHandler`]: times the
/// call, publishes a [`Sample`] on success, and logs either way.
///
/// Failures pass through unchanged so the job's retry policy can see them;
/// no sample is published for a failed attempt.
pub struct MeasuredHandler {
    inner: Arc<dyn QueryHandler>,
    samples: mpsc::Sender<Sample>,
}

impl MeasuredHandler {
    /// Wrap `inner`, publishing samples to `samples`.
    pub fn new(inner: Arc<dyn QueryHandler>, samples: mpsc::Sender<Sample>) -> Self {
        Self { inner, samples }
    }
}

#[async_trait]
impl TaskHandler for MeasuredHandler {
    async fn process(&self, request: &Request, worker_id: usize) -> Result<(), HandlerError> {
        let started = Instant::now();
        let result = self.inner.process(request).await;
        let overhead = started.elapsed();

        match result {
            Ok(elapsed_ms) => {
                debug!(
                    worker_id,
                    dur_ms = overhead.as_secs_f64() * 1000.0,
                    query_dur_ms = elapsed_ms,
                    host_id = %request.host_id,
                    start_time = %request.start,
                    end_time = %request.end,
                    "query timed"
                );
                let sample = Sample {
                    worker_id,
                    elapsed_ms,
                    overhead,
                    host_id: request.host_id.clone(),
                    start: request.start,
                    end: request.end,
                };
                if self.samples.send(sample).await.is_err() {
                    // Cannot happen under the completion protocol: the
                    // stream closes only after in-flight hits zero.
                    error!(host_id = %request.host_id, "sample stream closed under a live job");
                }
                Ok(())
            }
            Err(err) => {
                error!(
                    worker_id,
                    host_id = %request.host_id,
                    error = %err,
                    "query failed"
                );
                Err(err)
            }
        }
    }
}
