use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tsbench_core::{CsvSource, QueryFormat, QueryHandler, TaskHandler};

use crate::dispatcher::Dispatcher;
use crate::inflight::InflightCounter;
use crate::job::QueryJob;
use crate::measure::{MeasuredHandler, SAMPLE_STREAM_CAPACITY};
use crate::stats::Sample;

/// Cooperative stop latch shared between the signal handler and the
/// pipeline's producer loop. Latching it stops intake; work already
/// admitted still drains.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// A fresh, unlatched signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the signal. Idempotent.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Pipeline knobs.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Number of concurrent workers (at least 1).
    pub workers: usize,
}

/// What a finished (or drained) run produced.
#[derive(Debug)]
pub struct BenchOutcome {
    /// Every sample published, in completion order.
    pub samples: Vec<Sample>,
    /// Jobs that exhausted their retries and were reported failed.
    pub failed_jobs: usize,
    /// Whether intake was cut short by a stop request. Interrupted runs
    /// must not render statistics.
    pub interrupted: bool,
}

/// Drive a record source through the dispatcher and collect the samples.
///
/// The completion protocol, in order: producer exhaustion (or stop), wait
/// for the in-flight count to hit zero, close the sample stream, join the
/// collector, stop the dispatcher. Closing the handler stays with the
/// caller. Per-row problems are logged and skipped; only a terminal record
/// source error is returned.
pub async fn run(
    options: BenchOptions,
    mut source: CsvSource,
    format: QueryFormat,
    handler: Arc<dyn QueryHandler>,
    stop: StopSignal,
) -> anyhow::Result<BenchOutcome> {
    let (sample_tx, mut sample_rx) = mpsc::channel::<Sample>(SAMPLE_STREAM_CAPACITY);
    let collector = tokio::spawn(async move {
        let mut samples = Vec::new();
        while let Some(sample) = sample_rx.recv().await {
            samples.push(sample);
        }
        samples
    });

    let inflight = InflightCounter::new();
    let failed_jobs = Arc::new(AtomicUsize::new(0));
    let measured: Arc<dyn TaskHandler> = Arc::new(MeasuredHandler::new(handler, sample_tx));
    let dispatcher = Dispatcher::start("bench", options.workers);

    let mut interrupted = false;
    while let Some(record) = source.next_record().await {
        if stop.is_stopped() {
            interrupted = true;
            break;
        }
        let request = match format.build(&record) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "skipping unusable row");
                continue;
            }
        };
        let job = QueryJob::new(
            request,
            measured.clone(),
            inflight.guard(),
            failed_jobs.clone(),
        );
        dispatcher
            .queue(Box::new(job))
            .await
            .context("dispatcher rejected a job")?;
    }
    if interrupted {
        source.close();
        info!("stop requested; draining in-flight work");
    }

    inflight.wait_idle().await;
    // All jobs have terminated, so this drops the last sample sender and
    // closes the stream exactly once.
    drop(measured);
    let samples = collector.await.context("sample collector panicked")?;
    dispatcher.stop().await;

    if !interrupted {
        if let Some(err) = source.error() {
            return Err(anyhow::Error::new(err).context("record source terminated abnormally"));
        }
    }

    Ok(BenchOutcome {
        samples,
        failed_jobs: failed_jobs.load(Ordering::SeqCst),
        interrupted,
    })
}
