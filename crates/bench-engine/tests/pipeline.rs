//! End-to-end pipeline runs over in-memory CSV sources and scripted
//! handlers: sample accounting, invalid-row handling, retry outcomes,
//! bounded parallelism, and the drain-on-stop path.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use tsbench_core::{CsvSource, HandlerError, QueryFormat, QueryHandler, Request};
use tsbench_engine::{reduce, BenchOptions, BenchOutcome, StopSignal, RETRY_BACKOFF};

const THREE_ROWS: &str = "hostname,start_time,end_time\n\
    host_000008,2017-01-01 08:59:22,2017-01-01 09:59:22\n\
    host_000001,2017-01-02 13:02:02,2017-01-02 14:02:02\n\
    host_000008,2017-01-02 18:50:28,2017-01-02 19:50:28\n";

async fn run_csv(
    csv: &str,
    workers: usize,
    handler: Arc<dyn QueryHandler>,
    stop: StopSignal,
) -> BenchOutcome {
    let source = CsvSource::open(Cursor::new(csv.to_string()))
        .await
        .expect("open source");
    tsbench_engine::run(
        BenchOptions { workers },
        source,
        QueryFormat::default(),
        handler,
        stop,
    )
    .await
    .expect("pipeline run")
}

/// Always succeeds with a fixed elapsed time.
struct ConstHandler(f64);

#[async_trait]
impl QueryHandler for ConstHandler {
    async fn process(&self, _request: &Request) -> Result<f64, HandlerError> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn three_rows_one_worker_trivial_handler() {
    let outcome = run_csv(THREE_ROWS, 1, Arc::new(ConstHandler(1.0)), StopSignal::new()).await;

    assert_eq!(outcome.samples.len(), 3);
    assert_eq!(outcome.failed_jobs, 0);
    assert!(!outcome.interrupted);
    assert!(outcome.samples.iter().all(|s| s.worker_id == 0));

    let report = reduce(&outcome.samples).expect("reduce");
    let hosts: Vec<&str> = report.per_host.iter().map(|h| h.host_id.as_str()).collect();
    assert_eq!(hosts, ["host_000001", "host_000008"]);
    assert_eq!(report.per_host[0].summary.total_run, 1);
    assert_eq!(report.per_host[0].summary.total_time, 1.0);
    assert_eq!(report.per_host[1].summary.total_run, 2);
    assert_eq!(report.per_host[1].summary.total_time, 2.0);

    assert_eq!(report.overall.total_run, 3);
    assert_eq!(report.overall.total_time, 3.0);
    assert_eq!(report.overall.min, 1.0);
    assert_eq!(report.overall.max, 1.0);
    assert_eq!(report.overall.median, 1.0);
    assert_eq!(report.overall.mean, 1.0);
}

#[tokio::test]
async fn invalid_rows_are_dropped_without_aborting() {
    let csv = "hostname,start_time,end_time\n\
        host_000008,2017-0001-01 08:59:22,2017-01-01 09:59:22\n\
        host_000001,2017-01-02 13:02:02,2017-01-02 14:02:02\n\
        ,2017-01-02 18:50:28,2017-01-02 19:50:28\n";
    let outcome = run_csv(csv, 2, Arc::new(ConstHandler(1.0)), StopSignal::new()).await;

    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].host_id, "host_000001");
    assert_eq!(outcome.failed_jobs, 0);
}

/// Fails with deadline-exceeded a fixed number of times, then succeeds.
struct RecoveringHandler {
    failures: usize,
    elapsed_ms: f64,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryHandler for RecoveringHandler {
    async fn process(&self, _request: &Request) -> Result<f64, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(HandlerError::DeadlineExceeded)
        } else {
            Ok(self.elapsed_ms)
        }
    }
}

#[tokio::test]
async fn deadline_exceeded_retries_until_success() {
    let one_row = "hostname,start_time,end_time\n\
        host_000001,2017-01-02 13:02:02,2017-01-02 14:02:02\n";
    let handler = Arc::new(RecoveringHandler {
        failures: 2,
        elapsed_ms: 42.0,
        calls: AtomicUsize::new(0),
    });

    let started = Instant::now();
    let outcome = run_csv(one_row, 1, handler.clone(), StopSignal::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.samples.len(), 1);
    assert_eq!(outcome.samples[0].elapsed_ms, 42.0);
    assert_eq!(outcome.failed_jobs, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    assert!(
        elapsed >= 2 * RETRY_BACKOFF,
        "two backoffs should take at least {:?}, took {elapsed:?}",
        2 * RETRY_BACKOFF
    );
}

#[tokio::test]
async fn retry_exhaustion_fails_the_job() {
    let one_row = "hostname,start_time,end_time\n\
        host_000001,2017-01-02 13:02:02,2017-01-02 14:02:02\n";
    let handler = Arc::new(RecoveringHandler {
        failures: usize::MAX,
        elapsed_ms: 0.0,
        calls: AtomicUsize::new(0),
    });

    let outcome = run_csv(one_row, 1, handler.clone(), StopSignal::new()).await;

    assert!(outcome.samples.is_empty());
    assert_eq!(outcome.failed_jobs, 1);
    // Initial attempt plus RETRY_MAX re-queues.
    assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
}

/// Fatal errors must not be retried.
struct BrokenHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl QueryHandler for BrokenHandler {
    async fn process(&self, _request: &Request) -> Result<f64, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Fatal(anyhow::anyhow!(
            "relation does not exist"
        )))
    }
}

#[tokio::test]
async fn permanent_errors_fail_without_retry() {
    let handler = Arc::new(BrokenHandler {
        calls: AtomicUsize::new(0),
    });
    let outcome = run_csv(THREE_ROWS, 2, handler.clone(), StopSignal::new()).await;

    assert!(outcome.samples.is_empty());
    assert_eq!(outcome.failed_jobs, 3);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
}

/// Sleeps per query and records the peak number of concurrent calls.
struct SleepyHandler {
    sleep: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[async_trait]
impl QueryHandler for SleepyHandler {
    async fn process(&self, _request: &Request) -> Result<f64, HandlerError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.sleep).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(1.0)
    }
}

#[tokio::test]
async fn handler_concurrency_never_exceeds_worker_count() {
    let rows = 100;
    let workers = 4;
    let sleep = Duration::from_millis(20);

    let mut csv = String::from("hostname,start_time,end_time\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "host_{:06},2017-01-01 08:59:22,2017-01-01 09:59:22\n",
            i % 7
        ));
    }

    let handler = Arc::new(SleepyHandler {
        sleep,
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
    });

    let started = Instant::now();
    let outcome = run_csv(&csv, workers, handler.clone(), StopSignal::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.samples.len(), rows);
    let max_active = handler.max_active.load(Ordering::SeqCst);
    assert!(
        max_active <= workers,
        "observed {max_active} concurrent handler calls with {workers} workers"
    );
    let floor = sleep * (rows / workers) as u32;
    assert!(
        elapsed >= floor,
        "{rows} queries over {workers} workers took only {elapsed:?}"
    );
}

#[tokio::test]
async fn latched_stop_drains_without_sampling_new_rows() {
    let stop = StopSignal::new();
    stop.request_stop();
    let outcome = run_csv(THREE_ROWS, 2, Arc::new(ConstHandler(1.0)), stop).await;

    assert!(outcome.interrupted);
    assert!(outcome.samples.is_empty());
    assert_eq!(outcome.failed_jobs, 0);
}
