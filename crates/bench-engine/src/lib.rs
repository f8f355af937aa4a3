#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Concurrent execution engine for `tsbench`: the bounded worker pool and
//! its dispatchers, the per-job retry lifecycle, the in-flight accounting
//! that gates completion, the instrumented measuring stage, and the
//! statistical reducer.

mod affinity;
mod dispatcher;
mod inflight;
mod job;
mod measure;
mod pipeline;
mod stats;

pub use affinity::KeyedDispatcher;
pub use dispatcher::{DispatchError, Dispatcher};
pub use inflight::{InflightCounter, InflightGuard};
pub use job::{BoxJob, FuncJob, Job, JobError, QueryJob, RETRY_BACKOFF, RETRY_MAX};
pub use measure::MeasuredHandler;
pub use pipeline::{run, BenchOptions, BenchOutcome, StopSignal};
pub use stats::{
    group_by_host, max, mean, median, min, reduce, sum, EmptyInput, GroupedSample, HostSummary,
    Report, Sample, Summary,
};
