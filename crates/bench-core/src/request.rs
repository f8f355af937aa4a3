use chrono::{DateTime, Utc};

/// One parameterized query invocation: a host and the time window to scan.
///
/// Immutable once built. The core does not enforce `start <= end`; the
/// server-side function owns that decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Host identifier, never empty (the builder drops rows without one).
    pub host_id: String,
    /// Window start, inclusive.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}
