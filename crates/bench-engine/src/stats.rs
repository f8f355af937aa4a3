use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A single successful measurement.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Worker that ran the query.
    pub worker_id: usize,
    /// Elapsed milliseconds reported by the server-side function.
    pub elapsed_ms: f64,
    /// Wall-clock time the whole handler call took, round-trip included.
    pub overhead: Duration,
    /// Host the query targeted.
    pub host_id: String,
    /// Window start of the measured query.
    pub start: DateTime<Utc>,
    /// Window end of the measured query.
    pub end: DateTime<Utc>,
}

/// All measurements for one host, in completion order.
#[derive(Debug, Clone)]
pub struct GroupedSample {
    /// The host the group belongs to.
    pub host_id: String,
    /// Server-reported elapsed milliseconds.
    pub elapsed: Vec<f64>,
}

/// Asked for a statistic of nothing.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("input must not be empty")]
pub struct EmptyInput;

/// Sum of all values.
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Result<f64, EmptyInput> {
    if values.is_empty() {
        return Err(EmptyInput);
    }
    Ok(sum(values) / values.len() as f64)
}

/// Median over a sorted private copy; the input order is preserved. Even
/// lengths take the mean of the two central values.
pub fn median(values: &[f64]) -> Result<f64, EmptyInput> {
    if values.is_empty() {
        return Err(EmptyInput);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        mean(&sorted[mid - 1..=mid])
    } else {
        Ok(sorted[mid])
    }
}

/// Smallest value.
pub fn min(values: &[f64]) -> Result<f64, EmptyInput> {
    values
        .iter()
        .copied()
        .min_by(f64::total_cmp)
        .ok_or(EmptyInput)
}

/// Largest value.
pub fn max(values: &[f64]) -> Result<f64, EmptyInput> {
    values
        .iter()
        .copied()
        .max_by(f64::total_cmp)
        .ok_or(EmptyInput)
}

/// The summary statistics reported for one group of measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Number of measurements.
    pub total_run: usize,
    /// Sum of elapsed milliseconds.
    pub total_time: f64,
    /// Fastest measurement.
    pub min: f64,
    /// Slowest measurement.
    pub max: f64,
    /// Median measurement.
    pub median: f64,
    /// Mean measurement.
    pub mean: f64,
}

impl Summary {
    /// Summarize `values`; empty input is an error, never a NaN row.
    pub fn from_values(values: &[f64]) -> Result<Self, EmptyInput> {
        Ok(Self {
            total_run: values.len(),
            total_time: sum(values),
            min: min(values)?,
            max: max(values)?,
            median: median(values)?,
            mean: mean(values)?,
        })
    }
}

/// A host's summary row.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSummary {
    /// The host the row describes.
    pub host_id: String,
    /// Its statistics.
    pub summary: Summary,
}

/// The reduced output of a run: one row per host plus the overall set.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Per-host rows, sorted by host id.
    pub per_host: Vec<HostSummary>,
    /// Statistics over every sample.
    pub overall: Summary,
}

/// Partition samples by host, host-sorted.
pub fn group_by_host(samples: &[Sample]) -> Vec<GroupedSample> {
    let mut groups: BTreeMap<&str, GroupedSample> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(sample.host_id.as_str())
            .or_insert_with(|| GroupedSample {
                host_id: sample.host_id.clone(),
                elapsed: Vec::new(),
            })
            .elapsed
            .push(sample.elapsed_ms);
    }
    groups.into_values().collect()
}

/// Reduce a run's samples into the final [`Report`].
pub fn reduce(samples: &[Sample]) -> Result<Report, EmptyInput> {
    let elapsed: Vec<f64> = samples.iter().map(|s| s.elapsed_ms).collect();
    let overall = Summary::from_values(&elapsed)?;

    let mut per_host = Vec::new();
    for group in group_by_host(samples) {
        per_host.push(HostSummary {
            summary: Summary::from_values(&group.elapsed)?,
            host_id: group.host_id,
        });
    }

    Ok(Report { per_host, overall })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(host: &str, elapsed_ms: f64) -> Sample {
        Sample {
            worker_id: 0,
            elapsed_ms,
            overhead: Duration::from_millis(1),
            host_id: host.to_string(),
            start: Utc::now(),
            end: Utc::now(),
        }
    }

    #[test]
    fn median_cases() {
        let cases: &[(&[f64], f64)] = &[
            (&[5.0, 3.0, 4.0, 2.0, 1.0], 3.0),
            (&[6.0, 3.0, 2.0, 4.0, 5.0, 1.0], 3.5),
            (&[1.0], 1.0),
        ];
        for (input, expected) in cases {
            assert_eq!(median(input), Ok(*expected));
        }
    }

    #[test]
    fn median_does_not_reorder_its_input() {
        let values = vec![0.1, 0.3, 0.2, 0.4, 0.5];
        let before = values.clone();
        median(&values).unwrap();
        assert_eq!(values, before);
    }

    #[test]
    fn mean_cases() {
        let cases: &[(&[f64], f64)] = &[
            (&[1.0, 2.0, 3.0, 4.0, 5.0], 3.0),
            (&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3.5),
            (&[1.0], 1.0),
        ];
        for (input, expected) in cases {
            assert_eq!(mean(input), Ok(*expected));
        }
    }

    #[test]
    fn min_and_max_cases() {
        assert_eq!(min(&[10.534, 3.0, 5.0, 7.0, 9.0]), Ok(3.0));
        assert_eq!(min(&[-5.0, 1.0, 5.0]), Ok(-5.0));
        assert_eq!(max(&[10.5, 3.0, 5.0, 7.0, 9.0]), Ok(10.5));
        assert_eq!(max(&[-20.0, -1.0, -5.5]), Ok(-1.0));
        assert_eq!(max(&[-1.0]), Ok(-1.0));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(mean(&[]), Err(EmptyInput));
        assert_eq!(median(&[]), Err(EmptyInput));
        assert_eq!(min(&[]), Err(EmptyInput));
        assert_eq!(max(&[]), Err(EmptyInput));
        assert_eq!(Summary::from_values(&[]), Err(EmptyInput));
    }

    #[test]
    fn summary_of_one_through_five() {
        let summary = Summary::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(summary.total_run, 5);
        assert_eq!(summary.total_time, 15.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.mean, 3.0);
    }

    #[test]
    fn mean_times_len_recovers_sum() {
        let values = [0.25, 1.5, 2.125, 9.75, 3.0, 0.5];
        let total = mean(&values).unwrap() * values.len() as f64;
        assert!((total - sum(&values)).abs() < 1e-9);
    }

    #[test]
    fn reduce_groups_by_host_sorted() {
        let samples = vec![
            sample("host_000008", 2.0),
            sample("host_000001", 1.0),
            sample("host_000008", 4.0),
        ];
        let report = reduce(&samples).unwrap();

        let hosts: Vec<&str> = report.per_host.iter().map(|h| h.host_id.as_str()).collect();
        assert_eq!(hosts, ["host_000001", "host_000008"]);
        assert_eq!(report.per_host[0].summary.total_run, 1);
        assert_eq!(report.per_host[1].summary.total_run, 2);
        assert_eq!(report.per_host[1].summary.total_time, 6.0);
        assert_eq!(report.overall.total_run, 3);
        assert_eq!(report.overall.total_time, 7.0);
    }
}
