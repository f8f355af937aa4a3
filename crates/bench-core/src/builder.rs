use chrono::{DateTime, NaiveDateTime, Utc};

use crate::request::Request;
use crate::source::Record;

/// Which CSV columns hold the request fields, and how to read their
/// timestamps.
#[derive(Debug, Clone)]
pub struct QueryFormat {
    /// Column holding the host identifier.
    pub host: String,
    /// Column holding the window start.
    pub start: String,
    /// Column holding the window end.
    pub end: String,
    /// strftime pattern for the two timestamp columns.
    pub timestamp_format: String,
}

impl Default for QueryFormat {
    fn default() -> Self {
        Self {
            host: "hostname".to_string(),
            start: "start_time".to_string(),
            end: "end_time".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Why a record could not be projected into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A timestamp column failed to parse under the configured pattern.
    #[error("failed to parse {column} value {value:?}: {source}")]
    BadTimestamp {
        /// The offending column name.
        column: String,
        /// The raw field value.
        value: String,
        /// The chrono parse failure.
        #[source]
        source: chrono::ParseError,
    },
    /// The host column was absent or empty.
    #[error("record has no {0:?} value")]
    EmptyHost(String),
}

impl QueryFormat {
    /// Project `record` into a [`Request`], validating the host and parsing
    /// both timestamps. Rows that fail here are meant to be skipped with a
    /// warning, never to abort the run.
    pub fn build(&self, record: &Record) -> Result<Request, BuildError> {
        let start = self.parse_timestamp(record, &self.start)?;
        let end = self.parse_timestamp(record, &self.end)?;

        let host_id = record.get(&self.host);
        if host_id.is_empty() {
            return Err(BuildError::EmptyHost(self.host.clone()));
        }

        Ok(Request {
            host_id: host_id.to_string(),
            start,
            end,
        })
    }

    fn parse_timestamp(&self, record: &Record, column: &str) -> Result<DateTime<Utc>, BuildError> {
        let value = record.get(column);
        NaiveDateTime::parse_from_str(value, &self.timestamp_format)
            .map(|dt| dt.and_utc())
            .map_err(|source| BuildError::BadTimestamp {
                column: column.to_string(),
                value: value.to_string(),
                source,
            })
    }
}
