#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Shared domain types for `tsbench`: the benchmark request model, the
//! handler contracts the engine dispatches against, and the CSV record
//! source that feeds the pipeline.

mod builder;
mod handler;
mod request;
mod source;

pub use builder::{BuildError, QueryFormat};
pub use handler::{HandlerError, QueryHandler, TaskHandler};
pub use request::Request;
pub use source::{CsvSource, Record, SourceError};
