#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Postgres-backed query handler for `tsbench`: a pooled repository that
//! invokes the server-side `bench` timing function, plus the embedded
//! schema migrations that create it.

mod config;
mod repository;

pub use config::DbConfig;
pub use repository::Repository;
