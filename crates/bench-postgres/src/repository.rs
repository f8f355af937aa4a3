use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use tsbench_core::{HandlerError, QueryHandler, Request};

use crate::config::DbConfig;

/// Per-query deadline. Queries running longer surface as the transient
/// deadline-exceeded error and go through the engine's retry policy.
const QUERY_DEADLINE: Duration = Duration::from_secs(30);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Pooled access to the benchmark database.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Connect, sizing the pool for `max_connections` concurrent queries.
    pub async fn connect(config: &DbConfig, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("applying embedded migrations");
        MIGRATOR.run(&self.pool).await
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryHandler for Repository {
    async fn process(&self, request: &Request) -> Result<f64, HandlerError> {
        let query = sqlx::query_scalar::<_, f64>(
            "SELECT * FROM bench($1::TEXT, $2::TIMESTAMPTZ, $3::TIMESTAMPTZ)",
        )
        .bind(&request.host_id)
        .bind(request.start)
        .bind(request.end)
        .fetch_optional(&self.pool);

        match tokio::time::timeout(QUERY_DEADLINE, query).await {
            Err(_) => Err(HandlerError::DeadlineExceeded),
            Ok(Ok(Some(elapsed_ms))) => Ok(elapsed_ms),
            // A single-row empty result means "nothing to measure", not an
            // error.
            Ok(Ok(None)) => Ok(0.0),
            Ok(Err(err)) => Err(HandlerError::Fatal(
                anyhow::Error::new(err).context("benchmark query failed"),
            )),
        }
    }
}
