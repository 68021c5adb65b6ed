//! PostgreSQL access for the datastore probe.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::errors::ProbeError;
use crate::probe::dbs::RowSource;

/// How long a probe waits for a pooled connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    // ---
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.username)
        .password(&config.password)
}

/// Reads sample rows through a lazily connected pool.
///
/// The pool does not connect until the first probe, so the service starts
/// even while the database is down.
#[derive(Debug, Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    // ---
    pub fn lazy(config: &DatabaseConfig) -> Self {
        // ---
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(connect_options(config));
        Self { pool }
    }
}

pub fn classify(e: sqlx::Error) -> ProbeError {
    // ---
    match e {
        sqlx::Error::Configuration(e) => ProbeError::configuration(e.to_string()),
        sqlx::Error::Io(e) => ProbeError::connection(e.to_string()),
        sqlx::Error::Tls(e) => ProbeError::connection(e.to_string()),
        sqlx::Error::PoolTimedOut => {
            ProbeError::connection("timed out waiting for a database connection")
        }
        sqlx::Error::Database(e) => ProbeError::remote(e.to_string()),
        other => ProbeError::unexpected(other.to_string()),
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn first_row(&self, table: &str) -> Result<Option<Value>, ProbeError> {
        // ---
        // `table` is validated as a plain identifier when configuration loads.
        let sql = format!("SELECT row_to_json(t) FROM {table} t LIMIT 1");

        sqlx::query_scalar::<_, Value>(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }
}
