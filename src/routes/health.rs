// src/routes/health.rs
//! Standalone health reporter for the payments service.
//!
//! Served at `/health.php` and `/health`, and runnable as
//! `payments-probe health` before anything else is initialized. It reads the
//! database settings straight from the environment and never touches the
//! application state, so it keeps answering even when configuration loading
//! or the shared clients would fail.
//!
//! The process is reported `ok` whatever the database does: an unreachable
//! database shows up as `database: "disconnected"` plus `db_error`, still with
//! HTTP 200. Only a failure of the health computation itself answers 500.

use std::env::{self, VarError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};

use crate::config::DEFAULT_SERVICE_NAME;
use crate::models::{iso_now_seconds, DatabaseState, HealthStatus};

/// Bound on the health check's database connection attempt.
const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DB_PORT: &str = "5432";

/// Raw database settings, as found in the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DbTarget {
    /// `Ok(None)` unless both `DB_HOST` and `DB_DATABASE` are set.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(read_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        // ---
        let (Some(host), Some(database)) = (lookup("DB_HOST")?, lookup("DB_DATABASE")?) else {
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            database,
            port: lookup("DB_PORT")?.unwrap_or_else(|| DEFAULT_DB_PORT.to_string()),
            username: lookup("DB_USERNAME")?.unwrap_or_default(),
            password: lookup("DB_PASSWORD")?.unwrap_or_default(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        // ---
        let port: u16 = self
            .port
            .parse()
            .map_err(|e| anyhow!("invalid DB_PORT '{}': {}", self.port, e))?;

        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password);

        let conn = tokio::time::timeout(DB_CONNECT_TIMEOUT, options.connect())
            .await
            .map_err(|_| {
                anyhow!(
                    "no answer from {}:{} within {}s",
                    self.host,
                    port,
                    DB_CONNECT_TIMEOUT.as_secs()
                )
            })??;
        conn.close().await?;
        Ok(())
    }
}

/// A variable that is set but not valid unicode is a hard failure.
fn read_env(name: &str) -> Result<Option<String>> {
    // ---
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(e @ VarError::NotUnicode(_)) => Err(anyhow!("{name}: {e}")),
    }
}

/// Build the status document, pinging the database when a target is given.
pub async fn report(target: Option<DbTarget>) -> HealthStatus {
    // ---
    let mut status = HealthStatus {
        status: "ok",
        timestamp: iso_now_seconds(),
        service: DEFAULT_SERVICE_NAME,
        database: None,
        db_error: None,
    };

    if let Some(target) = target {
        match target.ping().await {
            Ok(()) => status.database = Some(DatabaseState::Connected),
            Err(e) => {
                tracing::warn!("Health check could not reach the database: {}", e);
                status.database = Some(DatabaseState::Disconnected);
                status.db_error = Some(e.to_string());
            }
        }
    }
    status
}

/// Full health computation from the process environment.
pub async fn check() -> Result<HealthStatus> {
    Ok(report(DbTarget::from_env()?).await)
}

/// Body answered when the health computation itself failed.
pub fn failure_body(e: &anyhow::Error) -> Value {
    json!({
        "status": "error",
        "message": e.to_string(),
        "timestamp": iso_now_seconds(),
    })
}

/// Handle `GET /health.php` and `GET /health`.
async fn health() -> Response {
    // ---
    match check().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(failure_body(&e))).into_response(),
    }
}

/// Create a subrouter containing the health routes.
///
/// Generic over the application state so it merges into any gateway router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health.php", get(health))
        .route("/health", get(health))
}
