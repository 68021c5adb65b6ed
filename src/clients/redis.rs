//! Redis-backed key/value stores for the cache and the raw KV probe.
//!
//! A multiplexed connection is opened per call, so nothing outlives the
//! request that used it.

use async_trait::async_trait;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};
use tracing::debug;

use crate::config::RedisConfig;
use crate::errors::ProbeError;
use crate::probe::dbs::KvStore;

/// One logical Redis database, optionally namespaced by a key prefix.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    label: &'static str,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("label", &self.label)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisStore {
    // ---
    pub fn open(
        config: &RedisConfig,
        db: i64,
        prefix: &str,
        label: &'static str,
    ) -> Result<Self, ProbeError> {
        // ---
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                db,
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(|e| {
            ProbeError::configuration(format!("Invalid Redis settings for {label}: {e}"))
        })?;

        Ok(Self {
            client,
            prefix: prefix.to_string(),
            label,
        })
    }

    /// Cache store: dedicated database plus the cache key prefix.
    pub fn cache(config: &RedisConfig) -> Result<Self, ProbeError> {
        Self::open(config, config.cache_db, &config.cache_prefix, "cache")
    }

    /// Raw key/value store: keys are used as given.
    pub fn kv(config: &RedisConfig) -> Result<Self, ProbeError> {
        Self::open(config, config.db, "", "redis")
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, ProbeError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ProbeError::connection(format!("Redis ({}) unreachable: {}", self.label, e))
            })
    }
}

fn classify(label: &str, command: &str, e: RedisError) -> ProbeError {
    // ---
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        ProbeError::connection(format!("Redis ({label}) {command} failed: {e}"))
    } else {
        ProbeError::remote(format!("Redis ({label}) {command} failed: {e}"))
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), ProbeError> {
        // ---
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| classify(self.label, "SET", e))?;

        debug!(store = self.label, key, "Redis SET");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProbeError> {
        // ---
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| classify(self.label, "GET", e))?;

        debug!(store = self.label, key, hit = value.is_some(), "Redis GET");
        Ok(value)
    }
}
