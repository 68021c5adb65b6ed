//! Shared application state handed to every route.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clients::{AmqpConnector, KafkaConnector, PgRowSource, RedisStore};
use crate::probe::broker::BrokerConnector;
use crate::probe::dbs::{KvStore, RowSource};
use crate::probe::stream::StreamConnector;
use crate::Config;

/// Explicitly constructed dependency clients plus the loaded configuration.
///
/// Nothing here holds an open connection to a broker: each probe run opens
/// and tears down its own session through the connectors.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn KvStore>,
    pub kv: Arc<dyn KvStore>,
    pub rows: Arc<dyn RowSource>,
    pub broker: Arc<dyn BrokerConnector>,
    pub stream: Arc<dyn StreamConnector>,
    pub http: reqwest::Client,
}

impl AppState {
    // ---
    pub fn from_config(config: Config) -> Result<Self> {
        // ---
        let cache = RedisStore::cache(&config.redis).context("Invalid cache configuration")?;
        let kv = RedisStore::kv(&config.redis).context("Invalid Redis configuration")?;
        let rows = PgRowSource::lazy(&config.database);
        let broker = AmqpConnector::new(config.rabbitmq.clone());
        let stream = KafkaConnector::new(config.kafka.brokers.clone());

        let http = reqwest::Client::builder()
            .timeout(config.upstream.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            kv: Arc::new(kv),
            rows: Arc::new(rows),
            broker: Arc::new(broker),
            stream: Arc::new(stream),
            http,
        })
    }
}
