//! Configuration loader for the `payments-probe` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
//! The standalone health reporter is the one deliberate exception: it reads
//! the raw `DB_*` variables itself so it can run before any of this is loaded.
use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

/// Service tag stamped on probe messages and health documents.
pub const DEFAULT_SERVICE_NAME: &str = "payments-app";

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| String::from($default))
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub service_name: String,

    /// Port the HTTP server binds on `0.0.0.0`.
    pub http_port: u16,

    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub rabbitmq: RabbitMqConfig,
    pub kafka: KafkaConfig,
    pub upstream: UpstreamConfig,
}

/// PostgreSQL connection parameters.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Maximum number of database connections in the pool.
    pub pool_max: u32,
    /// Table the datastore probe reads its sample row from.
    pub test_table: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database of the raw key/value store.
    pub db: i64,
    /// Logical database of the cache store.
    pub cache_db: i64,
    /// Prefix applied to every cache key.
    pub cache_prefix: String,
}

#[derive(Debug, Clone)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub test_queue: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma separated bootstrap brokers. Empty means not configured.
    pub brokers: String,
    /// Group of the regular payments consumers; reported, never joined.
    pub consumer_group_id: String,
    pub test_topic: String,
    pub test_group_id: String,
}

/// Peer service reached by the generic upstream probe.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        // ---
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            http_port: 8080,
            database: DatabaseConfig {
                host: "127.0.0.1".into(),
                port: 5432,
                database: "payments".into(),
                username: "payments_user".into(),
                password: String::new(),
                pool_max: 5,
                test_table: "test".into(),
            },
            redis: RedisConfig {
                host: "127.0.0.1".into(),
                port: 6379,
                password: None,
                db: 0,
                cache_db: 1,
                cache_prefix: "payments_cache:".into(),
            },
            rabbitmq: RabbitMqConfig {
                host: "payments-rabbitmq".into(),
                port: 5672,
                user: "payments_user".into(),
                password: "payments_password".into(),
                test_queue: "test_queue".into(),
                connect_timeout: Duration::from_secs(10),
            },
            kafka: KafkaConfig {
                brokers: "kafka:29092".into(),
                consumer_group_id: "payments_consumer_group".into(),
                test_topic: "payments-test-topic".into(),
                test_group_id: "payments-test-consumer-group".into(),
            },
            upstream: UpstreamConfig {
                url: "http://auth.shipanything.test".into(),
                timeout: Duration::from_secs(10),
            },
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Every variable is optional; see [`Config::default`] for the fallbacks.
/// Returns an error if a numeric variable does not parse or `DB_TEST_TABLE`
/// is not a plain SQL identifier.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let database = DatabaseConfig {
        host: env_or!("DB_HOST", defaults.database.host),
        port: parse_env!("DB_PORT", u16, defaults.database.port),
        database: env_or!("DB_DATABASE", defaults.database.database),
        username: env_or!("DB_USERNAME", defaults.database.username),
        password: env_or!("DB_PASSWORD", defaults.database.password),
        pool_max: parse_env!("DB_POOL_MAX", u32, defaults.database.pool_max),
        test_table: env_or!("DB_TEST_TABLE", defaults.database.test_table),
    };
    validate_identifier("DB_TEST_TABLE", &database.test_table)?;

    let redis = RedisConfig {
        host: env_or!("REDIS_HOST", defaults.redis.host),
        port: parse_env!("REDIS_PORT", u16, defaults.redis.port),
        password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
        db: parse_env!("REDIS_DB", i64, defaults.redis.db),
        cache_db: parse_env!("REDIS_CACHE_DB", i64, defaults.redis.cache_db),
        cache_prefix: env_or!("CACHE_PREFIX", defaults.redis.cache_prefix),
    };

    let rabbitmq = RabbitMqConfig {
        host: env_or!("RABBITMQ_HOST", defaults.rabbitmq.host),
        port: parse_env!("RABBITMQ_PORT", u16, defaults.rabbitmq.port),
        user: env_or!("RABBITMQ_USER", defaults.rabbitmq.user),
        password: env_or!("RABBITMQ_PASSWORD", defaults.rabbitmq.password),
        test_queue: env_or!("RABBITMQ_TEST_QUEUE", defaults.rabbitmq.test_queue),
        connect_timeout: Duration::from_secs(parse_env!(
            "RABBITMQ_CONNECT_TIMEOUT_SECS",
            u64,
            defaults.rabbitmq.connect_timeout.as_secs()
        )),
    };

    let kafka = KafkaConfig {
        brokers: env_or!("KAFKA_BROKERS", defaults.kafka.brokers),
        consumer_group_id: env_or!("KAFKA_CONSUMER_GROUP_ID", defaults.kafka.consumer_group_id),
        test_topic: env_or!("KAFKA_TEST_TOPIC", defaults.kafka.test_topic),
        test_group_id: env_or!("KAFKA_TEST_GROUP_ID", defaults.kafka.test_group_id),
    };

    let upstream = UpstreamConfig {
        url: env_or!("AUTH_SERVICE_URL", defaults.upstream.url),
        timeout: Duration::from_secs(parse_env!(
            "UPSTREAM_TIMEOUT_SECS",
            u64,
            defaults.upstream.timeout.as_secs()
        )),
    };

    Ok(Config {
        service_name: env_or!("SERVICE_NAME", defaults.service_name),
        http_port: parse_env!("APP_PORT", u16, defaults.http_port),
        database,
        redis,
        rabbitmq,
        kafka,
        upstream,
    })
}

/// The table name is spliced into SQL, so only plain identifiers pass.
fn validate_identifier(var_name: &str, value: &str) -> Result<()> {
    // ---
    let mut chars = value.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("{} must be a plain SQL identifier, got '{}'", var_name, value);
    }
    Ok(())
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Passwords are masked; everything else is shown as loaded.
    pub fn log_config(&self) {
        // ---
        let mask = |secret: &str| if secret.is_empty() { "(empty)" } else { "****" };

        tracing::info!("Configuration loaded:");
        tracing::info!("  SERVICE_NAME        : {}", self.service_name);
        tracing::info!("  APP_PORT            : {}", self.http_port);
        tracing::info!(
            "  DB                  : {}@{}:{}/{} (password {})",
            self.database.username,
            self.database.host,
            self.database.port,
            self.database.database,
            mask(&self.database.password)
        );
        tracing::info!("  DB_POOL_MAX         : {}", self.database.pool_max);
        tracing::info!("  DB_TEST_TABLE       : {}", self.database.test_table);
        tracing::info!(
            "  REDIS               : {}:{} db={} cache_db={} (password {})",
            self.redis.host,
            self.redis.port,
            self.redis.db,
            self.redis.cache_db,
            mask(self.redis.password.as_deref().unwrap_or_default())
        );
        tracing::info!("  CACHE_PREFIX        : {}", self.redis.cache_prefix);
        tracing::info!(
            "  RABBITMQ            : {}@{}:{} (password {})",
            self.rabbitmq.user,
            self.rabbitmq.host,
            self.rabbitmq.port,
            mask(&self.rabbitmq.password)
        );
        tracing::info!("  RABBITMQ_TEST_QUEUE : {}", self.rabbitmq.test_queue);
        tracing::info!("  KAFKA_BROKERS       : {}", self.kafka.brokers);
        tracing::info!("  KAFKA_CONSUMER_GROUP_ID : {}", self.kafka.consumer_group_id);
        tracing::info!(
            "  KAFKA_TEST          : topic={} group={}",
            self.kafka.test_topic,
            self.kafka.test_group_id
        );
        tracing::info!("  AUTH_SERVICE_URL    : {}", self.upstream.url);
    }
}
