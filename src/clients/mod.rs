//! Adapters binding the probe traits to real client libraries.
//!
//! Each adapter converts its library's errors into [`crate::errors::ProbeError`]
//! at the boundary.

pub mod amqp;
pub mod kafka;
pub mod postgres;
pub mod redis;

pub use self::amqp::AmqpConnector;
pub use self::kafka::KafkaConnector;
pub use self::postgres::PgRowSource;
pub use self::redis::RedisStore;
