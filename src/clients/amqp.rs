//! AMQP broker sessions over `lapin`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::debug;

use crate::config::RabbitMqConfig;
use crate::errors::ProbeError;
use crate::probe::broker::{BrokerConnector, BrokerSession};

const CONSUMER_TAG: &str = "payments-probe";

/// Opens one connection plus channel per probe run.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    config: RabbitMqConfig,
}

impl AmqpConnector {
    pub fn new(config: RabbitMqConfig) -> Self {
        Self { config }
    }

    fn uri(&self) -> AMQPUri {
        // ---
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.config.user.clone(),
                    password: self.config.password.clone(),
                },
                host: self.config.host.clone(),
                port: self.config.port,
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, ProbeError> {
        // ---
        let properties =
            ConnectionProperties::default().with_connection_name(CONSUMER_TAG.into());
        let connect = Connection::connect_uri(self.uri(), properties);

        let connection = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                ProbeError::connection(format!(
                    "no answer from {}:{} within {}s",
                    self.config.host,
                    self.config.port,
                    self.config.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| ProbeError::connection(e.to_string()))?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(200, "OK").await;
                return Err(ProbeError::connection(format!("channel creation failed: {e}")));
            }
        };

        debug!("AMQP session open on {}:{}", self.config.host, self.config.port);
        Ok(Box::new(AmqpSession { connection, channel }))
    }
}

pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

fn remote(action: &str, e: lapin::Error) -> ProbeError {
    ProbeError::remote(format!("{action} failed: {e}"))
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_queue(&mut self, queue: &str) -> Result<(), ProbeError> {
        // ---
        self.channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| remote("queue declare", e))?;
        Ok(())
    }

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), ProbeError> {
        // ---
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| remote("publish", e))?
            .await
            .map_err(|e| remote("publish confirmation", e))?;
        Ok(())
    }

    async fn consume_one(
        &mut self,
        queue: &str,
        wait: Duration,
    ) -> Result<Option<Vec<u8>>, ProbeError> {
        // ---
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| remote("consume", e))?;

        let received = match tokio::time::timeout(wait, consumer.next()).await {
            Err(_) | Ok(None) => None,
            Ok(Some(Err(e))) => return Err(remote("delivery", e)),
            Ok(Some(Ok(delivery))) => {
                delivery
                    .acker
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(|e| remote("ack", e))?;
                Some(delivery.data)
            }
        };

        self.channel
            .basic_cancel(consumer.tag().as_str(), BasicCancelOptions::default())
            .await
            .map_err(|e| remote("consumer cancel", e))?;

        Ok(received)
    }

    async fn delete_queue(&mut self, queue: &str) -> Result<(), ProbeError> {
        // ---
        let purged = self
            .channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| remote("queue delete", e))?;
        debug!("Deleted queue '{}' ({} message(s) dropped)", queue, purged);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        // ---
        // A broker-side error may already have closed the channel.
        if let Err(e) = self.channel.close(200, "OK").await {
            debug!("Channel close skipped: {}", e);
        }
        self.connection
            .close(200, "OK")
            .await
            .map_err(|e| remote("connection close", e))
    }
}
