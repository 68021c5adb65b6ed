//! Kafka producer and consumer clients over `rdkafka`.
//!
//! librdkafka is a native library, so the binding sits behind the `kafka`
//! cargo feature. A build without it still serves `/test/kafka`, reporting
//! the missing capability as a configuration error.

use crate::errors::ProbeError;
use crate::probe::stream::{StreamConnector, StreamPublisher, StreamSubscriber};

/// Builds producers and consumers against one broker list.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    #[cfg_attr(not(feature = "kafka"), allow(dead_code))]
    brokers: String,
}

impl KafkaConnector {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
        }
    }

    /// Whether this build links the Kafka client library.
    pub const fn supported() -> bool {
        cfg!(feature = "kafka")
    }
}

#[cfg(feature = "kafka")]
impl StreamConnector for KafkaConnector {
    fn publisher(&self) -> Result<Box<dyn StreamPublisher>, ProbeError> {
        Ok(Box::new(rd::Publisher::create(&self.brokers)?))
    }

    fn subscriber(&self, group_id: &str) -> Result<Box<dyn StreamSubscriber>, ProbeError> {
        Ok(Box::new(rd::Subscriber::create(&self.brokers, group_id)?))
    }
}

#[cfg(not(feature = "kafka"))]
impl StreamConnector for KafkaConnector {
    fn publisher(&self) -> Result<Box<dyn StreamPublisher>, ProbeError> {
        Err(missing_capability())
    }

    fn subscriber(&self, _group_id: &str) -> Result<Box<dyn StreamSubscriber>, ProbeError> {
        Err(missing_capability())
    }
}

#[cfg(not(feature = "kafka"))]
fn missing_capability() -> ProbeError {
    ProbeError::configuration(
        "Kafka client library is not available: this build was compiled without the `kafka` feature",
    )
}

#[cfg(feature = "kafka")]
mod rd {
    // ---
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::config::ClientConfig;
    use rdkafka::consumer::{Consumer, StreamConsumer};
    use rdkafka::error::{KafkaError, RDKafkaErrorCode};
    use rdkafka::message::Message;
    use rdkafka::producer::future_producer::DeliveryFuture;
    use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
    use rdkafka::util::Timeout;
    use serde_json::Value;
    use tracing::debug;

    use crate::errors::ProbeError;
    use crate::models::iso_now;
    use crate::probe::broker::decode_body;
    use crate::probe::stream::{ConsumedRecord, PollResult, StreamPublisher, StreamSubscriber};

    fn create_error(role: &str, e: KafkaError) -> ProbeError {
        // ---
        match e {
            KafkaError::ClientConfig(..) => {
                ProbeError::configuration(format!("Kafka {role} configuration rejected: {e}"))
            }
            _ => ProbeError::connection(format!("Kafka {role} could not be created: {e}")),
        }
    }

    pub struct Publisher {
        producer: FutureProducer,
        deliveries: Mutex<Vec<DeliveryFuture>>,
    }

    impl Publisher {
        pub fn create(brokers: &str) -> Result<Self, ProbeError> {
            // ---
            let producer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("socket.timeout.ms", "5000")
                .set("message.timeout.ms", "10000")
                .create::<FutureProducer>()
                .map_err(|e| create_error("producer", e))?;
            Ok(Self {
                producer,
                deliveries: Mutex::new(Vec::new()),
            })
        }

        fn take_deliveries(&self) -> Result<Vec<DeliveryFuture>, ProbeError> {
            let mut deliveries = self
                .deliveries
                .lock()
                .map_err(|_| ProbeError::unexpected("delivery list lock poisoned"))?;
            Ok(std::mem::take(&mut *deliveries))
        }
    }

    #[async_trait]
    impl StreamPublisher for Publisher {
        async fn produce(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), ProbeError> {
            // ---
            let record = FutureRecord::to(topic).key(key).payload(payload);
            let delivery = self
                .producer
                .send_result(record)
                .map_err(|(e, _record)| ProbeError::remote(format!("produce failed: {e}")))?;
            self.deliveries
                .lock()
                .map_err(|_| ProbeError::unexpected("delivery list lock poisoned"))?
                .push(delivery);
            Ok(())
        }

        async fn flush(&self, wait: Duration) -> Result<usize, ProbeError> {
            // ---
            let producer = self.producer.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = producer.flush(Timeout::After(wait)) {
                    debug!("Kafka flush returned: {}", e);
                }
                producer.in_flight_count().max(0) as usize
            })
            .await
            .map_err(|e| ProbeError::unexpected(format!("flush task failed: {e}")))
        }

        async fn confirm(&self, wait: Duration) -> Result<(), ProbeError> {
            // ---
            for delivery in self.take_deliveries()? {
                match tokio::time::timeout(wait, delivery).await {
                    Ok(Ok(Ok(_))) => {}
                    Ok(Ok(Err((e, _message)))) => {
                        return Err(ProbeError::remote(format!("delivery failed: {e}")));
                    }
                    Ok(Err(_canceled)) => {
                        return Err(ProbeError::timeout(
                            "delivery",
                            wait,
                            "delivery report was cancelled",
                        ));
                    }
                    Err(_) => {
                        return Err(ProbeError::timeout(
                            "delivery",
                            wait,
                            "no delivery report from the broker",
                        ));
                    }
                }
            }
            Ok(())
        }
    }

    /// `None` once closed.
    pub struct Subscriber {
        consumer: Option<StreamConsumer>,
    }

    impl Subscriber {
        pub fn create(brokers: &str, group_id: &str) -> Result<Self, ProbeError> {
            // ---
            let consumer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("group.id", group_id)
                .set("auto.offset.reset", "earliest")
                .set("enable.auto.commit", "true")
                .set("auto.commit.interval.ms", "1000")
                .set("session.timeout.ms", "30000")
                .set("socket.timeout.ms", "5000")
                .set("enable.partition.eof", "true")
                .create::<StreamConsumer>()
                .map_err(|e| create_error("consumer", e))?;
            Ok(Self {
                consumer: Some(consumer),
            })
        }
    }

    #[async_trait]
    impl StreamSubscriber for Subscriber {
        async fn subscribe(&mut self, topic: &str) -> Result<(), ProbeError> {
            let consumer = self
                .consumer
                .as_ref()
                .ok_or_else(|| ProbeError::unexpected("consumer already closed"))?;
            consumer
                .subscribe(&[topic])
                .map_err(|e| ProbeError::remote(format!("subscribe to '{topic}' failed: {e}")))
        }

        async fn poll(&mut self, wait: Duration) -> PollResult {
            // ---
            let Some(consumer) = self.consumer.as_ref() else {
                return PollResult::Failed("consumer already closed".into());
            };
            match tokio::time::timeout(wait, consumer.recv()).await {
                Err(_) => PollResult::TimedOut,
                Ok(Ok(msg)) => PollResult::Message(ConsumedRecord {
                    partition: msg.partition(),
                    offset: msg.offset(),
                    key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    payload: msg.payload().map(decode_body).unwrap_or(Value::Null),
                    timestamp: msg.timestamp().to_millis(),
                    consumed_at: iso_now(),
                }),
                Ok(Err(KafkaError::PartitionEOF(_))) => PollResult::EndOfPartition,
                Ok(Err(KafkaError::MessageConsumption(RDKafkaErrorCode::OperationTimedOut))) => {
                    PollResult::TimedOut
                }
                Ok(Err(e)) => PollResult::Failed(e.to_string()),
            }
        }

        async fn close(&mut self) {
            // ---
            // Leaves the group now instead of waiting for the session timeout.
            let Some(consumer) = self.consumer.take() else {
                return;
            };
            consumer.unsubscribe();
            // Dropping the consumer blocks in librdkafka until it has left the group.
            if let Err(e) = tokio::task::spawn_blocking(move || drop(consumer)).await {
                debug!("Kafka consumer close task failed: {}", e);
            }
        }
    }
}
