//! Streaming platform probe (Kafka).
//!
//! Two phases. The producer phase publishes one message under a fixed key and
//! flushes with a bounded wait; it only counts when nothing is left pending
//! and the broker confirmed delivery.
//! The consumer phase runs only after a successful produce: it subscribes a
//! consumer group to the same topic and polls until either the consume window
//! closes or enough messages were collected. End-of-partition and poll
//! timeouts are normal and only counted. The subscriber is closed whatever
//! happens.
//!
//! Consuming nothing is tolerated as `partial_success`: another member of the
//! group may legitimately have claimed the message first.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{Outcome, Plan, StepLog};
use crate::errors::{ErrorKind, ProbeError};

pub const STREAM_PLAN: Plan = Plan {
    primary: "produce",
    required: &["create_producer", "create_consumer"],
    secondary: Some("consume"),
    tolerated_timeouts: &[],
};

/// Timing and volume bounds of one stream probe run.
#[derive(Debug, Clone, Copy)]
pub struct StreamBounds {
    pub flush_wait: Duration,
    pub consume_window: Duration,
    pub poll_wait: Duration,
    pub max_messages: usize,
}

impl Default for StreamBounds {
    fn default() -> Self {
        Self {
            flush_wait: Duration::from_secs(10),
            consume_window: Duration::from_secs(15),
            poll_wait: Duration::from_secs(2),
            max_messages: 5,
        }
    }
}

/// Where the probe message goes and who reads it back.
#[derive(Debug, Clone, Copy)]
pub struct StreamTarget<'a> {
    pub topic: &'a str,
    pub key: &'a str,
    pub group_id: &'a str,
}

/// Builds producer and consumer clients.
pub trait StreamConnector: Send + Sync {
    fn publisher(&self) -> Result<Box<dyn StreamPublisher>, ProbeError>;

    fn subscriber(&self, group_id: &str) -> Result<Box<dyn StreamSubscriber>, ProbeError>;
}

#[async_trait]
pub trait StreamPublisher: Send + Sync {
    /// Enqueue one keyed record for delivery.
    async fn produce(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), ProbeError>;

    /// Flush for up to `wait`, returning how many records are still pending.
    async fn flush(&self, wait: Duration) -> Result<usize, ProbeError>;

    /// Wait up to `wait` for the broker's verdict on every produced record.
    ///
    /// A record can leave the queue as failed, so an empty queue after
    /// `flush` is not a delivery confirmation on its own.
    async fn confirm(&self, wait: Duration) -> Result<(), ProbeError>;
}

#[async_trait]
pub trait StreamSubscriber: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), ProbeError>;

    /// One poll bounded by `wait`.
    async fn poll(&mut self, wait: Duration) -> PollResult;

    async fn close(&mut self);
}

/// A record read back from the topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumedRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Value,
    pub timestamp: Option<i64>,
    pub consumed_at: String,
}

/// Classified result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Message(ConsumedRecord),
    EndOfPartition,
    TimedOut,
    Failed(String),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PollStats {
    pub messages: usize,
    pub end_of_partition: usize,
    pub timed_out: usize,
    pub errors: usize,
}

/// Result of one stream probe run.
#[derive(Debug)]
pub struct StreamProbe {
    pub log: StepLog,
    pub published: Option<Value>,
    pub consumed: Vec<ConsumedRecord>,
    pub stats: PollStats,
    pub outcome: Outcome,
}

impl StreamProbe {
    /// Error text when the consumer broke, as opposed to simply reading nothing.
    pub fn consumer_error(&self) -> Option<&str> {
        // ---
        self.log
            .get("consume")
            .filter(|s| !s.succeeded && s.error_kind != Some(ErrorKind::OperationTimeout))
            .and_then(|s| s.error.as_deref())
    }
}

// ---

pub async fn run(
    connector: &dyn StreamConnector,
    target: StreamTarget<'_>,
    message: Value,
    bounds: StreamBounds,
) -> StreamProbe {
    // ---
    let mut probe = StreamProbe {
        log: StepLog::new(),
        published: None,
        consumed: Vec::new(),
        stats: PollStats::default(),
        outcome: Outcome::Success,
    };

    if produce_phase(&mut probe.log, connector, target, &message, bounds).await {
        probe.published = Some(message);
        consume_phase(&mut probe, connector, target, bounds).await;
    }

    probe.outcome = Outcome::classify(&probe.log, &STREAM_PLAN);
    match &probe.outcome {
        Outcome::Success => info!(
            "Stream probe round trip on '{}' passed, {} message(s) consumed",
            target.topic,
            probe.consumed.len()
        ),
        Outcome::PartialSuccess { reason } => {
            warn!("Stream probe produced but consume did not confirm: {}", reason)
        }
        Outcome::Error { step, detail, .. } => {
            error!("Stream probe failed at {:?}: {}", step, detail)
        }
    }
    probe
}

async fn produce_phase(
    log: &mut StepLog,
    connector: &dyn StreamConnector,
    target: StreamTarget<'_>,
    message: &Value,
    bounds: StreamBounds,
) -> bool {
    // ---
    let Ok(producer) = log.run("create_producer", async { connector.publisher() }).await else {
        return false;
    };

    let payload = message.to_string();
    let produce = async {
        producer
            .produce(target.topic, target.key, payload.as_bytes())
            .await?;
        let pending = producer.flush(bounds.flush_wait).await?;
        if pending > 0 {
            return Err(ProbeError::timeout(
                "flush",
                bounds.flush_wait,
                format!("{pending} message(s) still pending"),
            ));
        }
        producer.confirm(bounds.flush_wait).await?;
        Ok::<_, ProbeError>(())
    };

    log.run_with_value("produce", produce, |_| Some(json!({ "flush_result": "success" })))
        .await
        .is_ok()
}

async fn consume_phase(
    probe: &mut StreamProbe,
    connector: &dyn StreamConnector,
    target: StreamTarget<'_>,
    bounds: StreamBounds,
) {
    // ---
    let created = probe
        .log
        .run("create_consumer", async { connector.subscriber(target.group_id) })
        .await;
    let Ok(mut consumer) = created else {
        return;
    };

    let consume = poll_loop(
        consumer.as_mut(),
        target,
        bounds,
        &mut probe.consumed,
        &mut probe.stats,
    );
    let _ = probe
        .log
        .run_with_value("consume", consume, |matching| {
            Some(json!({ "matching_messages": matching }))
        })
        .await;

    consumer.close().await;
}

/// Poll until the window closes or `max_messages` were collected.
///
/// Returns how many collected messages carry the probe key.
async fn poll_loop(
    consumer: &mut dyn StreamSubscriber,
    target: StreamTarget<'_>,
    bounds: StreamBounds,
    consumed: &mut Vec<ConsumedRecord>,
    stats: &mut PollStats,
) -> Result<usize, ProbeError> {
    // ---
    consumer.subscribe(target.topic).await?;

    let started = Instant::now();
    while consumed.len() < bounds.max_messages {
        let elapsed = started.elapsed();
        if elapsed >= bounds.consume_window {
            break;
        }
        let wait = bounds.poll_wait.min(bounds.consume_window - elapsed);

        match consumer.poll(wait).await {
            PollResult::Message(record) => {
                debug!(
                    "Consumed partition {} offset {} from '{}'",
                    record.partition, record.offset, target.topic
                );
                stats.messages += 1;
                consumed.push(record);
            }
            PollResult::EndOfPartition => stats.end_of_partition += 1,
            PollResult::TimedOut => stats.timed_out += 1,
            PollResult::Failed(e) => {
                warn!("Poll on '{}' reported an error, continuing: {}", target.topic, e);
                stats.errors += 1;
            }
        }
    }

    let matching = consumed
        .iter()
        .filter(|r| r.key.as_deref() == Some(target.key))
        .count();
    if matching == 0 {
        let detail = if consumed.len() >= bounds.max_messages {
            format!(
                "stopped at the {} message cap, none with key '{}'",
                bounds.max_messages, target.key
            )
        } else {
            format!(
                "no message with key '{}' consumed ({} other message(s))",
                target.key,
                consumed.len()
            )
        };
        return Err(ProbeError::timeout("consume", started.elapsed(), detail));
    }
    Ok(matching)
}
