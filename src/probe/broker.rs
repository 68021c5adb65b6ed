//! Message broker probe (AMQP).
//!
//! Sequence: connect, declare a transient queue, publish one JSON message,
//! wait a bounded time for one delivery (acknowledged when received), then
//! delete the queue and close the session. Queue deletion and session close
//! run on every exit path once the corresponding resource exists.
//!
//! Publishing is what decides success. A delivery that does not arrive within
//! the wait leaves `received` empty without degrading the outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::{Outcome, Plan, StepLog};
use crate::errors::ProbeError;

/// Bound on the wait for the published message to come back.
pub const CONSUME_WAIT: Duration = Duration::from_secs(2);

pub const BROKER_PLAN: Plan = Plan {
    primary: "publish",
    required: &["connect", "declare_queue", "delete_queue", "close"],
    secondary: None,
    tolerated_timeouts: &["consume"],
};

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, ProbeError>;
}

/// An open connection plus channel on the broker.
#[async_trait]
pub trait BrokerSession: Send {
    async fn declare_queue(&mut self, queue: &str) -> Result<(), ProbeError>;

    async fn publish(&mut self, queue: &str, body: &[u8]) -> Result<(), ProbeError>;

    /// Wait up to `wait` for one delivery and acknowledge it.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn consume_one(&mut self, queue: &str, wait: Duration)
        -> Result<Option<Vec<u8>>, ProbeError>;

    async fn delete_queue(&mut self, queue: &str) -> Result<(), ProbeError>;

    async fn close(&mut self) -> Result<(), ProbeError>;
}

/// Result of one broker probe run.
#[derive(Debug)]
pub struct BrokerProbe {
    pub log: StepLog,
    pub published: Value,
    pub received: Option<Value>,
    pub outcome: Outcome,
}

// ---

pub async fn run(
    connector: &dyn BrokerConnector,
    queue: &str,
    message: Value,
    wait: Duration,
) -> BrokerProbe {
    // ---
    let mut log = StepLog::new();
    let mut received = None;

    if let Ok(mut session) = log.run("connect", connector.connect()).await {
        let declared = log
            .run("declare_queue", session.declare_queue(queue))
            .await
            .is_ok();

        if declared {
            received = exchange(&mut log, session.as_mut(), queue, &message, wait).await;
            let _ = log.run("delete_queue", session.delete_queue(queue)).await;
        }
        let _ = log.run("close", session.close()).await;
    }

    let outcome = Outcome::classify(&log, &BROKER_PLAN);
    match &outcome {
        Outcome::Error { step, detail, .. } => {
            error!("Broker probe failed at {:?}: {}", step, detail)
        }
        _ if received.is_none() => {
            warn!("Broker probe published but nothing came back within {:?}", wait)
        }
        _ => info!("Broker probe round trip on queue '{}' completed", queue),
    }

    BrokerProbe {
        log,
        published: message,
        received,
        outcome,
    }
}

/// Publish, then try to read the message back.
async fn exchange(
    log: &mut StepLog,
    session: &mut dyn BrokerSession,
    queue: &str,
    message: &Value,
    wait: Duration,
) -> Option<Value> {
    // ---
    let body = message.to_string();
    log.run_with_value("publish", session.publish(queue, body.as_bytes()), |_| {
        Some(json!({ "bytes": body.len() }))
    })
    .await
    .ok()?;

    let consume = async {
        session
            .consume_one(queue, wait)
            .await?
            .ok_or_else(|| ProbeError::timeout("consume", wait, "no message delivered"))
    };
    let raw = log.run("consume", consume).await.ok()?;
    Some(decode_body(&raw))
}

/// JSON bodies come back as structured values, anything else as text.
pub fn decode_body(raw: &[u8]) -> Value {
    // ---
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{BrokerScript, FakeBroker};

    fn message() -> Value {
        json!({
            "test": "RabbitMQ connection successful",
            "timestamp": "2026-10-19T10:00:00.000000Z",
            "service": "payments-app",
        })
    }

    #[tokio::test]
    async fn test_received_message_equals_published_message() {
        // ---
        let broker = FakeBroker::new(BrokerScript::default());

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        assert_eq!(probe.outcome, Outcome::Success);
        assert_eq!(probe.received, Some(probe.published.clone()));
        let ops: Vec<_> = probe.log.steps().iter().map(|s| s.operation).collect();
        assert_eq!(
            ops,
            vec!["connect", "declare_queue", "publish", "consume", "delete_queue", "close"]
        );
        assert_eq!(broker.acked(), 1);
        assert!(broker.queue_deleted());
        assert!(broker.closed());
    }

    #[tokio::test]
    async fn test_nothing_delivered_is_still_success() {
        // ---
        let broker = FakeBroker::new(BrokerScript {
            swallow_messages: true,
            ..Default::default()
        });

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        assert_eq!(probe.outcome, Outcome::Success);
        assert!(probe.received.is_none());
        let consume = probe.log.get("consume").unwrap();
        assert_eq!(consume.error_kind, Some(ErrorKind::OperationTimeout));
        assert!(broker.queue_deleted());
        assert!(broker.closed());
    }

    #[tokio::test]
    async fn test_publish_failure_is_error_and_still_cleans_up() {
        // ---
        let broker = FakeBroker::new(BrokerScript {
            fail_publish: Some("NOT_ALLOWED - access refused".into()),
            ..Default::default()
        });

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        assert_eq!(probe.outcome.label(), "error");
        assert_eq!(
            probe.outcome.status_code(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(probe.log.get("consume").is_none());
        assert!(broker.queue_deleted());
        assert!(broker.closed());
    }

    #[tokio::test]
    async fn test_consume_channel_error_escalates() {
        // ---
        let broker = FakeBroker::new(BrokerScript {
            fail_consume: Some("CHANNEL_ERROR".into()),
            ..Default::default()
        });

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        match probe.outcome {
            Outcome::Error { kind, step, .. } => {
                assert_eq!(kind, ErrorKind::RemoteProtocol);
                assert_eq!(step, Some("consume"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(broker.queue_deleted());
        assert!(broker.closed());
    }

    #[tokio::test]
    async fn test_connect_failure_skips_everything_else() {
        // ---
        let broker = FakeBroker::new(BrokerScript {
            fail_connect: Some("connection refused".into()),
            ..Default::default()
        });

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        assert_eq!(probe.log.steps().len(), 1);
        match probe.outcome {
            Outcome::Error { kind, .. } => assert_eq!(kind, ErrorKind::ConnectionFailure),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!broker.closed());
    }

    #[tokio::test]
    async fn test_declare_failure_closes_without_deleting() {
        // ---
        let broker = FakeBroker::new(BrokerScript {
            fail_declare: Some("PRECONDITION_FAILED".into()),
            ..Default::default()
        });

        let probe = run(&broker, "test_queue", message(), CONSUME_WAIT).await;

        assert_eq!(probe.outcome.label(), "error");
        assert!(!broker.queue_deleted());
        assert!(broker.closed());
    }

    #[test]
    fn test_decode_body_falls_back_to_text() {
        // ---
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
    }
}
