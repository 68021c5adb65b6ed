//! `GET /test/kafka`: produce one keyed message and try to consume it back.
//!
//! Response variants:
//! - `success`: produced, flushed, and at least one message with the probe
//!   key came back through the test consumer group.
//! - `partial_success` (200): produced, but nothing matching was consumed in
//!   the window, or the consumer broke after being created.
//! - `error` (500): no brokers configured, a client could not be built, or
//!   the produce, flush or delivery report failed.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::clients::KafkaConnector;
use crate::models::iso_now;
use crate::probe::stream::{self, StreamBounds, StreamProbe, StreamTarget};
use crate::probe::Outcome;
use crate::AppState;

/// Key every probe message is produced under.
pub const PROBE_KEY: &str = "payments-test-key";

async fn test_kafka(State(state): State<AppState>) -> Response {
    // ---
    let cfg = &state.config.kafka;
    let brokers = cfg.brokers.trim();

    if brokers.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": "Kafka brokers are not configured",
                "note": "Ensure KAFKA_BROKERS is set in the environment variables",
            })),
        )
            .into_response();
    }

    let message = json!({
        "test": "Kafka connection and messaging test",
        "timestamp": iso_now(),
        "service": state.config.service_name,
        "message_id": Uuid::new_v4().to_string(),
        "broker": brokers,
        "test_type": "producer_consumer_test",
    });
    let target = StreamTarget {
        topic: &cfg.test_topic,
        key: PROBE_KEY,
        group_id: &cfg.test_group_id,
    };
    let bounds = StreamBounds::default();

    let probe = stream::run(state.stream.as_ref(), target, message, bounds).await;
    let body = shape(&probe, brokers, target, bounds);

    (probe.outcome.status_code(), Json(body)).into_response()
}

fn shape(probe: &StreamProbe, brokers: &str, target: StreamTarget<'_>, bounds: StreamBounds) -> Value {
    // ---
    match &probe.outcome {
        Outcome::Error {
            kind,
            detail,
            step: Some("create_producer" | "create_consumer"),
        } => json!({
            "status": "error",
            "message": "Kafka test failed",
            "error": detail,
            "error_kind": kind,
            "broker_attempted": brokers,
            "kafka_support": KafkaConnector::supported(),
            "steps": probe.log,
        }),

        Outcome::Error { kind, detail, .. } => json!({
            "status": "error",
            "message": "Kafka producer failed",
            "error": detail,
            "error_kind": kind,
            "broker_used": brokers,
            "topic": target.topic,
            "producer_result": {
                "success": false,
                "note": "Message publishing failed or timed out",
            },
            "steps": probe.log,
        }),

        Outcome::PartialSuccess { .. } => match probe.consumer_error() {
            Some(consumer_error) => json!({
                "status": "partial_success",
                "message": "Kafka producer worked but consumer test failed",
                "broker_used": brokers,
                "topic": target.topic,
                "group_id": target.group_id,
                "producer_result": {
                    "success": true,
                    "published_message": probe.published,
                },
                "consumer_error": consumer_error,
                "steps": probe.log,
            }),
            None => json!({
                "status": "partial_success",
                "message": "Kafka producer successful, but no messages were consumed (this may be normal)",
                "broker_used": brokers,
                "topic": target.topic,
                "group_id": target.group_id,
                "producer_result": {
                    "success": true,
                    "published_message": probe.published,
                },
                "consumer_result": unmatched_consumer_result(probe, target),
                "possible_reasons": probe.outcome.hints(),
                "steps": probe.log,
            }),
        },

        Outcome::Success => json!({
            "status": "success",
            "message": "Kafka producer and consumer test successful",
            "broker_used": brokers,
            "topic": target.topic,
            "group_id": target.group_id,
            "producer_result": {
                "success": true,
                "published_message": probe.published,
                "flush_result": "success",
            },
            "consumer_result": {
                "success": true,
                "messages_consumed": probe.consumed.len(),
                "consumed_messages": probe.consumed,
                "timeout_used": format!("{} seconds", bounds.consume_window.as_secs()),
                "poll_stats": probe.stats,
            },
            "test_summary": {
                "total_messages_published": 1,
                "total_messages_consumed": probe.consumed.len(),
                "round_trip_test": "passed",
            },
            "steps": probe.log,
        }),
    }
}

/// Consumer section when nothing with the message key came back.
fn unmatched_consumer_result(probe: &StreamProbe, target: StreamTarget<'_>) -> Value {
    // ---
    if probe.consumed.is_empty() {
        return json!({
            "success": false,
            "messages_consumed": 0,
            "note": "No messages were available for consumption within the timeout period",
            "poll_stats": probe.stats,
        });
    }
    json!({
        "success": false,
        "messages_consumed": probe.consumed.len(),
        "consumed_messages": probe.consumed,
        "note": format!(
            "Messages were consumed, but none carried the key '{}' within the timeout period",
            target.key
        ),
        "poll_stats": probe.stats,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test/kafka", get(test_kafka))
}
