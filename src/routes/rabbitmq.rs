//! `GET /test/rabbitmq`: publish one message and read it back.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::models::iso_now;
use crate::probe::broker::{self, CONSUME_WAIT};
use crate::probe::Outcome;
use crate::AppState;

async fn test_rabbitmq(State(state): State<AppState>) -> Response {
    // ---
    let cfg = &state.config.rabbitmq;
    let message = json!({
        "test": "RabbitMQ connection successful",
        "timestamp": iso_now(),
        "service": state.config.service_name,
    });

    let probe = broker::run(state.broker.as_ref(), &cfg.test_queue, message, CONSUME_WAIT).await;

    // The password is never echoed.
    let connection_details = json!({
        "host": cfg.host,
        "port": cfg.port,
        "user": cfg.user,
    });

    let body = match &probe.outcome {
        Outcome::Error { kind, detail, .. } => json!({
            "status": "error",
            "message": "RabbitMQ connection failed",
            "error": detail,
            "error_kind": kind,
            "connection_details": connection_details,
            "steps": probe.log,
        }),
        _ => json!({
            "status": "success",
            "message": "RabbitMQ connection and message handling successful",
            "connection_details": connection_details,
            "published_message": probe.published,
            "received_message": probe.received,
            "steps": probe.log,
        }),
    };

    (probe.outcome.status_code(), Json(body)).into_response()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test/rabbitmq", get(test_rabbitmq))
}
