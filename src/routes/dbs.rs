//! `GET /test/dbs`: cache, KV store and SQL round trip.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::probe::{dbs, Outcome};
use crate::AppState;

async fn test_dbs(State(state): State<AppState>) -> Response {
    // ---
    let probe = dbs::run(
        state.cache.as_ref(),
        state.kv.as_ref(),
        state.rows.as_ref(),
        &state.config.database.test_table,
    )
    .await;

    match &probe.outcome {
        Outcome::Error { kind, detail, step } => (
            probe.outcome.status_code(),
            Json(json!({
                "status": "error",
                "message": "Datastore test failed",
                "failed_step": step,
                "error": detail,
                "error_kind": kind,
                "steps": probe.log,
            })),
        )
            .into_response(),
        _ => Json(json!({
            "cacheTest": probe.cache_value,
            "redisTest": probe.kv_value,
            "dbTest": probe.row,
            "steps": probe.log,
        }))
        .into_response(),
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test/dbs", get(test_dbs))
}
