use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::middleware::extract_user_context;
use crate::AppState;

mod context;
mod dbs;
mod health;
mod kafka;
mod microservice;
mod rabbitmq;

pub use health::{check as health_check, failure_body as health_failure_body};

// ---

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(dbs::router())
        .merge(rabbitmq::router())
        .merge(kafka::router())
        .merge(microservice::router())
        .merge(context::router())
        .merge(health::router())
        .layer(middleware::from_fn(extract_user_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
