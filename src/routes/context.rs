//! `GET /test/context`: echo the user context seen after the middleware.

use axum::extract::Request;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use crate::models::{UserContext, UserEmail, UserId};
use crate::AppState;

async fn show_context(request: Request) -> Json<Value> {
    // ---
    let extensions = request.extensions();
    Json(json!({
        "authenticated_user": extensions.get::<UserContext>(),
        "user_id": extensions.get::<UserId>().map(|id| id.0.as_str()),
        "user_email": extensions.get::<UserEmail>().map(|email| email.0.as_str()),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test/context", get(show_context))
}
