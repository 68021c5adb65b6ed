//! `GET /test/microservice`: one GET against the configured peer service.
//!
//! The upstream status and body are passed through untouched. Only a
//! transport failure is answered locally, with 502 and the error text.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tracing::{debug, warn};

use crate::AppState;

async fn test_microservice(State(state): State<AppState>) -> Response {
    // ---
    let url = &state.config.upstream.url;

    let upstream = match state.http.get(url).send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("Upstream {} unreachable: {}", url, e);
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let status = upstream.status();
    let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
    debug!("Upstream {} answered {}", url, status);

    match upstream.bytes().await {
        Ok(body) => {
            let mut response = (status, body).into_response();
            if let Some(content_type) = content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            warn!("Upstream {} body could not be read: {}", url, e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test/microservice", get(test_microservice))
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    use crate::routes;
    use crate::testing::test_state;
    use crate::{AppState, Config};

    fn pointing_at(url: String) -> AppState {
        let mut config = Config::default();
        config.upstream.url = url;
        AppState {
            config: Arc::new(config),
            ..test_state()
        }
    }

    async fn spawn_upstream() -> String {
        // ---
        let app = Router::new().route(
            "/",
            get(|| async { (StatusCode::IM_A_TEAPOT, "auth-service says hi") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_upstream_status_and_body_pass_through() {
        // ---
        let state = pointing_at(spawn_upstream().await);

        let response = routes::router(state)
            .oneshot(Request::get("/test/microservice").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"auth-service says hi");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        // ---
        let state = pointing_at("http://127.0.0.1:1".into());

        let response = routes::router(state)
            .oneshot(Request::get("/test/microservice").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
    }
}
