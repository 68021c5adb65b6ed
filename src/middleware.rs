//! # User Context Middleware
//!
//! Copies the caller identity set by the reverse proxy into request
//! extensions for downstream handlers.
//!
//! TRUST BOUNDARY: `X-User-ID` and `X-User-Email` are accepted as-is. Nothing
//! here verifies, signs or authorizes them; the proxy in front of this
//! service is expected to have authenticated the caller and to strip any
//! client-supplied copies of these headers. Verification belongs in that
//! proxy layer, and adding it here would change observable behavior.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::models::{UserContext, UserEmail, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

impl UserContext {
    /// Build a context only when both headers carry a non-empty value.
    ///
    /// Never yields a half-populated context.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        // ---
        let read = |name: &str| {
            headers
                .get(name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .filter(|v| !v.is_empty())
        };

        Some(Self {
            id: read(USER_ID_HEADER)?,
            email: read(USER_EMAIL_HEADER)?,
        })
    }
}

/// Attach [`UserContext`] plus the [`UserId`]/[`UserEmail`] attributes when
/// both headers are present; otherwise pass the request through untouched.
pub async fn extract_user_context(mut request: Request, next: Next) -> Response {
    // ---
    if let Some(ctx) = UserContext::from_headers(request.headers()) {
        debug!(user_id = %ctx.id, "User context attached");
        let extensions = request.extensions_mut();
        extensions.insert(UserId(ctx.id.clone()));
        extensions.insert(UserEmail(ctx.email.clone()));
        extensions.insert(ctx);
    }

    next.run(request).await
}
