//! Simple data models shared by the routes.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

// ---

/// Caller identity copied from trusted proxy headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserContext {
    // ---
    pub id: String,
    pub email: String,
}

/// Attribute-style access to the caller id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Attribute-style access to the caller email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEmail(pub String);

/// Liveness document of the health reporter. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    // ---
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseState {
    Connected,
    Disconnected,
}

/// UTC timestamp with microseconds and a `Z` suffix, used in probe messages.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// UTC timestamp with second precision and an explicit `+00:00` offset.
pub fn iso_now_seconds() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}
