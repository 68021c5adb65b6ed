//! Outcome classification.
//!
//! Maps a finished [`StepLog`] onto `success`, `partial_success` or `error`
//! using the probe's [`Plan`]:
//!
//! - a failed step escalates to `error`, unless it is the secondary step or a
//!   timeout on a step listed in `tolerated_timeouts`;
//! - the primary step and every required step must have succeeded;
//! - a secondary step that failed or never ran degrades to `partial_success`.

use axum::http::StatusCode;

use super::StepLog;
use crate::errors::ErrorKind;

/// Free-form hints attached to a partial success. Not diagnosed automatically.
pub const PARTIAL_SUCCESS_HINTS: [&str; 4] = [
    "Message may have been consumed by another consumer",
    "Consumer group may have different offset settings",
    "Topic may not have retained the message",
    "Timing issue between producer and consumer",
];

/// Which steps of a probe decide its classification.
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    /// Step whose failure always means `error`.
    pub primary: &'static str,
    /// Steps that must have succeeded for anything better than `error`.
    pub required: &'static [&'static str],
    /// Confirmation step; its absence or failure only degrades the outcome.
    pub secondary: Option<&'static str>,
    /// Steps whose timeout is expected and ignored entirely.
    pub tolerated_timeouts: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    PartialSuccess {
        reason: String,
    },
    Error {
        kind: ErrorKind,
        detail: String,
        /// Step that caused the error, when one is known.
        step: Option<&'static str>,
    },
}

impl Outcome {
    // ---
    pub fn classify(log: &StepLog, plan: &Plan) -> Self {
        // ---
        for step in log.steps().iter().filter(|s| !s.succeeded) {
            if Some(step.operation) == plan.secondary {
                continue;
            }
            let tolerated = step.operation != plan.primary
                && step.error_kind == Some(ErrorKind::OperationTimeout)
                && plan.tolerated_timeouts.contains(&step.operation);
            if tolerated {
                continue;
            }
            return Self::Error {
                kind: step.error_kind.unwrap_or(ErrorKind::Unexpected),
                detail: step.error.clone().unwrap_or_default(),
                step: Some(step.operation),
            };
        }

        let must_succeed = std::iter::once(plan.primary).chain(plan.required.iter().copied());
        for operation in must_succeed {
            if !log.succeeded(operation) {
                return Self::Error {
                    kind: ErrorKind::Unexpected,
                    detail: format!("step `{operation}` did not run"),
                    step: Some(operation),
                };
            }
        }

        if let Some(secondary) = plan.secondary {
            match log.get(secondary) {
                Some(step) if step.succeeded => {}
                Some(step) => {
                    return Self::PartialSuccess {
                        reason: step.error.clone().unwrap_or_default(),
                    }
                }
                None => {
                    return Self::PartialSuccess {
                        reason: format!("step `{secondary}` was not attempted"),
                    }
                }
            }
        }

        Self::Success
    }

    /// Value of the `status` field in response bodies.
    pub fn label(&self) -> &'static str {
        // ---
        match self {
            Self::Success => "success",
            Self::PartialSuccess { .. } => "partial_success",
            Self::Error { .. } => "error",
        }
    }

    /// Partial success is informational and still answers 200.
    pub fn status_code(&self) -> StatusCode {
        // ---
        match self {
            Self::Success | Self::PartialSuccess { .. } => StatusCode::OK,
            Self::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn hints(&self) -> &'static [&'static str] {
        // ---
        match self {
            Self::PartialSuccess { .. } => &PARTIAL_SUCCESS_HINTS,
            _ => &[],
        }
    }
}
