//! Connectivity probes.
//!
//! A probe is a fixed sequence of operations against one dependency. Each
//! operation runs through a [`StepLog`], which times it and records the result
//! in order. The first failing step aborts the sequence; steps recorded before
//! it stay in the log and are surfaced to the caller. The finished log is
//! handed to [`Outcome::classify`] together with the probe's [`Plan`].
//!
//! Probes never reach for global clients: every dependency is passed in
//! through one of the traits declared in the submodules.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::errors::{ErrorKind, ProbeError};

pub mod broker;
pub mod dbs;
pub mod outcome;
pub mod stream;

pub use outcome::{Outcome, Plan};

// ---

/// One attempted operation of a probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub operation: &'static str,
    pub succeeded: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Ordered record of the steps a probe attempted.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct StepLog {
    steps: Vec<StepResult>,
}

impl StepLog {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` as step `operation`, recording success without a value.
    pub async fn run<T, F>(&mut self, operation: &'static str, op: F) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
    {
        self.run_with_value(operation, op, |_| None).await
    }

    /// Run `op` as step `operation`; `describe` renders the value kept in the log.
    pub async fn run_with_value<T, F, D>(
        &mut self,
        operation: &'static str,
        op: F,
        describe: D,
    ) -> Result<T, ProbeError>
    where
        F: Future<Output = Result<T, ProbeError>>,
        D: FnOnce(&T) -> Option<Value>,
    {
        // ---
        let started = Instant::now();
        let result = op.await;
        let elapsed = started.elapsed();

        match &result {
            Ok(value) => self.push_success(operation, describe(value), elapsed),
            Err(err) => self.push_failure(operation, err, elapsed),
        }
        result
    }

    pub fn push_success(&mut self, operation: &'static str, value: Option<Value>, elapsed: Duration) {
        // ---
        debug!(operation, elapsed_ms = elapsed.as_millis() as u64, "probe step succeeded");
        self.steps.push(StepResult {
            operation,
            succeeded: true,
            duration_ms: elapsed.as_millis() as u64,
            value,
            error: None,
            error_kind: None,
        });
    }

    pub fn push_failure(&mut self, operation: &'static str, err: &ProbeError, elapsed: Duration) {
        // ---
        debug!(operation, elapsed_ms = elapsed.as_millis() as u64, error = %err, "probe step failed");
        self.steps.push(StepResult {
            operation,
            succeeded: false,
            duration_ms: elapsed.as_millis() as u64,
            value: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        });
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Last recorded attempt of `operation`.
    pub fn get(&self, operation: &str) -> Option<&StepResult> {
        self.steps.iter().rev().find(|s| s.operation == operation)
    }

    pub fn succeeded(&self, operation: &str) -> bool {
        self.get(operation).is_some_and(|s| s.succeeded)
    }
}
