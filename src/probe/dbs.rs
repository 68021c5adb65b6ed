//! Datastore probe: cache, key/value store and SQL database.
//!
//! Writes a fixed pair to the cache and reads it back, does the same against
//! the KV store, then fetches one row from the test table. Writes are
//! unconditional overwrites so repeated runs never trip over leftover state.
//! An empty table is not an error: `row` is simply `None`.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

use super::{Outcome, Plan, StepLog};
use crate::errors::ProbeError;

pub const CACHE_KEY: &str = "test_cache";
pub const KV_KEY: &str = "test_redis";
pub const TEST_VALUE: &str = "This is a test value";

pub const DBS_PLAN: Plan = Plan {
    primary: "cache_set",
    required: &["cache_get", "kv_set", "kv_get", "db_fetch"],
    secondary: None,
    tolerated_timeouts: &[],
};

/// String key/value store (cache or raw KV).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), ProbeError>;

    /// `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, ProbeError>;
}

/// Source of a single diagnostic row from the SQL database.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// First row of `table` as a JSON object, `Ok(None)` if the table is empty.
    async fn first_row(&self, table: &str) -> Result<Option<Value>, ProbeError>;
}

/// Result of one datastore probe run.
#[derive(Debug)]
pub struct DbsProbe {
    pub log: StepLog,
    pub cache_value: Option<String>,
    pub kv_value: Option<String>,
    pub row: Option<Value>,
    pub outcome: Outcome,
}

// ---

pub async fn run(
    cache: &dyn KvStore,
    kv: &dyn KvStore,
    rows: &dyn RowSource,
    table: &str,
) -> DbsProbe {
    // ---
    let mut probe = DbsProbe {
        log: StepLog::new(),
        cache_value: None,
        kv_value: None,
        row: None,
        outcome: Outcome::Success,
    };

    // Any failure stops the sequence; the failing step is already in the log.
    let _ = sequence(&mut probe, cache, kv, rows, table).await;

    probe.outcome = Outcome::classify(&probe.log, &DBS_PLAN);
    match &probe.outcome {
        Outcome::Error { step, detail, .. } => {
            error!("Datastore probe failed at {:?}: {}", step, detail)
        }
        _ => info!("Datastore probe completed, row present: {}", probe.row.is_some()),
    }
    probe
}

async fn sequence(
    probe: &mut DbsProbe,
    cache: &dyn KvStore,
    kv: &dyn KvStore,
    rows: &dyn RowSource,
    table: &str,
) -> Result<(), ProbeError> {
    // ---
    let log = &mut probe.log;

    log.run("cache_set", cache.set(CACHE_KEY, TEST_VALUE)).await?;
    probe.cache_value = log
        .run_with_value("cache_get", cache.get(CACHE_KEY), |v| Some(json!(v)))
        .await?;

    log.run("kv_set", kv.set(KV_KEY, TEST_VALUE)).await?;
    probe.kv_value = log
        .run_with_value("kv_get", kv.get(KV_KEY), |v| Some(json!(v)))
        .await?;

    probe.row = log
        .run_with_value("db_fetch", rows.first_row(table), |row| {
            Some(json!({ "row_found": row.is_some() }))
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{FixedRows, MemoryStore};

    #[tokio::test]
    async fn test_round_trips_both_stores_and_fetches_row() {
        // ---
        let cache = MemoryStore::default();
        let kv = MemoryStore::default();
        let rows = FixedRows::with_row(json!({"id": 1, "name": "first"}));

        let probe = run(&cache, &kv, &rows, "test").await;

        assert_eq!(probe.outcome, Outcome::Success);
        assert_eq!(probe.cache_value.as_deref(), Some(TEST_VALUE));
        assert_eq!(probe.kv_value.as_deref(), Some(TEST_VALUE));
        assert_eq!(probe.row, Some(json!({"id": 1, "name": "first"})));
        assert_eq!(probe.log.steps().len(), 5);
        assert_eq!(rows.requested_table().as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_empty_table_is_not_an_error() {
        // ---
        let probe = run(
            &MemoryStore::default(),
            &MemoryStore::default(),
            &FixedRows::empty(),
            "test",
        )
        .await;

        assert_eq!(probe.outcome, Outcome::Success);
        assert!(probe.row.is_none());
    }

    #[tokio::test]
    async fn test_repeated_runs_overwrite_leftover_state() {
        // ---
        let cache = MemoryStore::default();
        let kv = MemoryStore::default();
        cache.insert(CACHE_KEY, "stale");
        kv.insert(KV_KEY, "stale");
        let rows = FixedRows::empty();

        for _ in 0..3 {
            let probe = run(&cache, &kv, &rows, "test").await;
            assert_eq!(probe.outcome, Outcome::Success);
            assert_eq!(probe.cache_value.as_deref(), Some(TEST_VALUE));
            assert_eq!(probe.kv_value.as_deref(), Some(TEST_VALUE));
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps_and_keeps_earlier_ones() {
        // ---
        let cache = MemoryStore::default();
        let kv = MemoryStore::failing("redis refused");
        let rows = FixedRows::empty();

        let probe = run(&cache, &kv, &rows, "test").await;

        assert_eq!(probe.cache_value.as_deref(), Some(TEST_VALUE));
        assert!(probe.kv_value.is_none());
        let names: Vec<_> = probe.log.steps().iter().map(|s| s.operation).collect();
        assert_eq!(names, vec!["cache_set", "cache_get", "kv_set"]);
        assert!(rows.requested_table().is_none());
        match probe.outcome {
            Outcome::Error { kind, step, .. } => {
                assert_eq!(kind, ErrorKind::ConnectionFailure);
                assert_eq!(step, Some("kv_set"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
