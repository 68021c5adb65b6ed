//! In-memory stand-ins for the dependency clients, used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::ProbeError;
use crate::probe::broker::{BrokerConnector, BrokerSession};
use crate::probe::dbs::{KvStore, RowSource};
use crate::probe::stream::{
    ConsumedRecord, PollResult, StreamConnector, StreamPublisher, StreamSubscriber,
};
use crate::state::AppState;
use crate::Config;

// --- key/value and rows

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failure: Option<String>,
}

impl MemoryStore {
    /// A store whose every call fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn check(&self) -> Result<(), ProbeError> {
        match &self.failure {
            Some(message) => Err(ProbeError::connection(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), ProbeError> {
        self.check()?;
        self.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProbeError> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }
}

#[derive(Debug, Default)]
pub struct FixedRows {
    row: Option<Value>,
    requested: Mutex<Option<String>>,
}

impl FixedRows {
    pub fn with_row(row: Value) -> Self {
        Self {
            row: Some(row),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn requested_table(&self) -> Option<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowSource for FixedRows {
    async fn first_row(&self, table: &str) -> Result<Option<Value>, ProbeError> {
        *self.requested.lock().unwrap() = Some(table.to_string());
        Ok(self.row.clone())
    }
}

// --- broker

/// Failures to inject into a [`FakeBroker`].
#[derive(Debug, Clone, Default)]
pub struct BrokerScript {
    pub fail_connect: Option<String>,
    pub fail_declare: Option<String>,
    pub fail_publish: Option<String>,
    pub fail_consume: Option<String>,
    /// Accept publishes but never deliver them back.
    pub swallow_messages: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    queue: VecDeque<Vec<u8>>,
    acked: usize,
    queue_deleted: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
pub struct FakeBroker {
    script: BrokerScript,
    state: Arc<Mutex<BrokerState>>,
}

impl FakeBroker {
    pub fn new(script: BrokerScript) -> Self {
        Self {
            script,
            state: Arc::default(),
        }
    }

    pub fn acked(&self) -> usize {
        self.state.lock().unwrap().acked
    }

    pub fn queue_deleted(&self) -> bool {
        self.state.lock().unwrap().queue_deleted
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

fn scripted(failure: &Option<String>) -> Result<(), ProbeError> {
    match failure {
        Some(message) => Err(ProbeError::remote(message.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, ProbeError> {
        if let Some(message) = &self.script.fail_connect {
            return Err(ProbeError::connection(message.clone()));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl BrokerSession for FakeBroker {
    async fn declare_queue(&mut self, _queue: &str) -> Result<(), ProbeError> {
        scripted(&self.script.fail_declare)
    }

    async fn publish(&mut self, _queue: &str, body: &[u8]) -> Result<(), ProbeError> {
        scripted(&self.script.fail_publish)?;
        if !self.script.swallow_messages {
            self.state.lock().unwrap().queue.push_back(body.to_vec());
        }
        Ok(())
    }

    async fn consume_one(
        &mut self,
        _queue: &str,
        _wait: Duration,
    ) -> Result<Option<Vec<u8>>, ProbeError> {
        scripted(&self.script.fail_consume)?;
        let mut state = self.state.lock().unwrap();
        let delivered = state.queue.pop_front();
        if delivered.is_some() {
            state.acked += 1;
        }
        Ok(delivered)
    }

    async fn delete_queue(&mut self, _queue: &str) -> Result<(), ProbeError> {
        let mut state = self.state.lock().unwrap();
        state.queue.clear();
        state.queue_deleted = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

// --- stream

/// Behaviour of a [`FakeStream`].
#[derive(Debug, Clone, Default)]
pub struct StreamScript {
    /// Results handed out by successive polls; afterwards polls time out.
    pub polls: Vec<PollResult>,
    pub pending_after_flush: usize,
    /// Broker verdict on the produced record, after a clean flush.
    pub fail_delivery: Option<String>,
    pub fail_create_producer: Option<String>,
    pub fail_create_consumer: Option<String>,
    pub fail_subscribe: Option<String>,
}

#[derive(Debug, Default)]
struct StreamState {
    polls: VecDeque<PollResult>,
    produced: Vec<(String, Value)>,
    subscribed_group: Option<String>,
    closed: bool,
}

#[derive(Debug, Clone)]
pub struct FakeStream {
    script: StreamScript,
    state: Arc<Mutex<StreamState>>,
}

impl FakeStream {
    pub fn new(script: StreamScript) -> Self {
        let state = StreamState {
            polls: script.polls.iter().cloned().collect(),
            ..Default::default()
        };
        Self {
            script,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn produced(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().produced.clone()
    }

    pub fn subscribed_group(&self) -> Option<String> {
        self.state.lock().unwrap().subscribed_group.clone()
    }

    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn remaining_polls(&self) -> usize {
        self.state.lock().unwrap().polls.len()
    }
}

impl StreamConnector for FakeStream {
    fn publisher(&self) -> Result<Box<dyn StreamPublisher>, ProbeError> {
        if let Some(message) = &self.script.fail_create_producer {
            return Err(ProbeError::configuration(message.clone()));
        }
        Ok(Box::new(self.clone()))
    }

    fn subscriber(&self, group_id: &str) -> Result<Box<dyn StreamSubscriber>, ProbeError> {
        if let Some(message) = &self.script.fail_create_consumer {
            return Err(ProbeError::configuration(message.clone()));
        }
        Ok(Box::new(FakeSubscriber {
            stream: self.clone(),
            group_id: group_id.to_string(),
        }))
    }
}

#[async_trait]
impl StreamPublisher for FakeStream {
    async fn produce(&self, _topic: &str, key: &str, payload: &[u8]) -> Result<(), ProbeError> {
        let value: Value = serde_json::from_slice(payload).unwrap();
        self.state
            .lock()
            .unwrap()
            .produced
            .push((key.to_string(), value));
        Ok(())
    }

    async fn flush(&self, _wait: Duration) -> Result<usize, ProbeError> {
        Ok(self.script.pending_after_flush)
    }

    async fn confirm(&self, _wait: Duration) -> Result<(), ProbeError> {
        match &self.script.fail_delivery {
            Some(message) => Err(ProbeError::remote(message.clone())),
            None => Ok(()),
        }
    }
}

struct FakeSubscriber {
    stream: FakeStream,
    group_id: String,
}

#[async_trait]
impl StreamSubscriber for FakeSubscriber {
    async fn subscribe(&mut self, _topic: &str) -> Result<(), ProbeError> {
        if let Some(message) = &self.stream.script.fail_subscribe {
            return Err(ProbeError::remote(message.clone()));
        }
        self.stream.state.lock().unwrap().subscribed_group = Some(self.group_id.clone());
        Ok(())
    }

    async fn poll(&mut self, wait: Duration) -> PollResult {
        let next = self.stream.state.lock().unwrap().polls.pop_front();
        match next {
            Some(result) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                result
            }
            None => {
                tokio::time::sleep(wait).await;
                PollResult::TimedOut
            }
        }
    }

    async fn close(&mut self) {
        self.stream.state.lock().unwrap().closed = true;
    }
}

pub fn record(partition: i32, offset: i64, key: &str) -> ConsumedRecord {
    ConsumedRecord {
        partition,
        offset,
        key: Some(key.to_string()),
        payload: json!({"test": "Kafka connection and messaging test"}),
        timestamp: Some(1_760_868_000_000),
        consumed_at: "2026-10-19T10:00:00.000000Z".into(),
    }
}

// --- application state

/// State wired to well-behaved fakes; override fields per test.
pub fn test_state() -> AppState {
    AppState {
        config: Arc::new(Config::default()),
        cache: Arc::new(MemoryStore::default()),
        kv: Arc::new(MemoryStore::default()),
        rows: Arc::new(FixedRows::with_row(json!({"id": 1, "name": "first"}))),
        broker: Arc::new(FakeBroker::new(BrokerScript::default())),
        stream: Arc::new(FakeStream::new(StreamScript::default())),
        http: reqwest::Client::new(),
    }
}
