//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;

use crate::broadcast::ObserverRegistry;
use crate::clock::SystemClock;
use crate::probes::{PayloadGenerator, Probe, ProbeOutcome, RandomPayload};
use crate::scheduler::Monitor;
use crate::storage::{NewProbeResult, ProbeResult, ResultStore, StorageError};

/// Probe that sleeps for `delay` and returns a canned outcome.
pub struct StubProbe {
    delay: Duration,
    status: Option<u16>,
    error: String,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubProbe {
    pub fn ok(status: u16, delay: Duration) -> Self {
        Self::build(Some(status), String::new(), delay)
    }

    pub fn failing(error: &str, delay: Duration) -> Self {
        Self::build(None, error.to_string(), delay)
    }

    fn build(status: Option<u16>, error: String, delay: Duration) -> Self {
        Self {
            delay,
            status,
            error,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Probe for StubProbe {
    async fn execute(&self, payload: &RandomPayload) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.status {
            Some(status) => ProbeOutcome::Response {
                status,
                body: serde_json::json!({ "json": payload }).to_string(),
                elapsed: self.delay,
            },
            None => ProbeOutcome::Failed {
                error: self.error.clone(),
                elapsed: self.delay,
            },
        }
    }
}

/// In-process store; no blocking pool, so it is safe under paused time.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<ProbeResult>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn appends(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryStore {
    async fn append(&self, record: NewProbeResult) -> Result<ProbeResult, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        let stored = ProbeResult {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            request_payload: record.request_payload,
            response_data: record.response_data,
            status_code: record.status_code,
            response_time: record.response_time,
            timestamp: Utc::now(),
        };
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProbeResult>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }
}

/// Store whose medium is always unavailable.
pub struct FailingStore;

#[async_trait::async_trait]
impl ResultStore for FailingStore {
    async fn append(&self, _record: NewProbeResult) -> Result<ProbeResult, StorageError> {
        Err(StorageError::Sqlite(rusqlite::Error::InvalidQuery))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<ProbeResult>, StorageError> {
        Err(StorageError::Sqlite(rusqlite::Error::InvalidQuery))
    }
}

pub fn monitor_with(probe: Arc<dyn Probe>, store: Arc<dyn ResultStore>) -> Monitor {
    Monitor::new(
        PayloadGenerator::seeded(Arc::new(SystemClock), 11),
        probe,
        store,
        ObserverRegistry::new(),
    )
}
