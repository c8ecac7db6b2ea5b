//! Probe cycle driver: one cycle on demand, or periodically via [`engine`].
//!
//! A cycle is generate -> probe -> append -> broadcast. Cycles never overlap:
//! a single-slot lock serializes the periodic timer and manual triggers.
//! [`Monitor::run_once`] waits for the slot, [`Monitor::try_run_once`] does not.
//!
//! Probe failures are persisted as records with status `0` and an
//! `{"error": ...}` body, then broadcast like any other result. Only a storage
//! failure yields "no result".

pub mod engine;

pub use self::engine::SchedulerHandle;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::broadcast::ObserverRegistry;
use crate::probes::{PayloadGenerator, Probe, ProbeOutcome};
use crate::storage::{NewProbeResult, ProbeResult, ResultStore, StorageError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to store probe result: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to serialize probe payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("a probe cycle is already running")]
    Busy,
}

/// Owns the probe pipeline and its collaborators.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    payloads: PayloadGenerator,
    probe: Arc<dyn Probe>,
    store: Arc<dyn ResultStore>,
    observers: ObserverRegistry,
    cycle_slot: Mutex<()>,
}

impl Monitor {
    pub fn new(
        payloads: PayloadGenerator,
        probe: Arc<dyn Probe>,
        store: Arc<dyn ResultStore>,
        observers: ObserverRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                payloads,
                probe,
                store,
                observers,
                cycle_slot: Mutex::new(()),
            }),
        }
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.inner.observers
    }

    /// History read-back, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<ProbeResult>, StorageError> {
        self.inner.store.recent(limit).await
    }

    /// Run one cycle, waiting for any in-flight cycle to finish first.
    /// `None` means the result could not be stored.
    pub async fn run_once(&self) -> Option<ProbeResult> {
        let _slot = self.inner.cycle_slot.lock().await;
        match self.cycle().await {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Probe cycle aborted: {}", e);
                None
            }
        }
    }

    /// Run one cycle unless another is in flight.
    pub async fn try_run_once(&self) -> Result<ProbeResult, MonitorError> {
        let _slot = self
            .inner
            .cycle_slot
            .try_lock()
            .map_err(|_| MonitorError::Busy)?;
        self.cycle().await
    }

    /// Fire [`Monitor::run_once`] every `every` until the handle is shut down
    /// or dropped.
    pub fn start(&self, every: Duration) -> SchedulerHandle {
        engine::spawn(self.clone(), every)
    }

    async fn cycle(&self) -> Result<ProbeResult, MonitorError> {
        let payload = self.inner.payloads.generate();
        let request_payload = serde_json::to_string(&payload)?;

        let dispatched = Instant::now();
        let outcome = self.inner.probe.execute(&payload).await;
        let response_time = u64::try_from(dispatched.elapsed().as_millis()).unwrap_or(u64::MAX);

        if let ProbeOutcome::Failed { error, .. } = &outcome {
            warn!(response_time_ms = response_time, "Probe failed: {}", error);
        }

        let stored = self
            .inner
            .store
            .append(NewProbeResult {
                request_payload,
                response_data: outcome.response_data(),
                status_code: outcome.status_code(),
                response_time,
            })
            .await?;

        let observers = self.inner.observers.broadcast(&stored);
        info!(
            id = stored.id,
            status = stored.status_code,
            response_time_ms = stored.response_time,
            observers,
            "Probe cycle complete"
        );

        Ok(stored)
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("observers", &self.inner.observers)
            .finish_non_exhaustive()
    }
}
