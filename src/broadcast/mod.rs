//! Live fan-out of stored probe results to connected observers.
//!
//! The registry owns one bounded channel sender per observer. A broadcast
//! snapshots the current set and offers the record to each sender without
//! waiting: a full buffer drops the event for that observer only, and a closed
//! channel is pruned. Delivery is best-effort with no replay; reconnecting
//! clients catch up through the history endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::ProbeResult;

/// Event name carried by every observer message.
pub const NEW_RESPONSE_EVENT: &str = "newResponse";

/// Per-observer queue depth before events start being dropped.
pub const OBSERVER_BUFFER: usize = 16;

pub type ObserverId = Uuid;
pub type ObserverSink = mpsc::Sender<Arc<ProbeResult>>;

/// Concurrency-safe set of connected observers.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<Mutex<HashMap<ObserverId, ObserverSink>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, ObserverSink>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an observer. Registering an id that is already present keeps the
    /// existing sink and returns `false`.
    pub fn register(&self, id: ObserverId, sink: ObserverSink) -> bool {
        let mut observers = self.lock();
        if observers.contains_key(&id) {
            return false;
        }
        observers.insert(id, sink);
        debug!(observer = %id, total = observers.len(), "Observer registered");
        true
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.lock();
        let removed = observers.remove(&id).is_some();
        if removed {
            debug!(observer = %id, total = observers.len(), "Observer unregistered");
        }
        removed
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Register a fresh observer backed by a bounded channel.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        let id = Uuid::new_v4();
        self.register(id, tx);
        Subscription {
            id,
            receiver: rx,
            registry: self.clone(),
        }
    }

    /// Offer `record` to every observer registered right now. Returns how many
    /// accepted it.
    pub fn broadcast(&self, record: &ProbeResult) -> usize {
        let snapshot: Vec<(ObserverId, ObserverSink)> = self
            .lock()
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect();

        let shared = Arc::new(record.clone());
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sink) in snapshot {
            match sink.try_send(Arc::clone(&shared)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(observer = %id, record = record.id, "Observer queue full, event dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push((id, sink)),
            }
        }

        if !closed.is_empty() {
            let mut observers = self.lock();
            for (id, sink) in closed {
                // Only prune if the id still maps to the dead channel.
                if observers.get(&id).is_some_and(|s| s.same_channel(&sink)) {
                    observers.remove(&id);
                    debug!(observer = %id, "Pruned disconnected observer");
                }
            }
        }

        info!(record = record.id, observers = delivered, event = NEW_RESPONSE_EVENT, "Broadcasted response");
        delivered
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

/// A registered observer's receiving end. Dropping it unregisters.
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<Arc<ProbeResult>>,
    registry: ObserverRegistry,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Next record, or `None` once unregistered and drained.
    pub async fn recv(&mut self) -> Option<Arc<ProbeResult>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<ProbeResult>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
