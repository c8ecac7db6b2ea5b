use crate::scheduler::Monitor;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Shortest period the timer accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Running periodic scheduler. Dropping the handle also stops the timer.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the timer. A cycle already in flight runs to completion first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub(crate) fn spawn(monitor: Monitor, every: Duration) -> SchedulerHandle {
    let every = if every < MIN_INTERVAL {
        warn!(requested_ms = every.as_millis() as u64, "Probe interval too small, clamping");
        MIN_INTERVAL
    } else {
        every
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run_scheduler_loop(monitor, every, shutdown_rx));
    SchedulerHandle {
        shutdown_tx: Some(shutdown_tx),
        task,
    }
}

/// Main scheduler execution loop.
/// First tick lands one period after start; late ticks are delayed, not bursted.
async fn run_scheduler_loop(monitor: Monitor, every: Duration, mut shutdown_rx: oneshot::Receiver<()>) {
    info!(interval_secs = every.as_secs_f64(), "Scheduler engine started");

    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = interval.tick() => {
                // Failures are logged inside run_once; the timer keeps going.
                monitor.run_once().await;
            }
        }
    }

    info!("Scheduler engine stopped");
}

#[cfg(test)]
mod tests {
    use crate::testing::{monitor_with, FailingStore, MemoryStore, StubProbe};
    use std::sync::Arc;
    use std::time::Duration;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_per_interval() {
        let store = Arc::new(MemoryStore::default());
        let probe = Arc::new(StubProbe::ok(200, Duration::from_millis(50)));
        let monitor = monitor_with(probe, store.clone());

        let handle = monitor.start(FIVE_MINUTES);

        tokio::time::sleep(FIVE_MINUTES - Duration::from_secs(1)).await;
        assert_eq!(store.appends(), 0, "no probe before the first period elapses");

        tokio::time::sleep(FIVE_MINUTES * 2 + Duration::from_secs(2)).await;
        assert_eq!(store.appends(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_firing_after_probe_failures() {
        let store = Arc::new(MemoryStore::default());
        let probe = Arc::new(StubProbe::failing("connection refused", Duration::from_millis(5)));
        let monitor = monitor_with(probe, store.clone());

        let handle = monitor.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(4_500)).await;

        assert_eq!(store.appends(), 4);
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_firing_after_storage_failures() {
        let probe = Arc::new(StubProbe::ok(200, Duration::from_millis(5)));
        let monitor = monitor_with(probe.clone(), Arc::new(FailingStore));

        let handle = monitor.start(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        assert_eq!(probe.calls(), 3);
        assert!(handle.is_running());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let store = Arc::new(MemoryStore::default());
        let probe = Arc::new(StubProbe::ok(200, Duration::from_secs(2)));
        let monitor = monitor_with(probe.clone(), store.clone());

        let handle = monitor.start(Duration::from_secs(1));
        // Cycle started at t=1s and needs until t=3s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(probe.calls(), 1);
        assert_eq!(store.appends(), 0);

        handle.shutdown().await;

        assert_eq!(store.appends(), 1);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_timer() {
        let store = Arc::new(MemoryStore::default());
        let probe = Arc::new(StubProbe::ok(200, Duration::ZERO));
        let monitor = monitor_with(probe.clone(), store.clone());

        drop(monitor.start(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(probe.calls(), 0);
    }
}
