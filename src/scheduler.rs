// src/scheduler.rs
//! Periodic driver for [`Engine::run_scheduled_cycle`].
//!
//! The first cycle fires one interval after start. Each tick spawns its own
//! cycle task, so a tick that lands while the previous cycle is still in
//! flight reaches the engine and is skipped there. The scheduler keeps the
//! handle of the cycle that is actually running, which is the one shutdown
//! waits for.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::{CycleOutcome, Engine};

pub struct PollingScheduler {
    engine: Arc<Engine>,
    interval: Duration,
}

/// Running scheduler. Dropping the handle also stops ticking;
/// [`SchedulerHandle::shutdown`] additionally waits for the last cycle.
pub struct SchedulerHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl PollingScheduler {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(
                target: "scheduler",
                interval_secs = self.interval.as_secs(),
                "polling scheduler started"
            );
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&self.engine);
                        let cycle = tokio::spawn(async move {
                            engine.run_scheduled_cycle().await
                        });
                        if in_flight.as_ref().is_some_and(|running| !running.is_finished()) {
                            debug!(target: "scheduler", "tick while a cycle is in flight");
                        } else {
                            in_flight = Some(cycle);
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Some(cycle) = in_flight {
                match cycle.await {
                    Ok(outcome) => debug!(target: "scheduler", ?outcome, "last cycle drained"),
                    Err(e) => warn!(target: "scheduler", error = %e, "cycle task failed"),
                }
            }
            info!(target: "scheduler", "polling scheduler stopped");
        });
        SchedulerHandle { task, shutdown }
    }
}

impl SchedulerHandle {
    /// Stop ticking and wait for the cycle in flight, if any.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(target: "scheduler", error = %e, "scheduler task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
