//! Background task that drives a controller on a fixed period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::controller::SessionController;

/// Controller shared between the host and its driver.
pub type SharedController = Arc<Mutex<SessionController>>;

/// Ticks a controller until its attempt ends.
///
/// Saves and syncs run without holding the controller lock so answers keep
/// flowing while I/O is in flight. The task is aborted when the driver is
/// dropped.
pub struct SessionDriver {
    handle: JoinHandle<()>,
}

impl SessionDriver {
    /// Spawns the driver task on the current tokio runtime.
    #[must_use]
    pub fn spawn(controller: SharedController, period: Duration) -> Self {
        let handle = tokio::spawn(run(controller, period));
        Self { handle }
    }

    /// Whether the driver stopped on its own or was aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(controller: SharedController, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let (job, sync, persistence) = {
            let mut guard = controller.lock().await;
            if !guard.state().is_live() {
                debug!(state = %guard.state(), "driver stopping");
                break;
            }

            let report = guard.tick();
            if report.expired() {
                if let Err(err) = guard.on_timer_expired().await {
                    warn!(error = %err, "forced submission failed");
                }
                break;
            }

            let job = if report.save_due { guard.begin_save() } else { None };
            let sync = if report.sync_due { guard.snapshot() } else { None };
            (job, sync, guard.persistence().clone())
        };

        if let Some(job) = job {
            let saved = persistence.save(&job.snapshot).await;
            controller.lock().await.finish_save(job.ticket, saved);
        }
        if let Some(snapshot) = sync {
            persistence.sync_remote(&snapshot).await;
        }
    }
}
