use std::time::Duration;

use chrono::Utc;
use outpass_core::scheduler::JobScheduler;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Runs the credential sweep and due cleanup jobs every `interval` until
/// `shutdown` flips to `true`.
pub fn spawn(
    scheduler: JobScheduler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            event_name = "maintenance.loop.started",
            interval_ms = interval.as_millis() as u64,
            "maintenance loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = scheduler.tick(Utc::now()).await {
                        warn!(
                            event_name = "maintenance.sweep.failed",
                            error = %error,
                            "maintenance pass failed; retrying next tick"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "maintenance.loop.stopped", "maintenance loop stopped");
    })
}
