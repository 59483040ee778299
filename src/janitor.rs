//! Periodic housekeeping: drop idle rate windows and expired cache entries.

use crate::config::JanitorConfig;
use crate::handle::Core;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Running janitor task. Dropping the handle leaves the task running until
/// the runtime shuts down; call [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct JanitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "janitor task ended abnormally");
        }
    }
}

/// Spawn the janitor on the current runtime.
pub fn spawn_janitor(core: &Core, config: JanitorConfig) -> JanitorHandle {
    let limiter = core.shared_limiter();
    let cache = core.shared_cache();
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let windows = limiter.sweep(config.rate_batch);
                    let entries = cache.sweep_expired(config.cache_batch);
                    if windows > 0 || entries > 0 {
                        tracing::debug!(windows, entries, "janitor sweep");
                    }
                }
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("janitor stopped");
    });

    JanitorHandle { stop, task }
}
