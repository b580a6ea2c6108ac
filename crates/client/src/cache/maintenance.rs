//! Background timers: periodic snapshot writes and expired-entry sweeps.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::TtlCache;

/// Running maintenance tasks. Dropping the handle stops them.
#[derive(Debug)]
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop all maintenance tasks.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn every(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl TtlCache {
    /// Start the cleanup sweep and, when persistence is enabled, the
    /// periodic snapshot writer. Must be called within a Tokio runtime.
    #[must_use]
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        let mut tasks = Vec::with_capacity(2);

        let cache = self.clone();
        let period = self.config().cleanup_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticks = every(period);
            loop {
                ticks.tick().await;
                cache.purge_expired();
            }
        }));

        if self.config().enable_persistence {
            let cache = self.clone();
            let period = self.config().persist_interval;
            tasks.push(tokio::spawn(async move {
                let mut ticks = every(period);
                loop {
                    ticks.tick().await;
                    cache.persist();
                }
            }));
        }

        MaintenanceHandle { tasks }
    }

    /// Persist after `delay`, or right away when no runtime is available.
    pub(super) fn schedule_persist(&self, delay: Duration) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let cache = self.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    cache.persist();
                });
            }
            Err(_) => self.persist(),
        }
    }
}
