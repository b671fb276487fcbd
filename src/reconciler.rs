/// Periodic Reconciler: backup flush and block-expiry timers
use log::info;
use std::cell::Cell;
use std::rc::Rc;

use crate::config::TrackerConfig;
use crate::host::{IntervalId, Scheduler, Tick};

#[derive(Debug, Clone, Copy)]
struct Timers {
    backup: IntervalId,
    expiry: IntervalId,
}

/// Owns the two repeating timers; they run only while focus mode is on
pub struct Reconciler {
    scheduler: Rc<dyn Scheduler>,
    backup_interval_ms: u32,
    block_check_interval_ms: u32,
    timers: Cell<Option<Timers>>,
}

impl Reconciler {
    pub fn new(scheduler: Rc<dyn Scheduler>, config: &TrackerConfig) -> Reconciler {
        Reconciler {
            scheduler,
            backup_interval_ms: config.backup_interval_ms,
            block_check_interval_ms: config.block_check_interval_ms,
            timers: Cell::new(None),
        }
    }

    /// Start both timers; does nothing if they already run
    pub fn start(&self, backup: Tick, expiry: Tick) -> bool {
        if self.timers.get().is_some() {
            return false;
        }

        let timers = Timers {
            backup: self.scheduler.every(self.backup_interval_ms, backup),
            expiry: self.scheduler.every(self.block_check_interval_ms, expiry),
        };
        self.timers.set(Some(timers));
        info!(
            "Reconciler started (backup every {}ms, expiry check every {}ms)",
            self.backup_interval_ms, self.block_check_interval_ms
        );
        true
    }

    /// Stop both timers; does nothing if they are not running
    pub fn stop(&self) -> bool {
        let Some(timers) = self.timers.take() else {
            return false;
        };

        self.scheduler.cancel(timers.backup);
        self.scheduler.cancel(timers.expiry);
        info!("Reconciler stopped");
        true
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.timers.get().is_some()
    }
}
