// crates/adtrack-validator/src/metrics.rs

//! Validator counters
//!
//! Plain atomics, logged once per cycle through their `Debug` output.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Default)]
pub struct Metrics {
    pub visits_created: AtomicU64,
    pub visits_updated: AtomicU64,
    pub visits_skipped: AtomicU64,
    pub queue_processed: AtomicU64,
    pub queue_not_found: AtomicU64,
    pub queue_errors: AtomicU64,
    pub sales_completed: AtomicU64,
    pub visits_migrated: AtomicU64,
    pub weights_set: AtomicU64,
    pub task_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn increment(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

impl Debug for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Metrics")
            .field("visits_created", &self.visits_created.load(Ordering::Relaxed))
            .field("visits_updated", &self.visits_updated.load(Ordering::Relaxed))
            .field("visits_skipped", &self.visits_skipped.load(Ordering::Relaxed))
            .field("queue_processed", &self.queue_processed.load(Ordering::Relaxed))
            .field("queue_not_found", &self.queue_not_found.load(Ordering::Relaxed))
            .field("queue_errors", &self.queue_errors.load(Ordering::Relaxed))
            .field("sales_completed", &self.sales_completed.load(Ordering::Relaxed))
            .field("visits_migrated", &self.visits_migrated.load(Ordering::Relaxed))
            .field("weights_set", &self.weights_set.load(Ordering::Relaxed))
            .field("task_failures", &self.task_failures.load(Ordering::Relaxed))
            .finish()
    }
}
