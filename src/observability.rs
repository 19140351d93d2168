use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters for reconciliation activity, shared by the scheduler and dispatcher.
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    pub passes_run: AtomicU64,
    pub passes_failed: AtomicU64,
    pub actions_dispatched: AtomicU64,
    pub actions_succeeded: AtomicU64,
    pub actions_failed: AtomicU64,
    pub in_flight_skips: AtomicU64,
    pub classification_errors: AtomicU64,
}

impl ReconcileMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self) {
        self.passes_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass_failure(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.actions_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_success(&self) {
        self.actions_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action_failure(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_in_flight_skip(&self) {
        self.in_flight_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification_error(&self) {
        self.classification_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ReconcileStats {
        ReconcileStats {
            passes_run: self.passes_run.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            actions_dispatched: self.actions_dispatched.load(Ordering::Relaxed),
            actions_succeeded: self.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            in_flight_skips: self.in_flight_skips.load(Ordering::Relaxed),
            classification_errors: self.classification_errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            passes_run = stats.passes_run,
            passes_failed = stats.passes_failed,
            actions_dispatched = stats.actions_dispatched,
            actions_succeeded = stats.actions_succeeded,
            actions_failed = stats.actions_failed,
            in_flight_skips = stats.in_flight_skips,
            classification_errors = stats.classification_errors,
            "Reconciliation metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub passes_run: u64,
    pub passes_failed: u64,
    pub actions_dispatched: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub in_flight_skips: u64,
    pub classification_errors: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
