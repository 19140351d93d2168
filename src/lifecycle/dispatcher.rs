//! Bounded, per-entry exclusive action dispatch
//!
//! The scheduler never waits on remote work. Each action is spawned onto the
//! runtime, waits for one of `concurrency` permits, and holds its slug in the
//! in-flight set until it finishes. A second submission for a slug that is
//! still running is dropped, so overlapping ticks cannot double-create or
//! double-delete.

use super::executor::ActionExecutor;
use super::state::Action;
use crate::observability::ReconcileMetrics;
use crate::roster::{RosterEntry, Slug};
use crate::telemetry::{create_action_span, generate_correlation_id};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Dispatched,
    AlreadyInFlight,
}

#[derive(Debug, Default)]
struct InFlight {
    slugs: Mutex<HashSet<Slug>>,
    idle: Notify,
}

impl InFlight {
    fn claim(&self, slug: &Slug) -> bool {
        self.slugs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slug.clone())
    }

    fn release(&self, slug: &Slug) {
        let now_empty = {
            let mut slugs = self.slugs.lock().unwrap_or_else(|e| e.into_inner());
            slugs.remove(slug);
            slugs.is_empty()
        };
        if now_empty {
            self.idle.notify_waiters();
        }
    }

    fn len(&self) -> usize {
        self.slugs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn contains(&self, slug: &Slug) -> bool {
        self.slugs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(slug)
    }
}

/// Removes the slug from the in-flight set even if the action panics.
struct ClaimGuard {
    in_flight: Arc<InFlight>,
    slug: Slug,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.in_flight.release(&self.slug);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn ActionExecutor>,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    metrics: Arc<ReconcileMetrics>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn ActionExecutor>, concurrency: usize, metrics: Arc<ReconcileMetrics>) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            in_flight: Arc::new(InFlight::default()),
            metrics,
        }
    }

    /// Queue `action` for `entry` unless that entry already has work running.
    pub fn submit(&self, action: Action, entry: RosterEntry) -> Submission {
        let slug = entry.slug().clone();
        if !self.in_flight.claim(&slug) {
            debug!(slug = %slug, action = %action, "Action already in flight, not dispatching");
            self.metrics.record_in_flight_skip();
            return Submission::AlreadyInFlight;
        }
        self.metrics.record_dispatch();

        let guard = ClaimGuard {
            in_flight: Arc::clone(&self.in_flight),
            slug: slug.clone(),
        };
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let metrics = Arc::clone(&self.metrics);
        let correlation_id = generate_correlation_id();
        let span = create_action_span(action.as_str(), slug.as_str(), &correlation_id);

        tokio::spawn(
            async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire_owned().await else {
                    error!("Worker pool closed, dropping action");
                    metrics.record_action_failure();
                    return;
                };

                let started = Instant::now();
                match executor.execute(action, &entry).await {
                    Ok(()) => {
                        metrics.record_action_success();
                        info!(duration_ms = started.elapsed().as_millis() as u64, "Action completed");
                    }
                    Err(e) => {
                        metrics.record_action_failure();
                        error!(
                            error = %e,
                            step = ?e.failed_step(),
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Action failed, will retry next pass"
                        );
                    }
                }
            }
            .instrument(span),
        );

        Submission::Dispatched
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, slug: &Slug) -> bool {
        self.in_flight.contains(slug)
    }

    /// Wait for all dispatched work to finish. Returns `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let idle = self.in_flight.idle.notified();
                if self.in_flight.len() == 0 {
                    return;
                }
                idle.await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => true,
            Err(_) => {
                info!(remaining = self.in_flight(), "Drain timed out with actions still running");
                false
            }
        }
    }
}
