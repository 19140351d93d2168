use super::dispatcher::Dispatcher;
use super::error::ReconcileError;
use super::reconciler::{Reconciler, Verdict};
use super::report::PassSummary;
use crate::observability::ReconcileMetrics;
use crate::roster::Roster;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Drives reconciliation passes over an immutable roster snapshot.
pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    dispatcher: Dispatcher,
    roster: Arc<Roster>,
    interval: Duration,
    metrics: Arc<ReconcileMetrics>,
}

impl Scheduler {
    pub fn new(
        reconciler: Arc<Reconciler>,
        dispatcher: Dispatcher,
        roster: Arc<Roster>,
        interval: Duration,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            reconciler,
            dispatcher,
            roster,
            interval,
            metrics,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Classify the roster and dispatch corrective actions without awaiting them.
    pub async fn run_pass(&self) -> Result<PassSummary, ReconcileError> {
        let started = Instant::now();
        self.metrics.record_pass();

        let plan = match self.reconciler.plan_pass(&self.roster).await {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.record_pass_failure();
                error!(error = %e, "Reconciliation pass abandoned, retrying next tick");
                return Err(e);
            }
        };

        let mut summary = PassSummary::from_plan(&plan);
        for entry in &plan.entries {
            if matches!(entry.verdict, Verdict::Unresolved(_)) {
                self.metrics.record_classification_error();
            }
        }
        for (action, entry) in plan.actions() {
            summary.record_submission(self.dispatcher.submit(action, entry.clone()));
        }

        summary.elapsed = started.elapsed();
        summary.log();
        Ok(summary)
    }

    /// Tick until shutdown is signalled. The first pass runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), entries = self.roster.len(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and counted inside run_pass.
                    let _ = self.run_pass().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientError, MockIdentityOperations, MockPlatformOperations, PlatformAccount};
    use crate::lifecycle::executor::MockActionExecutor;
    use crate::lifecycle::reconciler::{FixedClock, LifecyclePolicy};
    use crate::lifecycle::state::Action;
    use crate::lifecycle::Remotes;
    use crate::roster::{Activation, RosterEntry};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler(platform: MockPlatformOperations, executor: MockActionExecutor, interval: Duration) -> (Scheduler, Arc<ReconcileMetrics>) {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let metrics = Arc::new(ReconcileMetrics::new());
        let reconciler = Reconciler::new(
            Remotes::new(Arc::new(MockIdentityOperations::new()), Arc::new(platform)),
            Arc::new(FixedClock::new(t0 + chrono::Duration::minutes(1))),
            LifecyclePolicy::new(Duration::from_secs(86_400)),
        );
        let roster = Roster::new(vec![
            RosterEntry::new("Ann", "Lee", "ann@example.com", Activation::At(t0)).unwrap(),
            RosterEntry::new("Bob", "Ray", "bob@example.com", Activation::Unscheduled).unwrap(),
        ]);
        let dispatcher = Dispatcher::new(Arc::new(executor), 2, metrics.clone());
        (
            Scheduler::new(Arc::new(reconciler), dispatcher, Arc::new(roster), interval, metrics.clone()),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_pass_dispatches_due_entries_only() {
        let mut platform = MockPlatformOperations::new();
        platform.expect_list_accounts().returning(|| Ok(Vec::<PlatformAccount>::new()));
        let mut executor = MockActionExecutor::new();
        executor
            .expect_execute()
            .withf(|action, entry| *action == Action::Provision && entry.slug().as_str() == "alee")
            .times(1)
            .returning(|_, _| Ok(()));

        let (scheduler, metrics) = scheduler(platform, executor, Duration::from_secs(60));
        let summary = scheduler.run_pass().await.unwrap();
        assert!(scheduler.dispatcher().drain(Duration::from_secs(5)).await);

        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.count(crate::lifecycle::LifecycleState::Unmanaged), 1);
        assert_eq!(metrics.get_stats().actions_succeeded, 1);
    }

    #[tokio::test]
    async fn test_listing_failure_counts_failed_pass() {
        let mut platform = MockPlatformOperations::new();
        platform
            .expect_list_accounts()
            .returning(|| Err(ClientError::Network { message: "down".to_string() }));
        let mut executor = MockActionExecutor::new();
        executor.expect_execute().never();

        let (scheduler, metrics) = scheduler(platform, executor, Duration::from_secs(60));
        assert!(scheduler.run_pass().await.is_err());
        assert_eq!(metrics.get_stats().passes_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let listings = Arc::new(AtomicUsize::new(0));
        let counter = listings.clone();
        let mut platform = MockPlatformOperations::new();
        platform.expect_list_accounts().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PlatformAccount {
                id: "acc-1".to_string(),
                username: "alee".to_string(),
            }])
        });
        platform.expect_find_organization().returning(|name| {
            Ok(Some(crate::clients::Organization {
                id: "org-1".to_string(),
                name: name.to_string(),
            }))
        });
        let mut executor = MockActionExecutor::new();
        executor.expect_execute().never();

        let (scheduler, _) = scheduler(platform, executor, Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(rx).await });

        tokio::time::sleep(Duration::from_secs(125)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Immediate first tick, then at 60s and 120s.
        assert_eq!(listings.load(Ordering::SeqCst), 3);
    }
}
