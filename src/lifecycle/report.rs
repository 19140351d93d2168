use super::dispatcher::Submission;
use super::reconciler::{PassPlan, Verdict};
use super::state::LifecycleState;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// What one pass saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub states: BTreeMap<&'static str, usize>,
    pub dispatched: usize,
    pub already_in_flight: usize,
    pub skipped_malformed: usize,
    pub unresolved: usize,
    pub elapsed: Duration,
}

impl PassSummary {
    pub fn from_plan(plan: &PassPlan) -> Self {
        let mut summary = PassSummary::default();
        for entry in &plan.entries {
            match &entry.verdict {
                Verdict::State(state) => *summary.states.entry(state.as_str()).or_default() += 1,
                Verdict::SkippedMalformed => summary.skipped_malformed += 1,
                Verdict::Unresolved(_) => summary.unresolved += 1,
            }
        }
        summary
    }

    pub fn record_submission(&mut self, submission: Submission) {
        match submission {
            Submission::Dispatched => self.dispatched += 1,
            Submission::AlreadyInFlight => self.already_in_flight += 1,
        }
    }

    pub fn count(&self, state: LifecycleState) -> usize {
        self.states.get(state.as_str()).copied().unwrap_or(0)
    }

    pub fn log(&self) {
        info!(
            unmanaged = self.count(LifecycleState::Unmanaged),
            pending = self.count(LifecycleState::Pending),
            active_correct = self.count(LifecycleState::ActiveCorrect),
            active_drift = self.count(LifecycleState::ActiveDrift),
            expired_present = self.count(LifecycleState::ExpiredPresent),
            due = self.count(LifecycleState::Due),
            expired_absent = self.count(LifecycleState::ExpiredAbsent),
            dispatched = self.dispatched,
            already_in_flight = self.already_in_flight,
            skipped = self.skipped_malformed,
            unresolved = self.unresolved,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Reconciliation pass complete"
        );
    }
}
