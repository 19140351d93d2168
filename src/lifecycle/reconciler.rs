use super::error::{ReconcileError, Step};
use super::state::{Action, LifecycleState, Window};
use super::Remotes;
use crate::config::{InvalidActivationPolicy, LifecycleConfig};
use crate::roster::{Activation, Roster, RosterEntry};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of "now" for classification.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for scenarios and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub retention: Duration,
    pub invalid_activation: InvalidActivationPolicy,
}

impl LifecyclePolicy {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            invalid_activation: InvalidActivationPolicy::default(),
        }
    }

    pub fn from_config(config: &LifecycleConfig) -> anyhow::Result<Self> {
        Ok(Self {
            retention: config.retention_window()?,
            invalid_activation: config.invalid_activation,
        })
    }
}

/// Outcome of classifying a single entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    State(LifecycleState),
    /// Start date could not be parsed and the policy says skip.
    SkippedMalformed,
    /// Classification needed a remote answer that could not be had.
    Unresolved(ReconcileError),
}

#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub entry: RosterEntry,
    pub verdict: Verdict,
}

impl EntryPlan {
    pub fn state(&self) -> Option<LifecycleState> {
        match &self.verdict {
            Verdict::State(state) => Some(*state),
            _ => None,
        }
    }

    pub fn action(&self) -> Option<Action> {
        self.state().and_then(|state| state.action())
    }
}

/// Classification of the whole roster at one instant.
#[derive(Debug, Clone)]
pub struct PassPlan {
    pub now: DateTime<Utc>,
    pub entries: Vec<EntryPlan>,
}

impl PassPlan {
    /// Entries that need corrective work, in roster order.
    pub fn actions(&self) -> impl Iterator<Item = (Action, &RosterEntry)> {
        self.entries
            .iter()
            .filter_map(|plan| plan.action().map(|action| (action, &plan.entry)))
    }
}

/// Decides, for every roster entry, which lifecycle state it is in.
///
/// Only read-only remote calls are made here; mutations belong to the
/// executor the dispatcher runs.
pub struct Reconciler {
    remotes: Remotes,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
}

impl Reconciler {
    pub fn new(remotes: Remotes, clock: Arc<dyn Clock>, policy: LifecyclePolicy) -> Self {
        Self {
            remotes,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Classify every entry of the roster.
    ///
    /// The platform account list is fetched once and shared by all entries;
    /// if it cannot be fetched the pass is abandoned.
    pub async fn plan_pass(&self, roster: &Roster) -> Result<PassPlan, ReconcileError> {
        let now = self.clock.now();

        let accounts: HashSet<String> = self
            .remotes
            .platform
            .list_accounts()
            .await
            .map_err(ReconcileError::AccountListing)?
            .into_iter()
            .map(|account| account.username)
            .collect();
        debug!(accounts = accounts.len(), entries = roster.len(), "Classifying roster");

        let mut entries = Vec::with_capacity(roster.len());
        for entry in roster.entries() {
            let verdict = self.classify_entry(entry, &accounts, now).await;
            entries.push(EntryPlan {
                entry: entry.clone(),
                verdict,
            });
        }

        Ok(PassPlan { now, entries })
    }

    async fn classify_entry(
        &self,
        entry: &RosterEntry,
        accounts: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Verdict {
        let slug = entry.slug();
        let activation = match &entry.activation {
            Activation::Unscheduled => return Verdict::State(LifecycleState::Unmanaged),
            Activation::At(at) => *at,
            Activation::Malformed(raw) => match self.policy.invalid_activation {
                InvalidActivationPolicy::Degrade => {
                    warn!(slug = %slug, date_start = %raw, "Unparsable start date, treating it as the Unix epoch");
                    DateTime::<Utc>::default()
                }
                InvalidActivationPolicy::Skip => {
                    warn!(slug = %slug, date_start = %raw, "Unparsable start date, skipping entry");
                    return Verdict::SkippedMalformed;
                }
            },
        };

        let phase = Window::new(activation, self.policy.retention).phase_at(now);
        let account_present = accounts.contains(slug.as_str());

        let org_present = if LifecycleState::needs_org_probe(phase, account_present) {
            match self.remotes.platform.find_organization(&slug.org_name()).await {
                Ok(org) => org.is_some(),
                Err(source) => {
                    warn!(slug = %slug, error = %source, "Organization probe failed, skipping entry this pass");
                    return Verdict::Unresolved(ReconcileError::Step {
                        slug: slug.to_string(),
                        step: Step::ProbeOrganization,
                        source,
                    });
                }
            }
        } else {
            false
        };

        let state = LifecycleState::classify(phase, account_present, org_present);
        debug!(slug = %slug, ?phase, account_present, org_present, state = %state, "Classified entry");
        Verdict::State(state)
    }
}
