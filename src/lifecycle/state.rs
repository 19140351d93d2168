//! Lifecycle classification
//!
//! A managed roster entry moves through three time phases (before activation,
//! inside the retention window, after it). Combined with what the remote
//! systems report, the phase decides which of the lifecycle states the entry is
//! in and therefore which action, if any, a pass should dispatch.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Where `now` falls relative to an entry's activation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `now < activation`
    Pending,
    /// `activation <= now < expiry`
    Live,
    /// `now >= expiry`
    Expired,
}

/// Activation time plus the retention window that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub activation: DateTime<Utc>,
    /// `None` when `activation + retention` does not fit in a timestamp.
    pub expiry: Option<DateTime<Utc>>,
}

impl Window {
    pub fn new(activation: DateTime<Utc>, retention: Duration) -> Self {
        let expiry = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| activation.checked_add_signed(retention));
        Self { activation, expiry }
    }

    pub fn phase_at(&self, now: DateTime<Utc>) -> Phase {
        if now < self.activation {
            Phase::Pending
        } else if self.expiry.is_some_and(|expiry| now >= expiry) {
            Phase::Expired
        } else {
            Phase::Live
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No activation timestamp; never acted on
    Unmanaged,
    Pending,
    ActiveCorrect,
    ActiveDrift,
    ExpiredPresent,
    Due,
    ExpiredAbsent,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 7] = [
        LifecycleState::Unmanaged,
        LifecycleState::Pending,
        LifecycleState::ActiveCorrect,
        LifecycleState::ActiveDrift,
        LifecycleState::ExpiredPresent,
        LifecycleState::Due,
        LifecycleState::ExpiredAbsent,
    ];

    /// Classify a managed entry.
    ///
    /// `org_present` is only consulted for a live entry whose account exists;
    /// expiry is decided before any organization check.
    pub fn classify(phase: Phase, account_present: bool, org_present: bool) -> Self {
        match (phase, account_present) {
            (Phase::Pending, _) => LifecycleState::Pending,
            (Phase::Expired, true) => LifecycleState::ExpiredPresent,
            (Phase::Expired, false) => LifecycleState::ExpiredAbsent,
            (Phase::Live, false) => LifecycleState::Due,
            (Phase::Live, true) if org_present => LifecycleState::ActiveCorrect,
            (Phase::Live, true) => LifecycleState::ActiveDrift,
        }
    }

    /// Whether classification needs to ask the platform about the organization.
    pub fn needs_org_probe(phase: Phase, account_present: bool) -> bool {
        phase == Phase::Live && account_present
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            LifecycleState::Due => Some(Action::Provision),
            LifecycleState::ActiveDrift => Some(Action::RepairDrift),
            LifecycleState::ExpiredPresent => Some(Action::Deprovision),
            LifecycleState::Unmanaged
            | LifecycleState::Pending
            | LifecycleState::ActiveCorrect
            | LifecycleState::ExpiredAbsent => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unmanaged => "unmanaged",
            LifecycleState::Pending => "pending",
            LifecycleState::ActiveCorrect => "active-correct",
            LifecycleState::ActiveDrift => "active-drift",
            LifecycleState::ExpiredPresent => "expired-present",
            LifecycleState::Due => "due",
            LifecycleState::ExpiredAbsent => "expired-absent",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Corrective work a pass can dispatch for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Provision,
    RepairDrift,
    Deprovision,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Provision => "provision",
            Action::RepairDrift => "repair-drift",
            Action::Deprovision => "deprovision",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
