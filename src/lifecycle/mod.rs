//! Roster lifecycle reconciliation
//!
//! A pass classifies every roster entry against the clock and the remote
//! systems ([`reconciler`]), then hands corrective actions to a bounded worker
//! pool ([`dispatcher`]) that runs them through the [`provisioner`] and
//! [`deprovisioner`]. The [`scheduler`] repeats passes on a fixed interval.

pub mod deprovisioner;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod provisioner;
pub mod reconciler;
pub mod report;
pub mod scheduler;
pub mod state;

use crate::clients::{IdentityOperations, PlatformOperations};
use std::sync::Arc;

pub use deprovisioner::Deprovisioner;
pub use dispatcher::{Dispatcher, Submission};
pub use error::{ReconcileError, Step};
pub use executor::{ActionExecutor, LifecycleExecutor};
pub use provisioner::Provisioner;
pub use reconciler::{Clock, EntryPlan, FixedClock, LifecyclePolicy, PassPlan, Reconciler, SystemClock, Verdict};
pub use report::PassSummary;
pub use scheduler::Scheduler;
pub use state::{Action, LifecycleState, Phase, Window};

/// Handles to both remote systems, shared by every component of a pass.
#[derive(Clone)]
pub struct Remotes {
    pub identity: Arc<dyn IdentityOperations>,
    pub platform: Arc<dyn PlatformOperations>,
}

impl Remotes {
    pub fn new(identity: Arc<dyn IdentityOperations>, platform: Arc<dyn PlatformOperations>) -> Self {
        Self { identity, platform }
    }
}
