use super::deprovisioner::Deprovisioner;
use super::error::ReconcileError;
use super::provisioner::Provisioner;
use super::state::Action;
use super::Remotes;
use crate::roster::RosterEntry;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Runs one corrective action for one roster entry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: Action, entry: &RosterEntry) -> Result<(), ReconcileError>;
}

/// Routes each action to the provisioner or deprovisioner.
#[derive(Clone)]
pub struct LifecycleExecutor {
    provisioner: Provisioner,
    deprovisioner: Deprovisioner,
}

impl LifecycleExecutor {
    pub fn new(remotes: Remotes, baseline_password: impl Into<String>) -> Self {
        Self {
            provisioner: Provisioner::new(remotes.clone(), baseline_password),
            deprovisioner: Deprovisioner::new(remotes),
        }
    }
}

#[async_trait]
impl ActionExecutor for LifecycleExecutor {
    async fn execute(&self, action: Action, entry: &RosterEntry) -> Result<(), ReconcileError> {
        match action {
            Action::Provision => self.provisioner.provision(entry).await,
            Action::RepairDrift => self.provisioner.repair_drift(entry.slug()).await,
            Action::Deprovision => self.deprovisioner.deprovision(entry.slug()).await,
        }
    }
}
