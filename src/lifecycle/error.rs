use crate::clients::ClientError;
use std::fmt;
use thiserror::Error;

/// Remote call within a lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ListAccounts,
    ProbeOrganization,
    FindAccount,
    CreateAccount,
    FindOrganization,
    CreateOrganization,
    BindOrgManager,
    BindOrgMember,
    CreateWorkspace,
    DeleteOrganization,
    DeleteAccount,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::ListAccounts => "list accounts",
            Step::ProbeOrganization => "probe organization",
            Step::FindAccount => "find account",
            Step::CreateAccount => "create account",
            Step::FindOrganization => "find organization",
            Step::CreateOrganization => "create organization",
            Step::BindOrgManager => "bind organization manager",
            Step::BindOrgMember => "bind organization member",
            Step::CreateWorkspace => "create workspace",
            Step::DeleteOrganization => "delete organization",
            Step::DeleteAccount => "delete account",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("{step} failed for {slug}: {source}")]
    Step {
        slug: String,
        step: Step,
        #[source]
        source: ClientError,
    },

    /// A resource reported as existing could not be resolved afterwards.
    #[error("{step} for {slug}: {resource} vanished")]
    Vanished {
        slug: String,
        step: Step,
        resource: String,
    },

    #[error("listing platform accounts failed: {0}")]
    AccountListing(#[source] ClientError),
}

impl ReconcileError {
    pub fn step(slug: &str, step: Step) -> impl FnOnce(ClientError) -> ReconcileError + '_ {
        move |source| ReconcileError::Step {
            slug: slug.to_string(),
            step,
            source,
        }
    }

    pub fn failed_step(&self) -> Option<Step> {
        match self {
            ReconcileError::Step { step, .. } | ReconcileError::Vanished { step, .. } => Some(*step),
            ReconcileError::AccountListing(_) => Some(Step::ListAccounts),
        }
    }
}
