//! Provisioning and drift repair
//!
//! Both actions end in the same organization/role/workspace sequence. Every
//! step accepts "already exists" from the remote side, so a sequence that
//! failed halfway can simply be run again from the top on the next pass.

use super::error::{ReconcileError, Step};
use super::Remotes;
use crate::clients::{Account, ClientError, NewAccount, NewWorkspace, OrgRole, Organization};
use crate::roster::{RosterEntry, Slug};
use tracing::{debug, info};

/// Treat an "already exists" answer as a completed step.
fn tolerate_existing<T>(result: Result<T, ClientError>) -> Result<Option<T>, ClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_already_exists() => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Clone)]
pub struct Provisioner {
    remotes: Remotes,
    baseline_password: String,
}

impl Provisioner {
    pub fn new(remotes: Remotes, baseline_password: impl Into<String>) -> Self {
        Self {
            remotes,
            baseline_password: baseline_password.into(),
        }
    }

    /// Create the account, then its organization and workspace.
    pub async fn provision(&self, entry: &RosterEntry) -> Result<(), ReconcileError> {
        let slug = entry.slug();
        let account = self.ensure_account(entry).await?;
        self.ensure_org_resources(slug, &account.id).await?;
        info!(slug = %slug, account_id = %account.id, "Provisioned identity");
        Ok(())
    }

    /// Rebuild the organization and workspace for an account that already exists.
    pub async fn repair_drift(&self, slug: &Slug) -> Result<(), ReconcileError> {
        let account = self
            .remotes
            .identity
            .find_account(slug.as_str())
            .await
            .map_err(ReconcileError::step(slug.as_str(), Step::FindAccount))?
            .ok_or_else(|| ReconcileError::Vanished {
                slug: slug.to_string(),
                step: Step::FindAccount,
                resource: format!("account {slug}"),
            })?;

        self.ensure_org_resources(slug, &account.id).await?;
        info!(slug = %slug, account_id = %account.id, "Repaired missing organization");
        Ok(())
    }

    async fn ensure_account(&self, entry: &RosterEntry) -> Result<Account, ReconcileError> {
        let slug = entry.slug();
        let request = NewAccount {
            username: slug.to_string(),
            email: entry.email.clone(),
            given_name: entry.given_name.clone(),
            family_name: entry.family_name.clone(),
            password: self.baseline_password.clone(),
        };

        let created = tolerate_existing(self.remotes.identity.create_account(&request).await)
            .map_err(ReconcileError::step(slug.as_str(), Step::CreateAccount))?;
        if let Some(account) = created {
            return Ok(account);
        }

        debug!(slug = %slug, "Account already exists, resolving it");
        self.remotes
            .identity
            .find_account(slug.as_str())
            .await
            .map_err(ReconcileError::step(slug.as_str(), Step::FindAccount))?
            .ok_or_else(|| ReconcileError::Vanished {
                slug: slug.to_string(),
                step: Step::CreateAccount,
                resource: format!("account {slug}"),
            })
    }

    async fn ensure_organization(&self, slug: &Slug) -> Result<Organization, ReconcileError> {
        let name = slug.org_name();
        let platform = &self.remotes.platform;

        let created = tolerate_existing(platform.create_organization(&name).await)
            .map_err(ReconcileError::step(slug.as_str(), Step::CreateOrganization))?;
        if let Some(org) = created {
            return Ok(org);
        }

        debug!(slug = %slug, org = %name, "Organization already exists, resolving it");
        platform
            .find_organization(&name)
            .await
            .map_err(ReconcileError::step(slug.as_str(), Step::FindOrganization))?
            .ok_or_else(|| ReconcileError::Vanished {
                slug: slug.to_string(),
                step: Step::CreateOrganization,
                resource: format!("organization {name}"),
            })
    }

    async fn ensure_org_resources(&self, slug: &Slug, account_id: &str) -> Result<(), ReconcileError> {
        let platform = &self.remotes.platform;
        let org = self.ensure_organization(slug).await?;

        for (role, step) in [
            (OrgRole::Manager, Step::BindOrgManager),
            (OrgRole::Member, Step::BindOrgMember),
        ] {
            tolerate_existing(platform.bind_org_role(&org.id, account_id, role).await)
                .map_err(ReconcileError::step(slug.as_str(), step))?;
        }

        let workspace = NewWorkspace {
            name: slug.workspace_name(),
            org_id: org.id.clone(),
            manager_ids: vec![account_id.to_string()],
            developer_ids: vec![account_id.to_string()],
        };
        let created = tolerate_existing(platform.create_workspace(&workspace).await)
            .map_err(ReconcileError::step(slug.as_str(), Step::CreateWorkspace))?;
        if created.is_none() {
            debug!(slug = %slug, workspace = %workspace.name, "Workspace already exists");
        }

        Ok(())
    }
}
