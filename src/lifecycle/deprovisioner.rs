use super::error::{ReconcileError, Step};
use super::Remotes;
use crate::clients::ClientError;
use crate::roster::Slug;
use tracing::{debug, info};

/// Deletes are finished once the target is gone, whoever removed it.
fn tolerate_missing(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// Tears down an expired identity, organization first.
#[derive(Clone)]
pub struct Deprovisioner {
    remotes: Remotes,
}

impl Deprovisioner {
    pub fn new(remotes: Remotes) -> Self {
        Self { remotes }
    }

    /// Delete `<slug>-org` (recursively) and then the account.
    ///
    /// If the organization lookup fails the account is left in place, so the
    /// entry stays expired-present and the whole teardown is retried next pass.
    pub async fn deprovision(&self, slug: &Slug) -> Result<(), ReconcileError> {
        let org_name = slug.org_name();
        let platform = &self.remotes.platform;
        let identity = &self.remotes.identity;

        let org = platform
            .find_organization(&org_name)
            .await
            .map_err(ReconcileError::step(slug.as_str(), Step::FindOrganization))?;

        match org {
            Some(org) => {
                tolerate_missing(platform.delete_organization(&org.id, true).await)
                    .map_err(ReconcileError::step(slug.as_str(), Step::DeleteOrganization))?;
                debug!(slug = %slug, org = %org_name, "Deleted organization");
            }
            None => debug!(slug = %slug, org = %org_name, "Organization already absent"),
        }

        let account = identity
            .find_account(slug.as_str())
            .await
            .map_err(ReconcileError::step(slug.as_str(), Step::FindAccount))?;

        match account {
            Some(account) => {
                tolerate_missing(identity.delete_account(&account.id).await)
                    .map_err(ReconcileError::step(slug.as_str(), Step::DeleteAccount))?;
                info!(slug = %slug, account_id = %account.id, "Deprovisioned identity");
            }
            None => info!(slug = %slug, "Account already absent, nothing to delete"),
        }

        Ok(())
    }
}
