//! In-memory stand-in for the identity service and the platform
//!
//! One shared world backs both traits, the way the platform's user list
//! mirrors the identity service's accounts. Every call is recorded so tests
//! can assert on ordering and on the absence of mutations.

#![allow(dead_code)]

use async_trait::async_trait;
use boulder::clients::{
    Account, ClientError, IdentityOperations, NewAccount, NewWorkspace, OrgRole, Organization,
    PlatformAccount, PlatformOperations, Workspace,
};
use boulder::lifecycle::Remotes;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindAccount(String),
    CreateAccount(String),
    DeleteAccount(String),
    FindOrganization(String),
    CreateOrganization(String),
    DeleteOrganization(String),
    BindOrgRole(String, String, OrgRole),
    CreateWorkspace(String),
    ListAccounts,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::FindAccount(_) | Call::FindOrganization(_) | Call::ListAccounts
        )
    }
}

#[derive(Debug, Default)]
struct World {
    accounts: BTreeMap<String, Account>,
    emails: BTreeMap<String, String>,
    orgs: BTreeMap<String, Organization>,
    workspaces: BTreeMap<String, Workspace>,
    bindings: BTreeSet<(String, String, OrgRole)>,
    calls: Vec<Call>,
    failing: HashSet<&'static str>,
    create_account_delay: Option<Duration>,
    next_id: u64,
}

impl World {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.failing.contains(operation) {
            Err(ClientError::Http {
                status: 500,
                message: format!("injected {operation} failure"),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeCloud {
    world: Arc<Mutex<World>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn remotes(&self) -> Remotes {
        Remotes::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    /// Make every call of `operation` fail with a 500 until cleared.
    pub fn fail_on(&self, operation: &'static str) {
        self.world().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.world().failing.clear();
    }

    pub fn delay_account_creation(&self, delay: Duration) {
        self.world().create_account_delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.world().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn reset_calls(&self) {
        self.world().calls.clear();
    }

    pub fn has_account(&self, username: &str) -> bool {
        self.world().accounts.contains_key(username)
    }

    pub fn account_email(&self, username: &str) -> Option<String> {
        self.world().emails.get(username).cloned()
    }

    pub fn has_org(&self, name: &str) -> bool {
        self.world().orgs.contains_key(name)
    }

    pub fn workspace(&self, name: &str) -> Option<Workspace> {
        self.world().workspaces.get(name).cloned()
    }

    pub fn bindings(&self) -> Vec<(String, String, OrgRole)> {
        self.world().bindings.iter().cloned().collect()
    }

    pub fn account_count(&self) -> usize {
        self.world().accounts.len()
    }

    /// Create an account directly, bypassing the reconciler.
    pub fn seed_account(&self, username: &str) -> Account {
        let mut world = self.world();
        let account = Account {
            id: world.id("acc"),
            username: username.to_string(),
        };
        world.accounts.insert(username.to_string(), account.clone());
        account
    }

    /// Delete an organization out-of-band, as an operator might.
    pub fn remove_org(&self, name: &str) {
        let mut world = self.world();
        if let Some(org) = world.orgs.remove(name) {
            world.workspaces.retain(|_, ws| ws.org_id != org.id);
            world.bindings.retain(|(org_id, _, _)| *org_id != org.id);
        }
    }
}

#[async_trait]
impl IdentityOperations for FakeCloud {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, ClientError> {
        let mut world = self.world();
        world.calls.push(Call::FindAccount(username.to_string()));
        world.check("find_account")?;
        Ok(world.accounts.get(username).cloned())
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Account, ClientError> {
        let delay = {
            let mut world = self.world();
            world.calls.push(Call::CreateAccount(account.username.clone()));
            world.check("create_account")?;
            world.create_account_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut world = self.world();
        if world.accounts.contains_key(&account.username) {
            return Err(ClientError::AlreadyExists {
                resource: format!("user {}", account.username),
            });
        }
        let created = Account {
            id: world.id("acc"),
            username: account.username.clone(),
        };
        world.accounts.insert(account.username.clone(), created.clone());
        world.emails.insert(account.username.clone(), account.email.clone());
        Ok(created)
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), ClientError> {
        let mut world = self.world();
        world.calls.push(Call::DeleteAccount(account_id.to_string()));
        world.check("delete_account")?;
        let before = world.accounts.len();
        world.accounts.retain(|_, account| account.id != account_id);
        if world.accounts.len() == before {
            return Err(ClientError::NotFound {
                resource: format!("user {account_id}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformOperations for FakeCloud {
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, ClientError> {
        let mut world = self.world();
        world.calls.push(Call::FindOrganization(name.to_string()));
        world.check("find_organization")?;
        Ok(world.orgs.get(name).cloned())
    }

    async fn create_organization(&self, name: &str) -> Result<Organization, ClientError> {
        let mut world = self.world();
        world.calls.push(Call::CreateOrganization(name.to_string()));
        world.check("create_organization")?;
        if world.orgs.contains_key(name) {
            return Err(ClientError::AlreadyExists {
                resource: format!("org {name}"),
            });
        }
        let org = Organization {
            id: world.id("org"),
            name: name.to_string(),
        };
        world.orgs.insert(name.to_string(), org.clone());
        Ok(org)
    }

    async fn delete_organization(&self, org_id: &str, recursive: bool) -> Result<(), ClientError> {
        let mut world = self.world();
        world.calls.push(Call::DeleteOrganization(org_id.to_string()));
        world.check("delete_organization")?;
        let has_workspaces = world.workspaces.values().any(|ws| ws.org_id == org_id);
        if has_workspaces && !recursive {
            return Err(ClientError::Http {
                status: 400,
                message: "organization has spaces".to_string(),
            });
        }
        world.orgs.retain(|_, org| org.id != org_id);
        world.workspaces.retain(|_, ws| ws.org_id != org_id);
        world.bindings.retain(|(bound_org, _, _)| bound_org != org_id);
        Ok(())
    }

    async fn bind_org_role(&self, org_id: &str, account_id: &str, role: OrgRole) -> Result<(), ClientError> {
        let mut world = self.world();
        world
            .calls
            .push(Call::BindOrgRole(org_id.to_string(), account_id.to_string(), role));
        world.check("bind_org_role")?;
        world
            .bindings
            .insert((org_id.to_string(), account_id.to_string(), role));
        Ok(())
    }

    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace, ClientError> {
        let mut world = self.world();
        world.calls.push(Call::CreateWorkspace(workspace.name.clone()));
        world.check("create_workspace")?;
        if world.workspaces.contains_key(&workspace.name) {
            return Err(ClientError::AlreadyExists {
                resource: format!("space {}", workspace.name),
            });
        }
        let created = Workspace {
            id: world.id("space"),
            name: workspace.name.clone(),
            org_id: workspace.org_id.clone(),
        };
        world.workspaces.insert(workspace.name.clone(), created.clone());
        Ok(created)
    }

    async fn list_accounts(&self) -> Result<Vec<PlatformAccount>, ClientError> {
        let mut world = self.world();
        world.calls.push(Call::ListAccounts);
        world.check("list_accounts")?;
        Ok(world
            .accounts
            .values()
            .map(|account| PlatformAccount {
                id: account.id.clone(),
                username: account.username.clone(),
            })
            .collect())
    }
}
