//! Remote system abstractions
//!
//! The reconciler only talks to the identity service and the platform through
//! these traits, so lifecycle logic can be exercised against mocks and fakes
//! without any network access.

pub mod auth;
pub mod identity;
pub mod platform;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use auth::{TokenEndpoint, TokenGrant, TokenProvider};
pub use identity::IdentityClient;
pub use platform::PlatformClient;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },
    #[error("{resource} not found")]
    NotFound { resource: String },
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {message}")]
    Network { message: String },
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ClientError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            ClientError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Account in the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub password: String,
}

/// Account as the platform sees it; used for the per-pass existence scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformAccount {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkspace {
    pub name: String,
    pub org_id: String,
    pub manager_ids: Vec<String>,
    pub developer_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrgRole {
    Manager,
    Member,
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrgRole::Manager => f.write_str("manager"),
            OrgRole::Member => f.write_str("member"),
        }
    }
}

/// Identity service operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityOperations: Send + Sync {
    /// Look up an account by its username (the slug)
    async fn find_account(&self, username: &str) -> Result<Option<Account>, ClientError>;

    /// Create an account with a primary e-mail and the baseline password
    async fn create_account(&self, account: &NewAccount) -> Result<Account, ClientError>;

    async fn delete_account(&self, account_id: &str) -> Result<(), ClientError>;
}

/// Platform organization/workspace operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlatformOperations: Send + Sync {
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, ClientError>;

    async fn create_organization(&self, name: &str) -> Result<Organization, ClientError>;

    /// Delete an organization; `recursive` also removes its workspaces
    async fn delete_organization(&self, org_id: &str, recursive: bool) -> Result<(), ClientError>;

    async fn bind_org_role(
        &self,
        org_id: &str,
        account_id: &str,
        role: OrgRole,
    ) -> Result<(), ClientError>;

    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace, ClientError>;

    /// Every account the platform knows about
    async fn list_accounts(&self) -> Result<Vec<PlatformAccount>, ClientError>;
}
