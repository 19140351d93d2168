//! Platform client (v2-style organization/space API)

use super::auth::{TokenEndpoint, TokenGrant, TokenProvider};
use super::{
    ClientError, NewWorkspace, OrgRole, Organization, PlatformAccount, PlatformOperations,
    Workspace,
};
use crate::config::{HttpConfig, PlatformConfig};
use crate::http::RateLimitedHttpClient;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on followed `next_url` links, so a misbehaving server cannot loop us.
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct Resource<E> {
    metadata: Metadata,
    entity: E,
}

#[derive(Debug, Deserialize)]
struct Page<E> {
    #[serde(default = "Vec::new")]
    resources: Vec<Resource<E>>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrgEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpaceEntity {
    name: String,
    organization_guid: String,
}

#[derive(Debug, Deserialize)]
struct UserEntity {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateOrgRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateSpaceRequest<'a> {
    name: &'a str,
    organization_guid: &'a str,
    manager_guids: &'a [String],
    developer_guids: &'a [String],
}

impl From<Resource<OrgEntity>> for Organization {
    fn from(resource: Resource<OrgEntity>) -> Self {
        Organization {
            id: resource.metadata.guid,
            name: resource.entity.name,
        }
    }
}

fn role_path(role: OrgRole) -> &'static str {
    match role {
        OrgRole::Manager => "managers",
        OrgRole::Member => "users",
    }
}

#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: RateLimitedHttpClient,
    tokens: TokenProvider,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, http_config: &HttpConfig) -> Result<Self, ClientError> {
        let http = RateLimitedHttpClient::new(&config.target, http_config, config.skip_tls_verify)?;
        let endpoint = match config.token_endpoint.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => TokenEndpoint::Fixed(url.to_string()),
            _ => TokenEndpoint::Discover,
        };
        let tokens = TokenProvider::new(
            http.clone(),
            endpoint,
            TokenGrant::Password {
                client_id: config.client_id.clone(),
                client_secret: String::new(),
                username: config.username.clone(),
                password: config.password.clone(),
            },
        );
        Ok(Self { http, tokens })
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.tokens.bearer_token().await?;
        Ok(self.http.request(method, path).bearer_auth(token))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ClientError> {
        self.tokens.guard(self.http.execute(request, resource).await).await
    }

    async fn call_empty(&self, request: RequestBuilder, resource: &str) -> Result<(), ClientError> {
        self.tokens
            .guard(self.http.execute_empty(request, resource).await)
            .await
    }

    /// Follow `next_url` links and collect every resource.
    async fn collect_pages<E: DeserializeOwned>(
        &self,
        first: &str,
        resource: &str,
    ) -> Result<Vec<Resource<E>>, ClientError> {
        let mut items = Vec::new();
        let mut next = Some(first.to_string());
        let mut pages = 0;

        while let Some(path) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(ClientError::InvalidResponse {
                    message: format!("{resource}: more than {MAX_PAGES} pages"),
                });
            }
            let request = self.authorized(Method::GET, &path).await?;
            let page: Page<E> = self.call(request, resource).await?;
            items.extend(page.resources);
            next = page.next_url.filter(|url| !url.is_empty());
        }

        Ok(items)
    }
}

#[async_trait]
impl PlatformOperations for PlatformClient {
    async fn find_organization(&self, name: &str) -> Result<Option<Organization>, ClientError> {
        let request = self
            .authorized(Method::GET, "/v2/organizations")
            .await?
            .query(&[("q", format!("name:{name}"))]);
        let page: Page<OrgEntity> = self.call(request, &format!("org {name}")).await?;

        Ok(page
            .resources
            .into_iter()
            .map(Organization::from)
            .find(|org| org.name == name))
    }

    async fn create_organization(&self, name: &str) -> Result<Organization, ClientError> {
        let request = self
            .authorized(Method::POST, "/v2/organizations")
            .await?
            .json(&CreateOrgRequest { name });
        let created: Resource<OrgEntity> = self.call(request, &format!("org {name}")).await?;
        debug!(org = %name, id = %created.metadata.guid, "Created organization");
        Ok(created.into())
    }

    async fn delete_organization(&self, org_id: &str, recursive: bool) -> Result<(), ClientError> {
        let recursive = if recursive { "true" } else { "false" };
        let request = self
            .authorized(Method::DELETE, &format!("/v2/organizations/{org_id}"))
            .await?
            .query(&[("recursive", recursive), ("async", "false")]);
        self.call_empty(request, &format!("org {org_id}")).await
    }

    async fn bind_org_role(
        &self,
        org_id: &str,
        account_id: &str,
        role: OrgRole,
    ) -> Result<(), ClientError> {
        let path = format!(
            "/v2/organizations/{org_id}/{}/{account_id}",
            role_path(role)
        );
        let request = self.authorized(Method::PUT, &path).await?;
        self.call_empty(request, &format!("org {org_id} {role} binding"))
            .await
    }

    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace, ClientError> {
        let body = CreateSpaceRequest {
            name: &workspace.name,
            organization_guid: &workspace.org_id,
            manager_guids: &workspace.manager_ids,
            developer_guids: &workspace.developer_ids,
        };
        let request = self.authorized(Method::POST, "/v2/spaces").await?.json(&body);
        let created: Resource<SpaceEntity> = self
            .call(request, &format!("space {}", workspace.name))
            .await?;

        Ok(Workspace {
            id: created.metadata.guid,
            name: created.entity.name,
            org_id: created.entity.organization_guid,
        })
    }

    async fn list_accounts(&self) -> Result<Vec<PlatformAccount>, ClientError> {
        let users: Vec<Resource<UserEntity>> = self.collect_pages("/v2/users", "users").await?;

        Ok(users
            .into_iter()
            .filter_map(|user| {
                user.entity.username.map(|username| PlatformAccount {
                    id: user.metadata.guid,
                    username,
                })
            })
            .collect())
    }
}
