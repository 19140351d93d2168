//! Identity service client (SCIM-style user API)

use super::auth::{TokenEndpoint, TokenGrant, TokenProvider};
use super::{Account, ClientError, IdentityOperations, NewAccount};
use crate::config::{HttpConfig, IdentityConfig};
use crate::http::RateLimitedHttpClient;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest<'a> {
    user_name: &'a str,
    password: &'a str,
    emails: Vec<UserEmail<'a>>,
    name: UserName<'a>,
}

#[derive(Debug, Serialize)]
struct UserEmail<'a> {
    value: &'a str,
    primary: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserName<'a> {
    family_name: &'a str,
    given_name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserResource {
    id: String,
    user_name: String,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    resources: Vec<UserResource>,
}

impl From<UserResource> for Account {
    fn from(user: UserResource) -> Self {
        Account {
            id: user.id,
            username: user.user_name,
        }
    }
}

/// Escape a value for use inside a double-quoted SCIM filter literal.
fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: RateLimitedHttpClient,
    tokens: TokenProvider,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig, http_config: &HttpConfig) -> Result<Self, ClientError> {
        let http = RateLimitedHttpClient::new(&config.target, http_config, config.skip_tls_verify)?;
        let tokens = TokenProvider::new(
            http.clone(),
            TokenEndpoint::Fixed(config.token_endpoint_url()),
            TokenGrant::ClientCredentials {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            },
        );
        Ok(Self { http, tokens })
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.tokens.bearer_token().await?;
        Ok(self.http.request(method, path).bearer_auth(token))
    }
}

#[async_trait]
impl IdentityOperations for IdentityClient {
    async fn find_account(&self, username: &str) -> Result<Option<Account>, ClientError> {
        let filter = format!("userName eq \"{}\"", escape_filter_value(username));
        let request = self
            .authorized(Method::GET, "/Users")
            .await?
            .query(&[("filter", filter.as_str()), ("count", "1")]);

        let result: Result<UserListResponse, _> =
            self.http.execute(request, &format!("user {username}")).await;
        let list = self.tokens.guard(result).await?;

        Ok(list
            .resources
            .into_iter()
            .find(|u| u.user_name == username)
            .map(Account::from))
    }

    async fn create_account(&self, account: &NewAccount) -> Result<Account, ClientError> {
        let body = CreateUserRequest {
            user_name: &account.username,
            password: &account.password,
            emails: vec![UserEmail {
                value: &account.email,
                primary: true,
            }],
            name: UserName {
                family_name: &account.family_name,
                given_name: &account.given_name,
            },
        };
        let request = self.authorized(Method::POST, "/Users").await?.json(&body);

        let result: Result<UserResource, _> = self
            .http
            .execute(request, &format!("user {}", account.username))
            .await;
        let created = self.tokens.guard(result).await?;
        debug!(username = %created.user_name, id = %created.id, "Created identity account");
        Ok(created.into())
    }

    async fn delete_account(&self, account_id: &str) -> Result<(), ClientError> {
        let request = self
            .authorized(Method::DELETE, &format!("/Users/{account_id}"))
            .await?;
        let result = self
            .http
            .execute_empty(request, &format!("user {account_id}"))
            .await;
        self.tokens.guard(result).await
    }
}
