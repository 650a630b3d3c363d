//! Remote repository gateway.
//!
//! [`RemoteRepositoryService`] is the narrow view of the hosting API used by
//! the sync engine. [`GitHubRepositoryService`] implements it against a
//! GitHub-style REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RemoteError;
use crate::sync::naming::RemoteNaming;
use crate::sync::session::Session;

const PAGE_SIZE: usize = 100;
const MAX_ERROR_BODY: usize = 500;

/// A repository on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub clone_url: String,
    pub html_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository CRUD by name. All calls need a session acquired beforehand.
#[async_trait]
pub trait RemoteRepositoryService: Send + Sync {
    /// Look a repository up by name; `Ok(None)` when it does not exist.
    async fn get_repository(&self, name: &str) -> Result<Option<RepoInfo>, RemoteError>;

    /// Create a repository. Fails if it cannot be created.
    async fn create_repository(&self, name: &str) -> Result<RepoInfo, RemoteError>;

    /// All repositories following the project naming convention.
    async fn list_repositories(&self) -> Result<Vec<RepoInfo>, RemoteError>;
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
    description: &'a str,
}

#[derive(Deserialize)]
struct UserResponse {
    login: String,
}

/// GitHub REST implementation.
pub struct GitHubRepositoryService {
    client: reqwest::Client,
    api_url: String,
    session: Session,
    naming: RemoteNaming,
    private: bool,
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("verso/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
    headers
}

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .default_headers(default_headers())
        .build()
        .unwrap_or_default()
}

/// Map a non-success response onto the sync error policy.
async fn error_from(response: Response) -> RemoteError {
    let status = response.status();
    let rate_limit_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited(body),
        StatusCode::FORBIDDEN if rate_limit_exhausted || body.contains("rate limit") => {
            RemoteError::RateLimited(body)
        }
        StatusCode::FORBIDDEN => RemoteError::Forbidden(body),
        other => RemoteError::Status {
            status: other.as_u16(),
            body,
        },
    }
}

/// Resolve the account name behind a token (`GET /user`).
pub async fn fetch_login(
    client: &reqwest::Client,
    api_url: &str,
    token: &str,
) -> Result<String, RemoteError> {
    let response = client
        .get(format!("{}/user", api_url.trim_end_matches('/')))
        .headers(default_headers())
        .bearer_auth(token)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let user: UserResponse = response.json().await?;
    Ok(user.login)
}

impl GitHubRepositoryService {
    pub fn new(api_url: impl Into<String>, session: Session, naming: RemoteNaming, private: bool) -> Self {
        Self {
            client: build_client(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session,
            naming,
            private,
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.session.token)
    }
}

#[async_trait]
impl RemoteRepositoryService for GitHubRepositoryService {
    async fn get_repository(&self, name: &str) -> Result<Option<RepoInfo>, RemoteError> {
        let url = format!("{}/repos/{}/{}", self.api_url, self.session.login, name);
        let response = self.authed(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(response.json().await?)),
            _ => Err(error_from(response).await),
        }
    }

    async fn create_repository(&self, name: &str) -> Result<RepoInfo, RemoteError> {
        let body = CreateRepoRequest {
            name,
            private: self.private,
            auto_init: false,
            description: "Notes synced by Verso",
        };
        let url = format!("{}/user/repos", self.api_url);
        let response = self.authed(self.client.post(url).json(&body)).send().await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        debug!("Created remote repository {}", name);
        Ok(response.json().await?)
    }

    async fn list_repositories(&self) -> Result<Vec<RepoInfo>, RemoteError> {
        let mut repos = Vec::new();
        for page in 1.. {
            let url = format!("{}/user/repos", self.api_url);
            let request = self.client.get(url).query(&[
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
                ("affiliation", "owner".to_string()),
            ]);
            let response = self.authed(request).send().await?;
            if !response.status().is_success() {
                return Err(error_from(response).await);
            }
            let batch: Vec<RepoInfo> = response.json().await?;
            let done = batch.len() < PAGE_SIZE;
            repos.extend(batch.into_iter().filter(|r| self.naming.matches(&r.name)));
            if done {
                break;
            }
        }
        Ok(repos)
    }
}
