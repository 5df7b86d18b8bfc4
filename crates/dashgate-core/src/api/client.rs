//! API client for the dashboard backend.
//!
//! Requests that act for a signed-in user carry the access token recovered
//! from the session envelope as a bearer `Authorization` header.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{AuthorizedSession, SessionCredentialPayload, SessionUser};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Content type reported when the file service sends none
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Collections exposed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Users,
    Products,
    Orders,
    Categories,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Users,
        Resource::Products,
        Resource::Orders,
        Resource::Categories,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Products => "products",
            Resource::Orders => "orders",
            Resource::Categories => "categories",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.path().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Successful sign-in exchange: the backend's view of the user plus their token
#[derive(Deserialize)]
pub struct LoginResponse {
    pub user: SessionUser,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

impl fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginResponse")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl From<LoginResponse> for SessionCredentialPayload {
    fn from(login: LoginResponse) -> Self {
        SessionCredentialPayload::new(login.user, login.access_token)
    }
}

/// Bytes fetched from the backend file service, passed through unchanged
#[derive(Debug, Clone)]
pub struct FileResponse {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Backend API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    /// Create a new client for the backend rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a client carrying `token`, sharing the connection pool
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Create a client acting for a verified session
    pub fn for_session(&self, session: &AuthorizedSession) -> Self {
        self.with_token(session.access_token().to_string())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Build a URL under the base from caller-supplied segments.
    /// Each segment is validated and then percent-encoded as a single path segment.
    fn segment_url<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid backend URL {}", self.base_url))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Backend URL {} cannot have a path", self.base_url))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(validate_segment(segment)?);
            }
        }
        Ok(url)
    }

    /// Exchange email and password for the user profile and an access token
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let url = self.url("auth/login");
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to send sign-in request")?;

        let response = Self::check_response(response).await?;
        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse sign-in response")?;

        debug!(user_id = %login.user.id, role = %login.user.role, "Backend accepted sign-in");
        Ok(login)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request built by `build`, backing off and retrying on 429
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?
                .send()
                .await
                .with_context(|| format!("Failed to send request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .send_with_retry(url, || Ok(self.client.get(url).headers(self.auth_headers()?)))
            .await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // ===== Data Fetching Methods =====

    /// Fetch every record of a collection
    pub async fn list(&self, resource: Resource) -> Result<Vec<Value>> {
        let url = self.url(resource.path());
        let records: Vec<Value> = self.get_json(&url).await?;
        debug!(resource = %resource, count = records.len(), "Fetched collection");
        Ok(records)
    }

    /// Fetch one record of a collection by id
    pub async fn get(&self, resource: Resource, id: &str) -> Result<Value> {
        let url = self.segment_url([resource.path(), id])?;
        self.get_json(url.as_str()).await
    }

    /// Proxy a file (typically an image) from the backend file service
    pub async fn fetch_file(&self, path: &str) -> Result<FileResponse> {
        let path = validate_file_path(path)?;
        let url = self.segment_url(std::iter::once("files").chain(path.split('/')))?;

        let response = self
            .send_with_retry(url.as_str(), || {
                Ok(self.client.get(url.clone()).headers(self.auth_headers()?))
            })
            .await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = response
            .bytes()
            .await
            .context("Failed to read file response body")?
            .to_vec();

        debug!(path = path, content_type = %content_type, size = bytes.len(), "Fetched file");
        Ok(FileResponse {
            content_type,
            bytes,
        })
    }
}

/// Validate a relative file path before forwarding it to the file service
fn validate_file_path(path: &str) -> Result<&str, ApiError> {
    if path.is_empty() {
        return Err(ApiError::InvalidPath("path is empty".to_string()));
    }
    if path.starts_with('/') {
        return Err(ApiError::InvalidPath("path must be relative".to_string()));
    }
    for segment in path.split('/') {
        validate_segment(segment)?;
    }
    Ok(path)
}

fn validate_segment(segment: &str) -> Result<&str, ApiError> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(ApiError::InvalidPath(format!("invalid segment {:?}", segment)));
    }
    // '%' is rejected so encoded dot segments like "%2e%2e" cannot slip through
    if segment.contains(['/', '\\', '?', '#', '%']) {
        return Err(ApiError::InvalidPath(format!(
            "segment {:?} contains a reserved character",
            segment
        )));
    }
    Ok(segment)
}
