//! [`AuthApi`] over HTTP.

use std::time::Duration;

use campus_store::UserSnapshot;
use serde::Serialize;
use url::Url;

use crate::{AuthApi, RefreshError, RefreshResponse};

/// Where the auth API lives and how long to wait for it.
#[derive(Debug, Clone)]
pub struct AuthApiConfig {
    refresh_url: Url,
    me_url: Url,
    timeout: Option<Duration>,
}

impl AuthApiConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Derives the endpoint URLs from the API base, e.g.
    /// `https://portal.example/api` → `https://portal.example/api/auth/refresh`.
    ///
    /// # Errors
    /// Returns an error if `base_url` can't carry a path (e.g. `mailto:`).
    pub fn new(mut base_url: Url) -> Result<Self, url::ParseError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            refresh_url: base_url.join("auth/refresh")?,
            me_url: base_url.join("auth/me")?,
            timeout: Some(Self::DEFAULT_TIMEOUT),
        })
    }

    /// Overrides the per-request timeout. `None` waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    pub fn me_url(&self) -> &Url {
        &self.me_url
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// The portal's auth API, reached with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    config: AuthApiConfig,
    http: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(config: AuthApiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (connection pool reuse, proxies, ...).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn config(&self) -> &AuthApiConfig {
        &self.config
    }

    fn apply_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, RefreshError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(RefreshError::Rejected {
            operation,
            status,
            detail,
        })
    }
}

impl AuthApi for HttpAuthApi {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, RefreshError> {
        let request = self
            .http
            .post(self.config.refresh_url.clone())
            .json(&RefreshRequest { refresh_token });
        let response = self.apply_timeout(request).send().await?;
        let response = Self::ensure_success(response, "token refresh").await?;
        let body: RefreshResponse = response.json().await?;
        tracing::debug!(rotated = body.refresh_token.is_some(), "access token refreshed");
        Ok(body)
    }

    async fn me(&self, access_token: &str) -> Result<UserSnapshot, RefreshError> {
        let request = self
            .http
            .get(self.config.me_url.clone())
            .bearer_auth(access_token);
        let response = self.apply_timeout(request).send().await?;
        let response = Self::ensure_success(response, "user lookup").await?;
        Ok(response.json().await?)
    }
}
