//! HTTP client for the Bitbucket commit build status API.
//!
//! One client exists per monitored job that has credentials. It owns the
//! authentication, proxy and timeout settings, and the CI identity (key and
//! display name) under which statuses appear on the commit.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::error::StatusError;
use super::status_key::StatusKeyCodec;
use crate::types::{BuildState, RepoFullName, Sha};

/// Root of the repositories API.
pub const DEFAULT_API_BASE: &str = "https://bitbucket.org/api/2.0/repositories/";

/// Connect and request timeout for status calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bytes of a rejected response's body kept for the log line.
const MAX_ERROR_BODY: usize = 1024;

/// Username/password (or app password) pair for basic authentication.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An upstream HTTP proxy.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    fn to_reqwest(&self) -> Result<reqwest::Proxy, StatusError> {
        let proxy = reqwest::Proxy::all(format!("http://{}:{}", self.host, self.port)).map_err(
            |source| StatusError::Proxy {
                host: self.host.clone(),
                port: self.port,
                source,
            },
        )?;

        // Proxy authentication only when a username is actually set.
        match self.username.as_deref().map(str::trim) {
            Some(username) if !username.is_empty() => {
                debug!(username, "Using proxy authentication");
                Ok(proxy.basic_auth(username, self.password.as_deref().unwrap_or_default()))
            }
            _ => Ok(proxy),
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Transport settings shared by every status client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root; repository paths are appended to it.
    pub api_base: String,

    /// Bounds both connecting and the whole request.
    pub timeout: Duration,

    pub proxy: Option<ProxyConfig>,
}

/// The CI system as it appears in a commit's build list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiIdentity {
    /// Prefix of every status key.
    pub key: String,

    /// Display name of the status.
    pub name: String,
}

/// One status update for one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Repository holding the commit.
    pub repository: RepoFullName,
    pub revision: Sha,
    pub state: BuildState,
    /// Link shown next to the status.
    pub build_url: String,
    pub description: Option<String>,
    /// Appended to the CI key; usually the job name.
    pub key_extension: String,
}

/// Posts build statuses to `{api_base}{repository}/commit/{revision}/statuses/build`.
#[derive(Clone)]
pub struct StatusClient {
    http: reqwest::Client,
    api_base: String,
    credentials: Credentials,
    ci: CiIdentity,
    codec: StatusKeyCodec,
}

impl StatusClient {
    /// Creates a client with its own connection pool.
    pub fn new(
        config: &ClientConfig,
        credentials: Credentials,
        ci: CiIdentity,
    ) -> Result<Self, StatusError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout);

        if let Some(proxy) = &config.proxy {
            debug!(host = %proxy.host, port = proxy.port, "Using HTTP proxy");
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let http = builder.build().map_err(StatusError::Client)?;
        Ok(Self::with_http_client(http, &config.api_base, credentials, ci))
    }

    /// Creates a client over an existing `reqwest::Client`.
    pub fn with_http_client(
        http: reqwest::Client,
        api_base: &str,
        credentials: Credentials,
        ci: CiIdentity,
    ) -> Self {
        let mut api_base = api_base.to_string();
        if !api_base.ends_with('/') {
            api_base.push('/');
        }

        StatusClient {
            http,
            api_base,
            credentials,
            ci,
            codec: StatusKeyCodec::new(),
        }
    }

    pub fn ci(&self) -> &CiIdentity {
        &self.ci
    }

    /// Endpoint for the build statuses of `revision` in `repository`.
    pub fn status_url(&self, repository: &RepoFullName, revision: &Sha) -> String {
        format!(
            "{}{}/commit/{}/statuses/build",
            self.api_base, repository, revision
        )
    }

    /// Status key for the given extension under this client's CI key.
    pub fn status_key(&self, extension: &str) -> String {
        self.codec.compute_key(&self.ci.key, extension)
    }

    /// Posts one status update.
    ///
    /// Authentication is preemptive basic auth. A non-success answer is
    /// returned as [`StatusError::Rejected`]; no retry is attempted, since a
    /// late retry could overwrite a newer status with a stale one.
    pub async fn post_status(&self, update: &StatusUpdate) -> Result<(), StatusError> {
        let url = self.status_url(&update.repository, &update.revision);
        let key = self.status_key(&update.key_extension);

        let mut form: Vec<(&str, &str)> = Vec::with_capacity(5);
        if let Some(description) = &update.description {
            form.push(("description", description.as_str()));
        }
        form.push(("key", key.as_str()));
        form.push(("name", self.ci.name.as_str()));
        form.push(("state", update.state.as_str()));
        form.push(("url", update.build_url.as_str()));

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .form(&form)
            .send()
            .await
            .map_err(|source| StatusError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = read_capped(response, MAX_ERROR_BODY).await;
            return Err(StatusError::Rejected { status, url, body });
        }

        debug!(
            state = %update.state,
            url = %url,
            key = %key,
            status = %status,
            "Posted build status"
        );
        Ok(())
    }
}

/// Reads at most `limit` bytes of `response`'s body, lossily decoded.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> String {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) | Err(_) => break,
        }
    }
    body.truncate(limit);
    String::from_utf8_lossy(&body).into_owned()
}

impl fmt::Debug for StatusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusClient")
            .field("api_base", &self.api_base)
            .field("ci", &self.ci)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
