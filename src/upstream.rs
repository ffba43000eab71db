use std::time::Duration;

use anyhow::Context as _;
use reqwest::StatusCode;
use url::Url;

use crate::retry::Retryable;

pub const USER_AGENT: &str = "bookgate/0.1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failure classification. Non-2xx responses are returned
/// raw by [`UpstreamClient::get`]; `Status` is raised by callers that
/// require a success body.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream returned {0}")]
    Status(StatusCode),
    #[error("upstream network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status)
        } else {
            Self::Network(err)
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) => true,
            Self::Status(status) => status.is_server_error(),
        }
    }
}

/// Pure transport against the catalog host: bounded total timeout,
/// identifying client header, pooled connections. No retry or caching
/// lives here.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
}

impl UpstreamClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build upstream http client")?;
        Ok(Self { http, base_url })
    }

    /// Resolves an API path (e.g. `books`) against the configured base.
    pub fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("resolve upstream endpoint: {path}"))
    }

    /// Issues a GET and returns the raw response, including non-2xx.
    /// Fails only on transport-level problems.
    pub async fn get(
        &self,
        url: &Url,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, FetchError> {
        let mut request = self.http.get(url.clone());
        if !params.is_empty() {
            request = request.query(params);
        }
        Ok(request.send().await?)
    }
}
