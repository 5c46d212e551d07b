//! Shared HTTP fetch client.
//!
//! Every collaborator in this crate goes through [`FetchClient`], so they
//! share one connection pool, one User-Agent, and the same status mapping:
//!
//! - 401/403 → [`ClientError::AuthError`]
//! - 404 → [`ClientError::NotFound`]
//! - 429 → [`ClientError::RateLimited`]
//! - any other 4xx/5xx → [`ClientError::HttpError`]
//! - bodies larger than `max_bytes` → [`ClientError::TooLarge`]

use std::time::{Duration, Instant};

use anjin_core::AppConfig;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use url::Url;

use crate::error::ClientError;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "anjin/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "anjin/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| ct.contains("html"))
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.bytes).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// Map a non-success status to its error.
pub(crate) fn status_error(status: StatusCode, url: &str) -> Option<ClientError> {
    match status.as_u16() {
        s if (200..300).contains(&s) => None,
        401 | 403 => Some(ClientError::AuthError(format!("{status} from {url}"))),
        404 => Some(ClientError::NotFound(url.to_string())),
        429 => Some(ClientError::RateLimited),
        s => Some(ClientError::HttpError { status: s }),
    }
}

/// HTTP client shared by all collaborators.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self { http, config })
    }

    /// Start a GET request; callers add headers and pass it to [`FetchClient::send`].
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url)
    }

    /// Start a POST request.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.http.post(url)
    }

    /// Send a request, enforcing status mapping and the byte limit.
    pub async fn send(&self, request: RequestBuilder) -> Result<FetchResponse, ClientError> {
        let start = Instant::now();
        let response = request.send().await?;

        let status = response.status();
        let final_url = response.url().clone();
        if let Some(err) = status_error(status, final_url.as_str()) {
            tracing::debug!(url = %final_url, status = status.as_u16(), "request failed");
            return Err(err);
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(ClientError::TooLarge { size: len as usize, limit: self.config.max_bytes });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await?;
        if bytes.len() > self.config.max_bytes {
            return Err(ClientError::TooLarge { size: bytes.len(), limit: self.config.max_bytes });
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %final_url, fetch_ms, bytes = bytes.len(), "fetched");

        Ok(FetchResponse { final_url, status, content_type, bytes, fetch_ms })
    }

    /// GET `url` with default headers. Only `http` and `https` URLs are accepted.
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, ClientError> {
        let url = Url::parse(url.trim()).map_err(|e| ClientError::Parse(format!("invalid URL {url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Parse(format!("unsupported scheme: {}", url.scheme())));
        }
        let request = self.get(url.as_str()).header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,text/markdown,text/plain;q=0.9,*/*;q=0.8",
        );
        self.send(request).await
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}
