//! Changelog retrieval.
//!
//! ### Sources
//!
//! - **github**: `GET https://api.github.com/repos/{repo}/contents/{path}` with
//!   the raw media type, so the file comes back as-is. An optional token is
//!   sent as a Bearer credential. Requests are spaced by a rate limiter. When
//!   the path is empty or missing from the repository, the conventional file
//!   names in [`CHANGELOG_CANDIDATES`] are tried in order.
//! - **http**: plain GET of the configured URL. HTML pages are reduced to
//!   text first (see [`html`]).
//!
//! Either way the text is then cut down to the requested version range (see
//! [`sections`]). A range with no entries is [`ClientError::NotFound`].

pub mod html;
pub mod sections;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anjin_core::{ChangelogRequest, ChangelogRetriever, CollaboratorError, SourceDescriptor, SourceKind};
use async_trait::async_trait;
use reqwest::header;

use crate::error::ClientError;
use crate::fetch::FetchClient;
use crate::rate_limit::RateLimiter;

pub use sections::{Section, filter_range, split_sections};

const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Minimum interval between GitHub API requests.
const GITHUB_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Changelog file names tried when a GitHub source has no usable path.
pub const CHANGELOG_CANDIDATES: [&str; 10] = [
    "CHANGELOG.md",
    "CHANGELOG.rst",
    "CHANGES.md",
    "CHANGES.rst",
    "HISTORY.md",
    "HISTORY.rst",
    "RELEASES.md",
    "RELEASES.rst",
    "NEWS.md",
    "NEWS.rst",
];

/// Paths to try in a repository: the configured one first, then the candidates.
pub fn candidate_paths(configured: &str) -> Vec<&str> {
    let configured = configured.trim().trim_start_matches('/');
    let mut paths = Vec::with_capacity(CHANGELOG_CANDIDATES.len() + 1);
    if !configured.is_empty() {
        paths.push(configured);
    }
    paths.extend(CHANGELOG_CANDIDATES.iter().copied().filter(|c| *c != configured));
    paths
}

/// First path whose fetch succeeds. Only `NotFound` moves on to the next path.
async fn first_found<'p, F, Fut>(paths: &[&'p str], mut fetch: F) -> Result<(&'p str, String), ClientError>
where
    F: FnMut(&'p str) -> Fut,
    Fut: Future<Output = Result<String, ClientError>>,
{
    for &path in paths {
        match fetch(path).await {
            Ok(text) => return Ok((path, text)),
            Err(ClientError::NotFound(_)) => tracing::debug!(path, "no changelog at path"),
            Err(e) => return Err(e),
        }
    }
    Err(ClientError::NotFound(format!("none of {} candidate paths exist", paths.len())))
}

/// Retrieves and range-filters changelogs from GitHub or plain HTTP.
#[derive(Debug, Clone)]
pub struct ChangelogClient {
    fetch: FetchClient,
    github_api: String,
    github_token: Option<String>,
    github_limiter: Arc<RateLimiter>,
}

impl ChangelogClient {
    pub fn new(fetch: FetchClient, github_token: Option<String>) -> Self {
        Self {
            fetch,
            github_api: DEFAULT_GITHUB_API.to_string(),
            github_token: github_token.filter(|t| !t.trim().is_empty()),
            github_limiter: Arc::new(RateLimiter::new(GITHUB_MIN_INTERVAL)),
        }
    }

    pub fn with_github_api(mut self, base_url: impl Into<String>) -> Self {
        self.github_api = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Contents API URL for a file in a repository.
    pub fn github_url(&self, repo: &str, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.github_api, repo.trim_matches('/'), path.trim_start_matches('/'))
    }

    async fn fetch_github(&self, repo: &str, path: &str) -> Result<String, ClientError> {
        self.github_limiter.acquire().await;

        let url = self.github_url(repo, path);
        let mut request = self
            .fetch
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github.raw+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.github_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(repo, path, "fetching changelog from GitHub");
        Ok(self.fetch.send(request).await?.text())
    }

    async fn fetch_http(&self, url: &str) -> Result<String, ClientError> {
        tracing::debug!(url, "fetching changelog page");
        let response = self.fetch.fetch(url).await?;
        let text = response.text();
        if response.is_html() || html::looks_like_html(&text) {
            Ok(html::html_to_text(&text))
        } else {
            Ok(text)
        }
    }

    /// Raw changelog text for a source, before range filtering.
    pub async fn fetch_raw(&self, source: &SourceDescriptor) -> Result<String, ClientError> {
        match source.kind {
            SourceKind::Github => {
                let Some(repo) = source.repo.as_deref() else {
                    return Err(ClientError::NotFound(format!("no repository configured for {}", source.path)));
                };
                let paths = candidate_paths(&source.path);
                let (path, text) = first_found(&paths, |path| self.fetch_github(repo, path)).await.map_err(|e| match e {
                    ClientError::NotFound(_) => ClientError::NotFound(format!("no changelog file found in {repo}")),
                    other => other,
                })?;
                if path != source.path.trim().trim_start_matches('/') {
                    tracing::info!(repo, path, "discovered changelog file");
                }
                Ok(text)
            }
            SourceKind::Http => self.fetch_http(&source.path).await,
        }
    }

    /// Changelog entries in `(from_version, to_version]`.
    pub async fn fetch_range(&self, request: &ChangelogRequest) -> Result<String, ClientError> {
        let raw = self.fetch_raw(&request.source).await?;
        filter_range(&raw, &request.from_version, &request.to_version).ok_or_else(|| {
            ClientError::NotFound(format!(
                "no changelog entries for {} between {} and {}",
                request.package, request.from_version, request.to_version
            ))
        })
    }
}

#[async_trait]
impl ChangelogRetriever for ChangelogClient {
    async fn retrieve(&self, request: &ChangelogRequest) -> Result<String, CollaboratorError> {
        self.fetch_range(request).await.map_err(CollaboratorError::from)
    }
}
