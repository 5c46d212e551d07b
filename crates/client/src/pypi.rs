//! Package index version lookup.
//!
//! - **Endpoint**: `https://pypi.org/pypi/{package}/json`
//! - **Result**: `info.version`, the latest release
//! - **Miss**: a 404 means the index does not know the package

use anjin_core::{CollaboratorError, VersionLookup};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;

use crate::error::ClientError;
use crate::fetch::FetchClient;

const DEFAULT_BASE_URL: &str = "https://pypi.org";

/// Subset of the project JSON we read.
#[derive(Debug, Deserialize)]
pub struct ProjectResponse {
    pub info: ProjectInfo,
}

#[derive(Debug, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub version: String,
}

/// Version lookup against a PyPI-compatible JSON API.
#[derive(Debug, Clone)]
pub struct PypiClient {
    fetch: FetchClient,
    base_url: String,
}

impl PypiClient {
    pub fn new(fetch: FetchClient) -> Self {
        Self { fetch, base_url: DEFAULT_BASE_URL.to_string() }
    }

    /// Point at a mirror or test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_url(&self, package: &str) -> String {
        format!("{}/pypi/{}/json", self.base_url, package.trim())
    }

    /// Latest release of `package`, `None` when the index has no such project.
    pub async fn latest(&self, package: &str) -> Result<Option<String>, ClientError> {
        let url = self.project_url(package);
        let request = self.fetch.get(&url).header(header::ACCEPT, "application/json");
        let response = match self.fetch.send(request).await {
            Ok(response) => response,
            Err(ClientError::NotFound(_)) => {
                tracing::debug!(package, "package not on index");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let project: ProjectResponse = response.json()?;
        tracing::debug!(package, name = %project.info.name, version = %project.info.version, "latest version");
        Ok(Some(project.info.version))
    }
}

#[async_trait]
impl VersionLookup for PypiClient {
    async fn latest_version(&self, package: &str) -> Result<Option<String>, CollaboratorError> {
        self.latest(package).await.map_err(CollaboratorError::from)
    }
}
