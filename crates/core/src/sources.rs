//! Changelog source registry.
//!
//! Maps a package name to where its changelog lives. Built once at startup
//! and handed to the pipeline; a package with no entry resolves to `None`,
//! which the pipeline reports as `NotFound`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a changelog is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A file inside a GitHub repository; `path` is relative to the repo root.
    Github,
    /// A plain URL; `path` is the full address.
    Http,
}

/// Source descriptor handed to the changelog retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// Empty for a GitHub source means the file name is discovered.
    #[serde(default)]
    pub path: String,
    /// `owner/name`, required for GitHub sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl SourceDescriptor {
    pub fn github(repo: &str, path: &str) -> Self {
        Self { kind: SourceKind::Github, path: path.to_string(), repo: Some(repo.to_string()) }
    }

    /// GitHub source whose changelog file is discovered at fetch time.
    pub fn github_repo(repo: &str) -> Self {
        Self::github(repo, "")
    }

    pub fn http(url: &str) -> Self {
        Self { kind: SourceKind::Http, path: url.to_string(), repo: None }
    }
}

/// Typed `package name -> source descriptor` mapping.
///
/// Keys are normalized the way package indexes compare names: case-insensitive,
/// with runs of `-`, `_` and `.` treated as one separator.
#[derive(Debug, Clone, Default)]
pub struct ChangelogSources {
    entries: BTreeMap<String, SourceDescriptor>,
}

impl ChangelogSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shipped with the tool.
    pub fn builtin() -> Self {
        let mut sources = Self::new();
        sources.insert("cachetools", SourceDescriptor::github("tkem/cachetools", "CHANGELOG.rst"));
        sources.insert("aiomysql", SourceDescriptor::github("aio-libs/aiomysql", "CHANGES.txt"));
        sources.insert("asyncache", SourceDescriptor::github("hephex/asyncache", "CHANGELOG.rst"));
        sources.insert("email-validator", SourceDescriptor::github("JoshData/python-email-validator", "CHANGELOG.md"));
        sources.insert("cryptography", SourceDescriptor::github("pyca/cryptography", "CHANGELOG.rst"));
        sources.insert("faker", SourceDescriptor::github("joke2k/faker", "CHANGELOG.md"));
        sources.insert("ruff", SourceDescriptor::github("astral-sh/ruff", "CHANGELOG.md"));
        sources.insert("google-auth", SourceDescriptor::github("googleapis/google-auth-library-python", "CHANGELOG.md"));
        sources.insert("requests", SourceDescriptor::http("https://raw.githubusercontent.com/psf/requests/main/HISTORY.md"));
        sources.insert("sqlalchemy", SourceDescriptor::http("https://docs.sqlalchemy.org/en/20/changelog/changelog_20.html"));
        sources.insert("alembic", SourceDescriptor::http("https://alembic.sqlalchemy.org/en/latest/changelog.html"));
        sources.insert("fastapi", SourceDescriptor::http("https://fastapi.tiangolo.com/release-notes/"));
        sources
    }

    /// Add or replace the descriptor for a package.
    pub fn insert(&mut self, package: &str, descriptor: SourceDescriptor) {
        self.entries.insert(normalize_package_name(package), descriptor);
    }

    /// Descriptor for a package, `None` when the package has no known source.
    pub fn get(&self, package: &str) -> Option<&SourceDescriptor> {
        self.entries.get(&normalize_package_name(package))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical form of a package name used for lookups.
pub fn normalize_package_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = !out.is_empty();
            continue;
        }
        if pending_sep {
            out.push('-');
            pending_sep = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_package_name() {
        assert_eq!(normalize_package_name("SQLAlchemy"), "sqlalchemy");
        assert_eq!(normalize_package_name("google_auth"), "google-auth");
        assert_eq!(normalize_package_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_package_name("a__-b"), "a-b");
        assert_eq!(normalize_package_name(" ruff "), "ruff");
    }

    #[test]
    fn test_builtin_lookup_is_name_insensitive() {
        let sources = ChangelogSources::builtin();
        let sqlalchemy = sources.get("SQLAlchemy").unwrap();
        assert_eq!(sqlalchemy.kind, SourceKind::Http);

        let auth = sources.get("google_auth").unwrap();
        assert_eq!(auth.kind, SourceKind::Github);
        assert_eq!(auth.repo.as_deref(), Some("googleapis/google-auth-library-python"));
    }

    #[test]
    fn test_unknown_package_is_none() {
        let sources = ChangelogSources::builtin();
        assert!(sources.get("left-pad").is_none());
    }

    #[test]
    fn test_descriptor_serde_shape() {
        let json = r#"{"kind":"github","path":"CHANGES.md","repo":"o/r"}"#;
        let descriptor: SourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor, SourceDescriptor::github("o/r", "CHANGES.md"));

        let http = serde_json::to_string(&SourceDescriptor::http("https://x.test/c.md")).unwrap();
        assert!(!http.contains("repo"));
    }

    #[test]
    fn test_descriptor_without_path() {
        let descriptor: SourceDescriptor = serde_json::from_str(r#"{"kind":"github","repo":"pallets/flask"}"#).unwrap();
        assert_eq!(descriptor, SourceDescriptor::github_repo("pallets/flask"));
        assert!(descriptor.path.is_empty());
    }
}
