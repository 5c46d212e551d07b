//! Usage snippets: where and how a codebase uses a package.
//!
//! Looks for three shapes of usage in every scanned file:
//!
//! - `import pkg` (possibly among other names or with an alias)
//! - `from pkg[.sub] import names`
//! - `pkg.attr(` calls
//!
//! Each hit becomes `File: <path>\n<usage>\n<line and the two following>`.
//! Hits are deduplicated by usage description across the whole corpus.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;

use crate::Error;
use crate::pipeline::{CollaboratorError, SnippetSource};
use crate::sync::scan::{list_files, unit_id_for};

/// Lines after the matched one included in a snippet.
const TRAILING_LINES: usize = 2;

/// Import name of a distribution: lowercase, `-` and `.` become `_`.
pub fn module_name(package: &str) -> String {
    package.trim().to_lowercase().replace(['-', '.'], "_")
}

struct Patterns {
    import: Regex,
    from: Regex,
    call: Regex,
}

impl Patterns {
    fn new(module: &str) -> Result<Self, Error> {
        let m = regex::escape(module);
        let compile = |pattern: String| Regex::new(&pattern).map_err(|e| Error::InvalidInput(e.to_string()));
        Ok(Self {
            import: compile(format!(r"^\s*import\s+(?:[\w.]+(?:\s+as\s+\w+)?\s*,\s*)*{m}(?:\s+as\s+\w+)?\s*(?:,|#|$)"))?,
            from: compile(format!(r"^\s*from\s+({m}(?:\.[\w.]+)?)\s+import\s+(.+?)\s*(?:#.*)?$"))?,
            call: compile(format!(r"\b{m}\.(\w+)\s*\("))?,
        })
    }

    /// Usage descriptions found on one line.
    fn usages(&self, module: &str, line: &str) -> Vec<String> {
        let mut found = Vec::new();
        if self.import.is_match(line) {
            found.push(format!("Import {module}"));
        }
        if let Some(caps) = self.from.captures(line) {
            let names = caps[2].trim_matches(|c| c == '(' || c == ')' || char::is_whitespace(c));
            found.push(format!("From {} import {}", &caps[1], names));
        }
        for caps in self.call.captures_iter(line) {
            found.push(format!("Call {module}.{}()", &caps[1]));
        }
        found
    }
}

/// Collect usage snippets for `package` from the text of one file.
fn scan_text(
    module: &str, patterns: &Patterns, unit_id: &str, text: &str, seen: &mut HashSet<String>, out: &mut Vec<String>,
    max: usize,
) {
    let lines: Vec<&str> = text.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        for usage in patterns.usages(module, line) {
            if out.len() >= max {
                return;
            }
            if !seen.insert(usage.clone()) {
                continue;
            }
            let end = (i + 1 + TRAILING_LINES).min(lines.len());
            let context = lines[i..end].join("\n");
            out.push(format!("File: {unit_id}\n{usage}\n{context}\n"));
        }
    }
}

/// Scans a source tree for package usages.
#[derive(Debug, Clone)]
pub struct UsageScanner {
    root: PathBuf,
    extensions: Vec<String>,
    max_snippets: usize,
}

impl UsageScanner {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>, max_snippets: usize) -> Self {
        Self { root: root.into(), extensions, max_snippets }
    }

    /// Up to `max_snippets` distinct usages of `package`, in file order.
    pub async fn scan(&self, package: &str) -> Result<Vec<String>, Error> {
        let module = module_name(package);
        if module.is_empty() || self.max_snippets == 0 {
            return Ok(Vec::new());
        }
        let patterns = Patterns::new(&module)?;

        let root = self.root.clone();
        let extensions = self.extensions.clone();
        let files = tokio::task::spawn_blocking(move || list_files(&root, &extensions))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let mut seen = HashSet::new();
        let mut snippets = Vec::new();
        for path in files {
            if snippets.len() >= self.max_snippets {
                break;
            }
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let unit_id = unit_id_for(&self.root, &path);
            scan_text(&module, &patterns, &unit_id, &text, &mut seen, &mut snippets, self.max_snippets);
        }

        tracing::debug!(package, snippets = snippets.len(), "collected usage snippets");
        Ok(snippets)
    }
}

#[async_trait]
impl SnippetSource for UsageScanner {
    async fn snippets(&self, package: &str) -> Result<Vec<String>, CollaboratorError> {
        self.scan(package).await.map_err(|e| CollaboratorError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(package: &str, text: &str, max: usize) -> Vec<String> {
        let module = module_name(package);
        let patterns = Patterns::new(&module).unwrap();
        let mut out = Vec::new();
        scan_text(&module, &patterns, "app.py", text, &mut HashSet::new(), &mut out, max);
        out
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name("Email-Validator"), "email_validator");
        assert_eq!(module_name("zope.interface"), "zope_interface");
    }

    #[test]
    fn test_import_forms() {
        let text = "import os, requests\nimport requests as r\nimport requests_toolbelt\n";
        let snippets = collect("requests", text, 10);
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].starts_with("File: app.py\nImport requests\nimport os, requests\n"));
    }

    #[test]
    fn test_from_import_and_calls() {
        let text = "from cachetools import TTLCache, cached  # noqa\nx = 1\ny = 2\nz = 3\ncachetools.keys.hashkey(1)\ncachetools.LRUCache(10)\n";
        let snippets = collect("cachetools", text, 10);
        assert_eq!(
            snippets[0],
            "File: app.py\nFrom cachetools import TTLCache, cached\nfrom cachetools import TTLCache, cached  # noqa\nx = 1\ny = 2\n"
        );
        assert_eq!(snippets[1], "File: app.py\nCall cachetools.LRUCache()\ncachetools.LRUCache(10)\n");
        assert_eq!(snippets.len(), 2);
    }

    #[test]
    fn test_dedup_and_cap() {
        let text = "faker.name()\nfaker.name()\nfaker.email()\nfaker.city()\n";
        let snippets = collect("faker", text, 2);
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].contains("Call faker.name()"));
        assert!(snippets[1].contains("Call faker.email()"));
    }

    #[tokio::test]
    async fn test_scan_corpus_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/a.py"), "import google_auth\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "import google_auth\n").unwrap();

        let scanner = UsageScanner::new(dir.path(), vec!["py".to_string()], 20);
        let snippets = scanner.snippets("google-auth").await.unwrap();

        assert_eq!(snippets, vec!["File: pkg/a.py\nImport google_auth\nimport google_auth\n"]);
    }
}
