//! Split changelog text at version headings and keep a version range.
//!
//! Recognized headings:
//! - Markdown: `## 1.2.3`, `### [v1.2.3](link) - date`, `# Version 1.2.3`
//! - reStructuredText: a title line starting with a version, followed by an
//!   underline of one repeated punctuation character
//!
//! Headings without a version (`### Bug fixes`) stay in the body of the
//! section they appear in.

use std::collections::HashSet;
use std::sync::LazyLock;

use anjin_core::version::{Version, in_range};
use regex::Regex;

const VERSION_TOKEN: &str =
    r"v?(\d+(?:\.\d+)+(?:[-_.]?(?:alpha|beta|preview|pre|post|rev|dev|rc|a|b|c|r)[-_.]?\d*)*)";

static MARKDOWN_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s{{0,3}}#{{1,6}}\s*\[?\s*(?:(?:version|release)\s+)?{VERSION_TOKEN}"))
        .expect("markdown heading pattern compiles")
});

static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\[?\s*(?:(?:version|release)\s+)?{VERSION_TOKEN}"))
        .expect("title pattern compiles")
});

/// One version's entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub version: String,
    pub body: String,
}

fn is_underline(line: &str) -> bool {
    let line = line.trim_end();
    let mut chars = line.chars();
    match chars.next() {
        Some(first) if "=-~^*+#`'\".:_".contains(first) => line.chars().count() >= 3 && chars.all(|c| c == first),
        _ => false,
    }
}

fn heading_version(line: &str, next: Option<&str>) -> Option<String> {
    if let Some(caps) = MARKDOWN_HEADING.captures(line) {
        return Some(caps[1].to_string());
    }
    if next.is_some_and(is_underline) && !line.trim().is_empty() {
        return TITLE_LINE.captures(line.trim()).map(|caps| caps[1].to_string());
    }
    None
}

fn finish(version: String, lines: &mut Vec<&str>, sections: &mut Vec<Section>) {
    while lines.last().is_some_and(|l| l.trim().is_empty() || is_underline(l)) {
        lines.pop();
    }
    let body = lines.join("\n").trim_matches('\n').to_string();
    sections.push(Section { version, body });
    lines.clear();
}

/// Sections in document order. Text before the first heading is dropped.
pub fn split_sections(text: &str) -> Vec<Section> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut current: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let next = lines.get(i + 1).copied();
        if let Some(version) = heading_version(line, next) {
            if let Some(previous) = current.take() {
                finish(previous, &mut body, &mut sections);
            }
            body.clear();
            current = Some(version);
            let underlined = !MARKDOWN_HEADING.is_match(line);
            i += if underlined { 2 } else { 1 };
            continue;
        }
        if current.is_some() {
            body.push(line);
        }
        i += 1;
    }
    if let Some(previous) = current {
        finish(previous, &mut body, &mut sections);
    }
    sections
}

/// Entries with `from < version <= to`, rendered as `## <version>\n<body>`
/// and joined by blank lines. `None` when nothing falls in the range or the
/// bounds are not versions.
pub fn filter_range(text: &str, from: &str, to: &str) -> Option<String> {
    let (from, to) = match (Version::parse(from), Version::parse(to)) {
        (Ok(from), Ok(to)) => (from, to),
        (from, to) => {
            tracing::debug!(from = ?from.err(), to = ?to.err(), "unparseable version bounds");
            return None;
        }
    };

    let mut seen = HashSet::new();
    let entries: Vec<String> = split_sections(text)
        .into_iter()
        .filter(|section| {
            Version::parse(&section.version).is_ok_and(|v| in_range(&v, &from, &to) && seen.insert(v.to_string()))
        })
        .map(|section| format!("## {}\n{}", section.version, section.body))
        .collect();

    if entries.is_empty() { None } else { Some(entries.join("\n\n")) }
}
