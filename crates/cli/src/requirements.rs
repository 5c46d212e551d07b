//! Requirements file parsing.
//!
//! Only pinned lines (`name<op>version`) become packages. Options (`-r`,
//! `-e`, `--index-url`), URLs and unpinned names are skipped. A comment
//! containing `anjin:ignore` marks the package ignored.

use std::path::Path;
use std::sync::LazyLock;

use anjin_core::PackageSpec;
use anyhow::Context;
use regex::Regex;

const IGNORE_MARKER: &str = "anjin:ignore";

static REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*(===|==|~=|>=|<=|!=|>|<)\s*([^\s,;]+)")
        .expect("requirement pattern compiles")
});

/// Split a line into its requirement part and its comment, if any.
fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find('#') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

/// One requirements line. `None` for blanks, comments, options and unpinned entries.
pub fn parse_line(line: &str) -> Option<PackageSpec> {
    let (requirement, comment) = split_comment(line);
    let requirement = requirement.trim();
    if requirement.is_empty() || requirement.starts_with('-') {
        return None;
    }

    let Some(caps) = REQUIREMENT.captures(requirement) else {
        tracing::debug!(line = requirement, "skipping unpinned requirement");
        return None;
    };
    let spec = PackageSpec::new(&caps[1], &caps[3]);
    let ignored = comment.is_some_and(|c| c.to_ascii_lowercase().contains(IGNORE_MARKER));
    if ignored { Some(spec.ignored()) } else { Some(spec) }
}

/// Every pinned package in `text`, in file order.
pub fn parse_requirements(text: &str) -> Vec<PackageSpec> {
    text.lines().filter_map(parse_line).collect()
}

/// Read a requirements file, returning its text alongside the parsed packages.
pub fn read_requirements(path: &Path) -> anyhow::Result<(String, Vec<PackageSpec>)> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let packages = parse_requirements(&text);
    Ok((text, packages))
}
