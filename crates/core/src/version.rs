//! Release version ordering.
//!
//! Follows the package-index ordering rules closely enough for changelog
//! filtering: numeric release segments compared with zero padding,
//! `.devN` before pre-releases, `aN < bN < rcN` before the final release,
//! `.postN` after it. Local labels (`+...`) are ignored.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^
        v?
        (?P<release>\d+(?:\.\d+)*)
        (?:[-_.]?(?P<pre>a|alpha|b|beta|rc|c|pre|preview)[-_.]?(?P<pre_n>\d*))?
        (?:[-_.]?(?P<post>post|rev|r)[-_.]?(?P<post_n>\d*))?
        (?:[-_.]?(?P<dev>dev)[-_.]?(?P<dev_n>\d*))?
        (?:\+[a-z0-9.]+)?
        $",
    )
    .expect("version pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
}

/// Position of a version relative to its release's final build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

/// A parsed version string.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    release: Vec<u64>,
    phase: Phase,
    post: Option<u64>,
    dev: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized version: {0}")]
pub struct VersionError(pub String);

fn number(value: Option<regex::Match<'_>>) -> u64 {
    value.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let caps = VERSION_RE.captures(trimmed).ok_or_else(|| VersionError(trimmed.to_string()))?;

        let release = caps["release"]
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| VersionError(trimmed.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = caps.name("pre").map(|m| {
            let kind = match m.as_str().to_ascii_lowercase().as_str() {
                "a" | "alpha" => PreKind::Alpha,
                "b" | "beta" => PreKind::Beta,
                _ => PreKind::Rc,
            };
            (kind, number(caps.name("pre_n")))
        });
        let post = caps.name("post").map(|_| number(caps.name("post_n")));
        let dev = caps.name("dev").map(|_| number(caps.name("dev_n")));

        let phase = match (pre, post, dev) {
            (Some((kind, n)), _, _) => Phase::Pre(kind, n),
            (None, None, Some(_)) => Phase::DevOnly,
            _ => Phase::Final,
        };

        Ok(Self { raw: trimmed.to_string(), release, phase, post, dev })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_prerelease(&self) -> bool {
        self.dev.is_some() || matches!(self.phase, Phase::Pre(..))
    }

    fn trimmed_release(&self) -> &[u64] {
        let len = self.release.iter().rposition(|n| *n != 0).map_or(0, |i| i + 1);
        &self.release[..len]
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // A dev marker sorts before the same version without one.
        let dev_key = |v: &Version| match v.dev {
            Some(n) => (0u8, n),
            None => (1u8, 0),
        };
        self.trimmed_release()
            .cmp(other.trimmed_release())
            .then(self.phase.cmp(&other.phase))
            .then(self.post.cmp(&other.post))
            .then(dev_key(self).cmp(&dev_key(other)))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// Whether `latest` is a newer release than `current`.
///
/// Unparseable input falls back to string inequality, so an odd version
/// string is still reported rather than silently treated as up to date.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (Version::parse(latest), Version::parse(current)) {
        (Ok(latest), Ok(current)) => latest > current,
        _ => latest.trim() != current.trim(),
    }
}

/// Whether `candidate` lies in the half-open range `(from, to]`.
pub fn in_range(candidate: &Version, from: &Version, to: &Version) -> bool {
    candidate > from && candidate <= to
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_ordering_chain() {
        let ordered = ["1.0.dev1", "1.0a1.dev1", "1.0a1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0.post1", "1.0.1", "1.1", "2"];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_zero_padding_and_prefix() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("v2.3"), v("2.3.0"));
        assert_eq!(v("1.0+local.7"), v("1.0"));
        assert!(v("1.10") > v("1.9"));
    }

    #[test]
    fn test_spelling_variants() {
        assert_eq!(v("1.0-alpha-1"), v("1.0a1"));
        assert_eq!(v("1.0.RC2"), v("1.0rc2"));
        assert!(v("1.0rc1").is_prerelease());
        assert!(!v("1.0.post2").is_prerelease());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Version::parse("latest").is_err());
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("2.32.3", "2.31.0"));
        assert!(!is_newer("2.31.0", "2.31.0"));
        assert!(!is_newer("2.30", "2.31.0"));
        assert!(is_newer("nightly", "2.31.0"));
        assert!(!is_newer("nightly", "nightly"));
    }

    #[test]
    fn test_in_range_is_half_open() {
        let (from, to) = (v("1.0"), v("1.2"));
        assert!(!in_range(&v("1.0"), &from, &to));
        assert!(in_range(&v("1.1"), &from, &to));
        assert!(in_range(&v("1.2"), &from, &to));
        assert!(!in_range(&v("1.2.1"), &from, &to));
    }
}
