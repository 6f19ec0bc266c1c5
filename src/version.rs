//! Version parsing and ordering.
//!
//! Versions look like `v1.2.3` or `1.2.3-beta.1`. Pre-release tags are
//! compared as plain strings, which is simpler than full semver precedence
//! (`1.0.0-beta.10` sorts before `1.0.0-beta.2`). Release tags in the feed
//! are expected to keep their pre-release identifiers sortable.
//!
//! The sentinels `""` and `"unknown"` (and anything else that does not look
//! like a version, e.g. `"dev-uncommitted"`) order below every well-formed
//! version and equal to each other.

use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A parsed `major.minor.patch[-prerelease]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
    /// Pre-release tag without the leading `-`; empty for stable releases.
    pub prerelease: String,
}

impl Version {
    /// Create a stable version.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: String::new(),
        }
    }

    /// Parse a strict `[v]N.N.N[-prerelease]` string.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidVersion`] for anything else, including
    /// the empty string.
    pub fn parse(input: &str) -> Result<Self> {
        parse_components(input, true).ok_or_else(|| UpdateError::InvalidVersion(input.to_owned()))
    }

    /// Returns `true` when a pre-release tag is present.
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    /// Classify the pre-release tag.
    pub fn prerelease_type(&self) -> PrereleaseType {
        PrereleaseType::from_tag(&self.prerelease)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.is_prerelease() {
            write!(f, "-{}", self.prerelease)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.is_prerelease(), other.is_prerelease()) {
                (false, false) => Ordering::Equal,
                (false, true) => Ordering::Greater,
                (true, false) => Ordering::Less,
                (true, true) => self.prerelease.cmp(&other.prerelease),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Kind of pre-release, as shown to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrereleaseType {
    /// Stable release.
    #[default]
    #[serde(rename = "")]
    None,
    /// `-alpha…`
    Alpha,
    /// `-beta…`
    Beta,
    /// `-rc…`
    Rc,
}

impl PrereleaseType {
    /// Classify a pre-release tag (`"beta.2"` → `Beta`). Unknown tags map to
    /// `None`.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        if tag.contains("alpha") {
            Self::Alpha
        } else if tag.contains("beta") {
            Self::Beta
        } else if tag.starts_with("rc") || tag.contains(".rc") || tag.contains("-rc") {
            Self::Rc
        } else {
            Self::None
        }
    }

    /// String form used in `UpdateInfo` (`""` for stable).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Rc => "rc",
        }
    }
}

impl fmt::Display for PrereleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order two version strings.
///
/// Missing numeric components count as `0` (`"1.2"` equals `"1.2.0"`).
/// Strings that do not parse are treated as the `"unknown"` sentinel.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse_components(a, false), parse_components(b, false)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Returns `true` if `candidate` orders strictly after `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Strip whitespace and ensure a single leading `v`.
pub fn normalize(version: &str) -> String {
    let compact: String = version.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('v') {
        compact
    } else {
        format!("v{compact}")
    }
}

/// Returns `true` if the string parses and carries a pre-release tag.
pub fn is_prerelease(version: &str) -> bool {
    Version::parse(version.trim()).is_ok_and(|v| v.is_prerelease())
}

fn parse_components(input: &str, strict: bool) -> Option<Version> {
    let body = input.strip_prefix('v').unwrap_or(input);
    if body.is_empty() {
        return None;
    }

    let (core, prerelease) = match body.split_once('-') {
        Some((core, pre)) => {
            if !is_valid_prerelease(pre) {
                return None;
            }
            (core, pre)
        }
        None => (body, ""),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let expected_len = if strict { 3..=3 } else { 1..=3 };
    if !expected_len.contains(&parts.len()) {
        return None;
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    Some(Version {
        major: numbers[0],
        minor: numbers[1],
        patch: numbers[2],
        prerelease: prerelease.to_owned(),
    })
}

fn is_valid_prerelease(pre: &str) -> bool {
    !pre.is_empty()
        && pre.split('.').all(|ident| {
            !ident.is_empty() && ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parse_accepts_optional_v_prefix() {
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(Version::parse("v1.2.3").unwrap(), Version::new(1, 2, 3));
    }

    #[test]
    fn parse_keeps_prerelease() {
        let v = Version::parse("v1.2.3-beta.1").unwrap();
        assert_eq!(v.prerelease, "beta.1");
        assert!(v.is_prerelease());
        assert_eq!(v.prerelease_type(), PrereleaseType::Beta);
        assert_eq!(v.to_string(), "1.2.3-beta.1");
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in ["", "v", "1.2", "1.2.3.4", "a.b.c", "1.2.3-", "1..3", "v1.2.3-beta..1", " 1.2.3"] {
            assert!(
                matches!(Version::parse(bad), Err(UpdateError::InvalidVersion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn stable_beats_prerelease_with_same_core() {
        assert_eq!(compare("1.0.0-alpha", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.0.0-rc.1"), Ordering::Greater);
    }

    #[test]
    fn prerelease_tags_compare_as_strings() {
        assert_eq!(compare("1.0.0-alpha", "1.0.0-beta"), Ordering::Less);
        // Plain string ordering, not numeric identifier precedence.
        assert_eq!(compare("1.0.0-beta.10", "1.0.0-beta.2"), Ordering::Less);
    }

    #[test]
    fn missing_components_are_zero() {
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare("2", "1.9.9"), Ordering::Greater);
    }

    #[test]
    fn sentinels_sort_first() {
        assert_eq!(compare("unknown", "0.0.1"), Ordering::Less);
        assert_eq!(compare("", "0.0.1"), Ordering::Less);
        assert_eq!(compare("", "unknown"), Ordering::Equal);
        assert_eq!(compare("dev-uncommitted", "v0.1.0"), Ordering::Less);
    }

    #[test]
    fn normalize_adds_single_prefix() {
        assert_eq!(normalize("1.2.3"), "v1.2.3");
        assert_eq!(normalize("v1.2.3"), "v1.2.3");
        assert_eq!(normalize(" 1.2.3 \n"), "v1.2.3");
    }

    #[test]
    fn prerelease_type_classification() {
        assert_eq!(PrereleaseType::from_tag("alpha.3"), PrereleaseType::Alpha);
        assert_eq!(PrereleaseType::from_tag("rc1"), PrereleaseType::Rc);
        assert_eq!(PrereleaseType::from_tag("nightly"), PrereleaseType::None);
        assert_eq!(PrereleaseType::from_tag(""), PrereleaseType::None);
    }

    #[test]
    fn prerelease_type_serializes_to_plain_strings() {
        assert_eq!(serde_json::to_string(&PrereleaseType::None).unwrap(), r#""""#);
        assert_eq!(serde_json::to_string(&PrereleaseType::Rc).unwrap(), r#""rc""#);
    }

    #[test]
    fn is_prerelease_on_strings() {
        assert!(is_prerelease("v2.0.0-rc.1"));
        assert!(!is_prerelease("v2.0.0"));
        assert!(!is_prerelease("garbage"));
    }
}
