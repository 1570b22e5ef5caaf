//! A Talos release version, `v<MAJOR>.<MINOR>.<PATCH>` with an optional
//! `-<pre-release>` suffix (e.g. `v1.7.5`, `v1.8.0-beta.2`), used to compare
//! a cluster's installed version against an available upgrade target and to
//! gate version-dependent reconciliation behavior.
//!
//! This mirrors the shape of the teacher workspace's Kubernetes API-version
//! type (`v<MAJOR>(alpha|beta<N>)?`): a regex-validated `FromStr`, a total
//! `Ord`, and a `Display` that round-trips the parsed input. Talos versions
//! are three-component and the optional suffix is an opaque pre-release tag
//! rather than Kubernetes's alpha/beta maturity level, so the `Level`/
//! `Group`/`ApiVersion` types from that crate have no counterpart here.

use std::cmp::Ordering;
use std::fmt::Display;
use std::num::ParseIntError;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use snafu::{OptionExt, ResultExt, Snafu};

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)(?:-(?P<pre>[a-zA-Z0-9.]+))?$")
        .expect("version regex is valid")
});

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum VersionParseError {
    #[snafu(display("invalid Talos version format, expected v<major>.<minor>.<patch>[-<pre>]"))]
    InvalidFormat,

    #[snafu(display("failed to parse {component} component"))]
    ParseComponent {
        component: &'static str,
        source: ParseIntError,
    },
}

/// A parsed, comparable Talos version.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// A pre-release version (e.g. `-beta.2`) never satisfies an upgrade
    /// target that itself has no pre-release suffix at the same
    /// major.minor.patch, matching semver precedence.
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let captures = VERSION_REGEX.captures(input).context(InvalidFormatSnafu)?;

        let parse = |name: &'static str| -> Result<u64, VersionParseError> {
            captures
                .name(name)
                .expect("internal error: regex guarantees this group matched")
                .as_str()
                .parse::<u64>()
                .context(ParseComponentSnafu { component: name })
        };

        Ok(Self {
            major: parse("major")?,
            minor: parse("minor")?,
            patch: parse("patch")?,
            pre_release: captures.name("pre").map(|m| m.as_str().to_owned()),
        })
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(lhs), Some(rhs)) => lhs.cmp(rhs),
            })
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Version::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("v1.7.5", Version::new(1, 7, 5))]
    #[case("v1.8.0-beta.2", Version { major: 1, minor: 8, patch: 0, pre_release: Some("beta.2".into()) })]
    fn valid_version(#[case] input: &str, #[case] expected: Version) {
        assert_eq!(Version::from_str(input).unwrap(), expected);
    }

    #[rstest]
    #[case("1.7.5")]
    #[case("v1.7")]
    #[case("")]
    fn invalid_version(#[case] input: &str) {
        assert!(Version::from_str(input).is_err());
    }

    #[test]
    fn orders_by_major_minor_patch_then_pre_release() {
        let a = Version::from_str("v1.7.5").unwrap();
        let b = Version::from_str("v1.8.0").unwrap();
        assert!(a < b);

        let stable = Version::from_str("v1.8.0").unwrap();
        let beta = Version::from_str("v1.8.0-beta.2").unwrap();
        assert!(beta < stable);
    }

    #[test]
    fn display_round_trips() {
        for input in ["v1.7.5", "v1.8.0-beta.2"] {
            assert_eq!(Version::from_str(input).unwrap().to_string(), input);
        }
    }
}
