//! Version algebra for the two supported conventions.
//!
//! A registry orders its versions under one of two conventions:
//!
//! - *numbers*: `v<N>` with N ≥ 1, strictly increasing integers
//! - *semver*: `v<MAJOR>.<MINOR>.<PATCH>` per SemVer 2.0.0 precedence
//!
//! Build metadata never contributes to ordering; pre-release versions are
//! accepted but do not contribute to "greatest" unless explicitly requested.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;

use crate::Error;

/// Version naming convention for a repository.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// `v<N>` tags with strictly increasing integers.
    #[default]
    Numbers,
    /// `v<MAJOR>.<MINOR>.<PATCH>` tags under SemVer 2.0.0.
    Semver,
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::Numbers => write!(f, "numbers"),
            Convention::Semver => write!(f, "semver"),
        }
    }
}

impl FromStr for Convention {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numbers" => Ok(Convention::Numbers),
            "semver" => Ok(Convention::Semver),
            _ => Err(Error::Config(format!(
                "version_convention must be `numbers` or `semver`, not `{s}`"
            ))),
        }
    }
}

/// The version component incremented by a semantic bump.
///
/// Ignored under the numbers convention.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BumpPart {
    /// Increment MAJOR, zero MINOR and PATCH.
    Major,
    /// Increment MINOR, zero PATCH.
    Minor,
    /// Increment PATCH.
    #[default]
    Patch,
}

impl fmt::Display for BumpPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpPart::Major => write!(f, "major"),
            BumpPart::Minor => write!(f, "minor"),
            BumpPart::Patch => write!(f, "patch"),
        }
    }
}

/// A parsed artifact version under one of the two conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactVersion {
    /// A numbered version `v<N>`.
    Numbered(u64),
    /// A semantic version `v<MAJOR>.<MINOR>.<PATCH>[-pre][+build]`.
    Semantic(semver::Version),
}

fn numbered_re() -> Regex {
    Regex::new(r"^v(?P<number>[1-9]\d*)$").expect("numbered version regex is well formed")
}

impl ArtifactVersion {
    /// Parse a version string under the given convention.
    ///
    /// ```rust
    /// use tagreg::version::{ArtifactVersion, Convention};
    ///
    /// let v = ArtifactVersion::parse("v3", Convention::Numbers)?;
    /// assert_eq!("v3", v.to_string());
    /// # Ok::<(), tagreg::Error>(())
    /// ```
    pub fn parse(version: &str, convention: Convention) -> Result<Self, Error> {
        let invalid = || Error::InvalidVersion {
            version: version.to_string(),
            convention: convention.to_string(),
        };
        match convention {
            Convention::Numbers => {
                let caps = numbered_re().captures(version).ok_or_else(invalid)?;
                let number = caps["number"].parse::<u64>().map_err(|_| invalid())?;
                Ok(ArtifactVersion::Numbered(number))
            }
            Convention::Semver => {
                let bare = version.strip_prefix('v').ok_or_else(invalid)?;
                let parsed = semver::Version::parse(bare).map_err(|e| {
                    log::trace!("semver rejected `{bare}`: {e}");
                    invalid()
                })?;
                Ok(ArtifactVersion::Semantic(parsed))
            }
        }
    }

    /// Is the string a valid version under the convention?
    pub fn valid(version: &str, convention: Convention) -> bool {
        ArtifactVersion::parse(version, convention).is_ok()
    }

    /// Total order by convention precedence: numeric compare for numbered
    /// versions, SemVer 2.0.0 precedence (build metadata ignored) for
    /// semantic versions.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ArtifactVersion::Numbered(a), ArtifactVersion::Numbered(b)) => a.cmp(b),
            (ArtifactVersion::Semantic(a), ArtifactVersion::Semantic(b)) => a.cmp_precedence(b),
            // Mixed conventions only arise from foreign tags; order by the
            // rendered string so the result is at least deterministic.
            _ => self.to_string().cmp(&other.to_string()),
        }
    }

    /// Compute the next version after `previous`.
    ///
    /// With no previous version the first version is `v1` (numbers) or
    /// `v0.0.1` (semver). Under the numbers convention `part` is ignored.
    pub fn bump(
        previous: Option<&ArtifactVersion>,
        part: BumpPart,
        convention: Convention,
    ) -> ArtifactVersion {
        match previous {
            None => match convention {
                Convention::Numbers => ArtifactVersion::Numbered(1),
                Convention::Semver => ArtifactVersion::Semantic(semver::Version::new(0, 0, 1)),
            },
            Some(ArtifactVersion::Numbered(n)) => ArtifactVersion::Numbered(n + 1),
            Some(ArtifactVersion::Semantic(v)) => {
                let next = match part {
                    BumpPart::Major => semver::Version::new(v.major + 1, 0, 0),
                    BumpPart::Minor => semver::Version::new(v.major, v.minor + 1, 0),
                    BumpPart::Patch => semver::Version::new(v.major, v.minor, v.patch + 1),
                };
                ArtifactVersion::Semantic(next)
            }
        }
    }

    /// The greatest version by [`ArtifactVersion::compare`].
    ///
    /// Pre-release versions do not contribute unless `include_prerelease`
    /// is set; when nothing but pre-releases exist they are reconsidered so
    /// the answer is not empty for a purely pre-release history.
    pub fn greatest<'a, I>(versions: I, include_prerelease: bool) -> Option<&'a ArtifactVersion>
    where
        I: IntoIterator<Item = &'a ArtifactVersion>,
    {
        let all: Vec<&ArtifactVersion> = versions.into_iter().collect();
        let released = all
            .iter()
            .copied()
            .filter(|v| include_prerelease || !v.is_prerelease())
            .max_by(|a, b| a.compare(b));
        released.or_else(|| all.into_iter().max_by(|a, b| a.compare(b)))
    }

    /// Does the version carry a pre-release suffix?
    pub fn is_prerelease(&self) -> bool {
        match self {
            ArtifactVersion::Numbered(_) => false,
            ArtifactVersion::Semantic(v) => !v.pre.is_empty(),
        }
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactVersion::Numbered(n) => write!(f, "v{n}"),
            ArtifactVersion::Semantic(v) => write!(f, "v{v}"),
        }
    }
}

impl PartialOrd for ArtifactVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArtifactVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::first("v1", true)]
    #[case::large("v42", true)]
    #[case::zero("v0", false)]
    #[case::leading_zero("v07", false)]
    #[case::no_prefix("7", false)]
    #[case::semantic("v1.2.3", false)]
    #[case::word("vlatest", false)]
    fn numbered_validity(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(expected, ArtifactVersion::valid(version, Convention::Numbers));
    }

    #[rstest]
    #[case::plain("v1.2.3", true)]
    #[case::zero("v0.0.1", true)]
    #[case::pre_release("v1.0.0-alpha.1", true)]
    #[case::build("v1.0.0+20130313144700", true)]
    #[case::no_prefix("1.2.3", false)]
    #[case::two_components("v1.2", false)]
    #[case::numbered("v3", false)]
    #[case::keyword("vdeprecated", false)]
    fn semantic_validity(#[case] version: &str, #[case] expected: bool) {
        assert_eq!(expected, ArtifactVersion::valid(version, Convention::Semver));
    }

    #[rstest]
    #[case::numbers_order("v2", "v10", Convention::Numbers, Ordering::Less)]
    #[case::numbers_equal("v4", "v4", Convention::Numbers, Ordering::Equal)]
    #[case::semver_order("v1.9.0", "v1.10.0", Convention::Semver, Ordering::Less)]
    #[case::pre_release_before_release("v1.0.0-alpha.1", "v1.0.0", Convention::Semver, Ordering::Less)]
    #[case::pre_release_precedence("v1.0.0-alpha.2", "v1.0.0-alpha.10", Convention::Semver, Ordering::Less)]
    #[case::build_ignored("v1.0.0+10", "v1.0.0+20", Convention::Semver, Ordering::Equal)]
    fn compare_versions(
        #[case] a: &str,
        #[case] b: &str,
        #[case] convention: Convention,
        #[case] expected: Ordering,
    ) {
        let a = ArtifactVersion::parse(a, convention).unwrap();
        let b = ArtifactVersion::parse(b, convention).unwrap();
        assert_eq!(expected, a.compare(&b));
    }

    #[rstest]
    #[case::numbers_first(None, BumpPart::Patch, Convention::Numbers, "v1")]
    #[case::numbers_next(Some("v7"), BumpPart::Major, Convention::Numbers, "v8")]
    #[case::semver_first(None, BumpPart::Minor, Convention::Semver, "v0.0.1")]
    #[case::semver_patch(Some("v0.0.1"), BumpPart::Patch, Convention::Semver, "v0.0.2")]
    #[case::semver_minor(Some("v0.0.1"), BumpPart::Minor, Convention::Semver, "v0.1.0")]
    #[case::semver_major(Some("v1.4.9"), BumpPart::Major, Convention::Semver, "v2.0.0")]
    fn bump_versions(
        #[case] previous: Option<&str>,
        #[case] part: BumpPart,
        #[case] convention: Convention,
        #[case] expected: &str,
    ) {
        let previous = previous.map(|p| ArtifactVersion::parse(p, convention).unwrap());
        let next = ArtifactVersion::bump(previous.as_ref(), part, convention);
        assert_eq!(expected, next.to_string());
    }

    #[test]
    fn greatest_skips_pre_releases() {
        let versions = ["v1.0.0", "v1.1.0-alpha.1", "v1.0.5"]
            .iter()
            .map(|v| ArtifactVersion::parse(v, Convention::Semver).unwrap())
            .collect::<Vec<_>>();

        let greatest = ArtifactVersion::greatest(&versions, false).unwrap();
        assert_eq!("v1.0.5", greatest.to_string());

        let greatest = ArtifactVersion::greatest(&versions, true).unwrap();
        assert_eq!("v1.1.0-alpha.1", greatest.to_string());
    }

    #[test]
    fn greatest_falls_back_to_pre_releases_only() {
        let versions = ["v0.1.0-rc.1", "v0.1.0-rc.2"]
            .iter()
            .map(|v| ArtifactVersion::parse(v, Convention::Semver).unwrap())
            .collect::<Vec<_>>();

        let greatest = ArtifactVersion::greatest(&versions, false).unwrap();
        assert_eq!("v0.1.0-rc.2", greatest.to_string());
    }
}
