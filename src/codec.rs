//! Bidirectional mapping between git tag names and typed registry tags.
//!
//! Canonical grammars, part of the external contract:
//!
//! - `<name>@<version>` registration, `<name>@<version>!` deregistration
//! - `<name>@deprecated[#<seq>]` artifact-level deprecation
//! - `<name>@annotation[#<seq>]` artifact-level annotation
//! - `<name>#<stage>[#<seq>]` stage assignment
//! - `<name>#<stage>![#<seq>]` stage unassignment
//!
//! The classifier is driven by the leftmost sentinel (`@` or `#`); tag
//! names matching no grammar are silently ignored so foreign tags can
//! coexist in the repository.

use std::fmt;

use regex::Regex;

use crate::version::{ArtifactVersion, Convention};

/// Keyword after `@` marking an artifact-level deprecation tag.
pub const DEPRECATED_KEYWORD: &str = "deprecated";
/// Keyword after `@` marking an artifact-level annotation tag.
pub const ANNOTATION_KEYWORD: &str = "annotation";

/// A tag name parsed into one of the registry grammars.
///
/// The `seq` on stage and keyword tags is `None` for the legacy simple
/// form and `Some` for the incremental form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTag {
    /// `<name>@<version>`
    Registration {
        /// Artifact name.
        artifact: String,
        /// Version string, valid under the active convention.
        version: String,
    },
    /// `<name>@<version>!`
    Deregistration {
        /// Artifact name.
        artifact: String,
        /// Version string, valid under the active convention.
        version: String,
    },
    /// `<name>@deprecated[#<seq>]`
    Deprecation {
        /// Artifact name.
        artifact: String,
        /// Sequence number, absent in the simple form.
        seq: Option<u64>,
    },
    /// `<name>@annotation[#<seq>]`
    Annotation {
        /// Artifact name.
        artifact: String,
        /// Sequence number, absent in the simple form.
        seq: Option<u64>,
    },
    /// `<name>#<stage>[#<seq>]`
    Assignment {
        /// Artifact name.
        artifact: String,
        /// Stage label.
        stage: String,
        /// Sequence number, absent in the simple form.
        seq: Option<u64>,
    },
    /// `<name>#<stage>![#<seq>]`
    Unassignment {
        /// Artifact name.
        artifact: String,
        /// Stage label.
        stage: String,
        /// Sequence number, absent in the simple form.
        seq: Option<u64>,
    },
}

// Artifact names and stage labels share the same lexical rule.
const NAME_PATTERN: &str = r"[^@#!:\s]+";

fn keyword_re() -> Regex {
    let pattern = format!(
        r"^(?P<artifact>{NAME_PATTERN})@(?P<keyword>deprecated|annotation)(?:#(?P<seq>0|[1-9]\d*))?$"
    );
    Regex::new(&pattern).expect("keyword tag regex is well formed")
}

fn version_re() -> Regex {
    let pattern = format!(r"^(?P<artifact>{NAME_PATTERN})@(?P<version>{NAME_PATTERN}?)(?P<negate>!)?$");
    Regex::new(&pattern).expect("version tag regex is well formed")
}

fn stage_re() -> Regex {
    let pattern = format!(
        r"^(?P<artifact>{NAME_PATTERN})#(?P<stage>{NAME_PATTERN})(?P<negate>!)?(?:#(?P<seq>0|[1-9]\d*))?$"
    );
    Regex::new(&pattern).expect("stage tag regex is well formed")
}

/// Is `name` a valid artifact name?
///
/// Non-empty UTF-8 without whitespace or any of `@`, `#`, `!`, `:`.
pub fn artifact_name_valid(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '@' | '#' | '!' | ':'))
}

/// Parse a tag name into a [`ParsedTag`].
///
/// Accepts both bare names and full `refs/tags/...` refs. Returns `None`
/// for any tag outside the grammars, including version tags whose version
/// is invalid under `convention`; the collector tolerates foreign tags.
///
/// ```rust
/// use tagreg::codec::{parse, ParsedTag};
/// use tagreg::version::Convention;
///
/// let parsed = parse("rf#prod#1", Convention::Numbers).unwrap();
/// assert_eq!(
///     ParsedTag::Assignment {
///         artifact: "rf".to_string(),
///         stage: "prod".to_string(),
///         seq: Some(1),
///     },
///     parsed
/// );
/// ```
pub fn parse(tag: &str, convention: Convention) -> Option<ParsedTag> {
    let name = tag.strip_prefix("refs/tags/").unwrap_or(tag);
    log::trace!("classifying tag `{name}`");

    // The keyword grammar is the only `@` form that may carry a `#seq`,
    // so it is tried before the version grammar.
    if let Some(caps) = keyword_re().captures(name) {
        let artifact = caps["artifact"].to_string();
        let seq = match caps.name("seq") {
            Some(m) => Some(m.as_str().parse::<u64>().ok()?),
            None => None,
        };
        return Some(match &caps["keyword"] {
            k if k == DEPRECATED_KEYWORD => ParsedTag::Deprecation { artifact, seq },
            _ => ParsedTag::Annotation { artifact, seq },
        });
    }

    if let Some(caps) = version_re().captures(name) {
        let artifact = caps["artifact"].to_string();
        let version = caps["version"].to_string();
        if !ArtifactVersion::valid(&version, convention) {
            log::trace!("tag `{name}` has no valid {convention} version; ignored");
            return None;
        }
        return Some(if caps.name("negate").is_some() {
            ParsedTag::Deregistration { artifact, version }
        } else {
            ParsedTag::Registration { artifact, version }
        });
    }

    if let Some(caps) = stage_re().captures(name) {
        let artifact = caps["artifact"].to_string();
        let stage = caps["stage"].to_string();
        let seq = match caps.name("seq") {
            Some(m) => Some(m.as_str().parse::<u64>().ok()?),
            None => None,
        };
        return Some(if caps.name("negate").is_some() {
            ParsedTag::Unassignment {
                artifact,
                stage,
                seq,
            }
        } else {
            ParsedTag::Assignment {
                artifact,
                stage,
                seq,
            }
        });
    }

    log::trace!("tag `{name}` matches no registry grammar; ignored");
    None
}

impl ParsedTag {
    /// The artifact the tag refers to.
    pub fn artifact(&self) -> &str {
        match self {
            ParsedTag::Registration { artifact, .. }
            | ParsedTag::Deregistration { artifact, .. }
            | ParsedTag::Deprecation { artifact, .. }
            | ParsedTag::Annotation { artifact, .. }
            | ParsedTag::Assignment { artifact, .. }
            | ParsedTag::Unassignment { artifact, .. } => artifact,
        }
    }

    /// The sequence number, where the grammar carries one.
    pub fn seq(&self) -> Option<u64> {
        match self {
            ParsedTag::Registration { .. } | ParsedTag::Deregistration { .. } => None,
            ParsedTag::Deprecation { seq, .. }
            | ParsedTag::Annotation { seq, .. }
            | ParsedTag::Assignment { seq, .. }
            | ParsedTag::Unassignment { seq, .. } => *seq,
        }
    }
}

// Formatting is the inverse of `parse`; `seq` renders decimally without
// leading zeros.
impl fmt::Display for ParsedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedTag::Registration { artifact, version } => write!(f, "{artifact}@{version}"),
            ParsedTag::Deregistration { artifact, version } => write!(f, "{artifact}@{version}!"),
            ParsedTag::Deprecation { artifact, seq } => match seq {
                Some(seq) => write!(f, "{artifact}@{DEPRECATED_KEYWORD}#{seq}"),
                None => write!(f, "{artifact}@{DEPRECATED_KEYWORD}"),
            },
            ParsedTag::Annotation { artifact, seq } => match seq {
                Some(seq) => write!(f, "{artifact}@{ANNOTATION_KEYWORD}#{seq}"),
                None => write!(f, "{artifact}@{ANNOTATION_KEYWORD}"),
            },
            ParsedTag::Assignment {
                artifact,
                stage,
                seq,
            } => match seq {
                Some(seq) => write!(f, "{artifact}#{stage}#{seq}"),
                None => write!(f, "{artifact}#{stage}"),
            },
            ParsedTag::Unassignment {
                artifact,
                stage,
                seq,
            } => match seq {
                Some(seq) => write!(f, "{artifact}#{stage}!#{seq}"),
                None => write!(f, "{artifact}#{stage}!"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn reg(artifact: &str, version: &str) -> ParsedTag {
        ParsedTag::Registration {
            artifact: artifact.to_string(),
            version: version.to_string(),
        }
    }

    #[rstest]
    #[case::registration("rf@v1", Convention::Numbers)]
    #[case::deregistration("rf@v1!", Convention::Numbers)]
    #[case::semver_registration("model@v1.2.3-alpha.1", Convention::Semver)]
    #[case::deprecation("rf@deprecated", Convention::Numbers)]
    #[case::deprecation_seq("rf@deprecated#2", Convention::Numbers)]
    #[case::annotation("rf@annotation#1", Convention::Numbers)]
    #[case::assignment_simple("rf#prod", Convention::Numbers)]
    #[case::assignment("rf#prod#12", Convention::Numbers)]
    #[case::unassignment_simple("rf#prod!", Convention::Numbers)]
    #[case::unassignment("rf#prod!#13", Convention::Numbers)]
    fn round_trip(#[case] tag: &str, #[case] convention: Convention) {
        let parsed = parse(tag, convention).expect("tag should parse");
        assert_eq!(tag, parsed.to_string());
        assert_eq!(Some(parsed.clone()), parse(&parsed.to_string(), convention));
    }

    #[rstest]
    #[case::release_tag("v1.2.3")]
    #[case::foreign("nightly-2024-01-01")]
    #[case::bad_version_numbers("rf@v1.2.3")]
    #[case::bad_version_word("rf@latest")]
    #[case::zero_version("rf@v0")]
    #[case::empty_stage("rf#")]
    #[case::two_sentinels("rf@v1#2")]
    #[case::stage_then_at("rf#prod@v1")]
    #[case::leading_zero_seq("rf#prod#01")]
    #[case::whitespace_name("r f@v1")]
    #[case::colon_name("rf:x@v1")]
    fn foreign_tags_are_ignored(#[case] tag: &str) {
        assert_eq!(None, parse(tag, Convention::Numbers));
    }

    #[test]
    fn refs_prefix_is_stripped() {
        assert_eq!(
            Some(reg("rf", "v1")),
            parse("refs/tags/rf@v1", Convention::Numbers)
        );
    }

    #[test]
    fn semver_convention_rejects_numbered() {
        assert_eq!(None, parse("rf@v1", Convention::Semver));
        assert_eq!(Some(reg("rf", "v0.0.1")), parse("rf@v0.0.1", Convention::Semver));
    }

    #[rstest]
    #[case::valid_plain("rf", true)]
    #[case::valid_dotted("models/churn.pkl", true)]
    #[case::valid_dashed("nlp-encoder", true)]
    #[case::empty("", false)]
    #[case::space("model one", false)]
    #[case::at("rf@x", false)]
    #[case::hash("rf#x", false)]
    #[case::bang("rf!", false)]
    #[case::colon("rf:latest", false)]
    fn artifact_name_rule(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(expected, artifact_name_valid(name));
    }

    #[test]
    fn simple_form_has_no_seq() {
        let parsed = parse("rf#prod", Convention::Numbers).unwrap();
        assert_eq!(None, parsed.seq());
        let parsed = parse("rf#prod#4", Convention::Numbers).unwrap();
        assert_eq!(Some(4), parsed.seq());
    }
}
