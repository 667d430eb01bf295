//! Typed registry events derived from git tags and index observations.

use std::fmt;

use crate::codec::ParsedTag;

/// The closed set of event kinds folded by the state assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// Synthetic: the artifact is present in the index at a commit.
    Commit,
    /// A version was registered.
    Registration,
    /// A version registration was withdrawn.
    Deregistration,
    /// A stage was assigned.
    Assignment,
    /// A stage assignment was withdrawn.
    Unassignment,
    /// The artifact as a whole was deprecated.
    Deprecation,
    /// A free-text note was attached to the artifact.
    Annotation,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::Commit => "commit",
            EventKind::Registration => "registration",
            EventKind::Deregistration => "deregistration",
            EventKind::Assignment => "assignment",
            EventKind::Unassignment => "unassignment",
            EventKind::Deprecation => "deprecation",
            EventKind::Annotation => "annotation",
        };
        write!(f, "{label}")
    }
}

/// An immutable registry event.
///
/// Tag events carry the tag name in `reference`; synthetic commit events
/// carry the commit sha. `timestamp` is the committer time of the target
/// commit and `created_at` the tag object's creation time (they coincide
/// for lightweight tags and commit events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Which state transition the event describes.
    pub kind: EventKind,
    /// The artifact the event belongs to.
    pub artifact: String,
    /// Version string for registration/deregistration events.
    pub version: Option<String>,
    /// Stage label for assignment/unassignment events.
    pub stage: Option<String>,
    /// Tag name, or commit sha for synthetic commit events.
    pub reference: String,
    /// Sha of the commit the event points at.
    pub commit: String,
    /// Author of the tag (tagger) or of the commit.
    pub author: String,
    /// Committer timestamp of the target commit, seconds since the epoch.
    pub timestamp: i64,
    /// Creation time of the tag object, seconds since the epoch.
    pub created_at: i64,
    /// Monotonic disambiguator embedded in the tag name.
    pub seq: Option<u64>,
    /// Annotated tag message, when one exists.
    pub message: Option<String>,
    /// True when the tag used the legacy simple form without a `#<seq>`.
    pub simple: bool,
}

impl Event {
    /// Display-order key: (committer timestamp, tag-creation timestamp,
    /// seq, tag name).
    pub fn order_key(&self) -> (i64, i64, u64, &str) {
        (
            self.timestamp,
            self.created_at,
            self.seq.unwrap_or(0),
            self.reference.as_str(),
        )
    }

    /// Build a tag event from a parsed tag name and its tag object data.
    pub(crate) fn from_parsed(
        parsed: ParsedTag,
        reference: String,
        commit: String,
        author: String,
        timestamp: i64,
        created_at: i64,
        message: Option<String>,
    ) -> Event {
        let simple = matches!(
            parsed,
            ParsedTag::Assignment { seq: None, .. } | ParsedTag::Unassignment { seq: None, .. }
        );
        let (kind, artifact, version, stage, seq) = match parsed {
            ParsedTag::Registration { artifact, version } => {
                (EventKind::Registration, artifact, Some(version), None, None)
            }
            ParsedTag::Deregistration { artifact, version } => (
                EventKind::Deregistration,
                artifact,
                Some(version),
                None,
                None,
            ),
            ParsedTag::Deprecation { artifact, seq } => {
                (EventKind::Deprecation, artifact, None, None, seq)
            }
            ParsedTag::Annotation { artifact, seq } => {
                (EventKind::Annotation, artifact, None, None, seq)
            }
            ParsedTag::Assignment {
                artifact,
                stage,
                seq,
            } => (EventKind::Assignment, artifact, None, Some(stage), seq),
            ParsedTag::Unassignment {
                artifact,
                stage,
                seq,
            } => (EventKind::Unassignment, artifact, None, Some(stage), seq),
        };
        Event {
            kind,
            artifact,
            version,
            stage,
            reference,
            commit,
            author,
            timestamp,
            created_at,
            // Simple-form tags synthesize seq = 0; the collector marks the
            // (artifact, stage) pair simple-mode via `simple`.
            seq: seq.or(Some(0)),
            message,
            simple,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse;
    use crate::version::Convention;

    fn event_for(tag: &str) -> Event {
        let parsed = parse(tag, Convention::Numbers).unwrap();
        Event::from_parsed(
            parsed,
            tag.to_string(),
            "c0ffee".to_string(),
            "tester".to_string(),
            100,
            110,
            None,
        )
    }

    #[test]
    fn simple_form_synthesizes_seq_zero() {
        let event = event_for("rf#prod");
        assert_eq!(EventKind::Assignment, event.kind);
        assert_eq!(Some(0), event.seq);
        assert!(event.simple);

        let event = event_for("rf#prod#3");
        assert_eq!(Some(3), event.seq);
        assert!(!event.simple);
    }

    #[test]
    fn order_key_breaks_ties_by_seq_then_name() {
        let a = event_for("rf#prod#1");
        let b = event_for("rf#prod#2");
        assert!(a.order_key() < b.order_key());

        let a = event_for("aa@v1");
        let b = event_for("ab@v1");
        assert!(a.order_key() < b.order_key());
    }
}
