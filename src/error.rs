//! Error types for tagreg

use proc_exit::{Code, Exit};
use thiserror::Error;

const EXIT_USER_ERROR: i32 = 1;
const EXIT_INTERNAL_ERROR: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

/// The error type for tagreg.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// The artifact name contains whitespace or one of the reserved
    /// characters `@`, `#`, `!`, `:`.
    #[error("\"{0}\" is not a valid artifact name (no whitespace, `@`, `#`, `!` or `:`)")]
    InvalidArtifactName(String),
    /// The version string does not conform to the configured convention.
    #[error("\"{version}\" is not a valid {convention} version")]
    InvalidVersion {
        /// The offending version string.
        version: String,
        /// The convention it was validated against.
        convention: String,
    },
    /// The stage label contains whitespace or a reserved character.
    #[error("\"{0}\" is not a valid stage label (no whitespace, `@`, `#`, `!` or `:`)")]
    InvalidStageName(String),
    /// Assignment needs exactly one target.
    #[error("exactly one of version or ref must be given")]
    AmbiguousAssignTarget,
    /// The stage is not in the configured allow-list.
    #[error("stage \"{stage}\" is not one of the allowed stages {allowed:?}")]
    ForbiddenStage {
        /// The offending stage label.
        stage: String,
        /// The configured allow-list.
        allowed: Vec<String>,
    },
    /// The artifact type is not in the configured allow-list.
    #[error("type \"{kind}\" is not one of the allowed types {allowed:?}")]
    ForbiddenType {
        /// The offending type.
        kind: String,
        /// The configured allow-list.
        allowed: Vec<String>,
    },
    /// The version has already been used for this artifact.
    #[error("version {version} of {artifact} is already registered by tag {tag}")]
    VersionExists {
        /// Artifact name.
        artifact: String,
        /// Version string.
        version: String,
        /// The existing registration tag.
        tag: String,
    },
    /// The version exists but is not currently registered.
    #[error("version {version} of {artifact} is not registered")]
    VersionNotRegistered {
        /// Artifact name.
        artifact: String,
        /// Version string.
        version: String,
    },
    /// The stage is not currently assigned to any version of the artifact.
    #[error("stage {stage} is not currently assigned for {artifact}")]
    StageNotAssigned {
        /// Artifact name.
        artifact: String,
        /// Stage label.
        stage: String,
    },
    /// The artifact is deprecated; registration requires force.
    #[error("artifact {0} is deprecated (use force to register anyway)")]
    ArtifactDeprecated(String),
    /// No artifact with this name is known to the registry.
    #[error("unknown artifact {0}")]
    UnknownArtifact(String),
    /// No such version for the artifact.
    #[error("unknown version {version} of {artifact}")]
    UnknownVersion {
        /// Artifact name.
        artifact: String,
        /// Version string.
        version: String,
    },
    /// The ref could not be resolved to a commit.
    #[error("cannot resolve ref {0} to a commit")]
    UnknownRef(String),
    /// A tag with this name already exists in the repository.
    #[error("tag {0} already exists")]
    TagExists(String),
    /// The configuration file or an environment override is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The index file could not be parsed.
    #[error("malformed index file {path}: {reason}")]
    MalformedIndex {
        /// Index path within the repository.
        path: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,
    /// Error passed up from git2
    #[error("{0}")]
    Git2(#[from] git2::Error),
    /// Error passed up from the filesystem
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by the caller's input or the registry state
    /// rather than by the environment.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Error::Git2(_) | Error::Io(_) | Error::Cancelled)
    }
}

impl From<Error> for Exit {
    fn from(err: Error) -> Self {
        match err {
            Error::Cancelled => Exit::new(Code::new(EXIT_CANCELLED)).with_message(err.to_string()),
            Error::Git2(_) | Error::Io(_) => {
                Exit::new(Code::new(EXIT_INTERNAL_ERROR)).with_message(err.to_string())
            }
            _ => Exit::new(Code::new(EXIT_USER_ERROR)).with_message(err.to_string()),
        }
    }
}
