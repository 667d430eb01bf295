//! Validates mutation requests and computes tag plans.
//!
//! The mutator is the only component that raises precondition errors; the
//! assembler records markers instead. Plans are returned to the caller,
//! which owns tag creation, deletion, and rollback of partially applied
//! multi-tag plans.

use crate::codec::{artifact_name_valid, ParsedTag};
use crate::config::RegistryConfig;
use crate::event::EventKind;
use crate::state::{ArtifactState, RegistryState};
use crate::version::{ArtifactVersion, BumpPart};
use crate::Error;

/// A tag the caller should create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTag {
    /// Tag name in one of the registry grammars.
    pub name: String,
    /// Annotation message for the tag object.
    pub message: String,
    /// Sha of the commit to tag.
    pub target: String,
}

/// The outcome of a validated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Tags to create, in order. A multi-tag plan is atomic: if a later
    /// tag cannot be created the caller must roll back the earlier ones.
    Write(Vec<PlannedTag>),
    /// Tag names to delete.
    Delete(Vec<String>),
}

impl Plan {
    /// A write plan with nothing to do (idempotent mutation).
    pub fn is_noop(&self) -> bool {
        match self {
            Plan::Write(tags) => tags.is_empty(),
            Plan::Delete(tags) => tags.is_empty(),
        }
    }
}

/// Computes tag plans against a snapshot of the registry state.
#[derive(Debug)]
pub struct Mutator<'a> {
    state: &'a RegistryState,
    config: &'a RegistryConfig,
}

impl<'a> Mutator<'a> {
    /// A mutator over the given state snapshot and configuration.
    pub fn new(state: &'a RegistryState, config: &'a RegistryConfig) -> Self {
        Mutator { state, config }
    }

    /// Plan the registration of a version at `commit`.
    ///
    /// With no explicit version the next one is computed by bumping the
    /// greatest existing version. A deprecated artifact rejects new
    /// registrations unless `force` is set.
    pub fn register(
        &self,
        artifact: &str,
        commit: &str,
        version: Option<&str>,
        bump: Option<BumpPart>,
        force: bool,
    ) -> Result<Plan, Error> {
        self.check_artifact_name(artifact)?;
        let existing = self.state.artifact(artifact);

        if let Some(art) = existing {
            if art.deprecated && !force {
                return Err(Error::ArtifactDeprecated(artifact.to_string()));
            }
            // The declared type must pass the allow-list before the
            // artifact grows any further.
            if let Some(kind) = art.meta.as_ref().and_then(|meta| meta.kind.as_deref()) {
                if !self.config.type_allowed(kind) {
                    return Err(Error::ForbiddenType {
                        kind: kind.to_string(),
                        allowed: self.config.types.clone(),
                    });
                }
            }
        }

        let version = match version {
            Some(version) => {
                if !ArtifactVersion::valid(version, self.config.convention) {
                    return Err(Error::InvalidVersion {
                        version: version.to_string(),
                        convention: self.config.convention.to_string(),
                    });
                }
                // Version strings are unique per artifact across history;
                // even a deregistered version cannot be reused.
                if let Some(art) = existing {
                    if let Some(held) = art.version(version) {
                        let tag = self
                            .registration_tag(art, &held.version)
                            .unwrap_or_else(|| format_registration(artifact, version));
                        return Err(Error::VersionExists {
                            artifact: artifact.to_string(),
                            version: version.to_string(),
                            tag,
                        });
                    }
                }
                version.to_string()
            }
            None => self.next_version(existing, bump)?.to_string(),
        };

        let name = format_registration(artifact, &version);
        self.check_tag_free(&name)?;
        log::debug!("planned registration tag `{name}` at {commit}");
        Ok(Plan::Write(vec![PlannedTag {
            name,
            message: format!("Registering artifact {artifact} version {version}"),
            target: commit.to_string(),
        }]))
    }

    /// Plan the deregistration of a version, or with `delete` the removal
    /// of every tag touching it.
    pub fn deregister(&self, artifact: &str, version: &str, delete: bool) -> Result<Plan, Error> {
        let art = self.lookup(artifact)?;
        let held = art
            .version(version)
            .ok_or_else(|| Error::UnknownVersion {
                artifact: artifact.to_string(),
                version: version.to_string(),
            })?;
        if !held.is_active() {
            return Err(Error::VersionNotRegistered {
                artifact: artifact.to_string(),
                version: version.to_string(),
            });
        }

        if delete {
            let mut tags = Vec::new();
            if let Some(tag) = self.registration_tag(art, version) {
                tags.push(tag);
            }
            // Every stage event resolved to the version goes too.
            for event in &held.history {
                if !tags.contains(&event.reference) {
                    tags.push(event.reference.clone());
                }
            }
            return Ok(Plan::Delete(tags));
        }

        let name = ParsedTag::Deregistration {
            artifact: artifact.to_string(),
            version: version.to_string(),
        }
        .to_string();
        self.check_tag_free(&name)?;
        Ok(Plan::Write(vec![PlannedTag {
            name,
            message: format!("Deregistering artifact {artifact} version {version}"),
            target: held.commit.clone(),
        }]))
    }

    /// Plan a stage assignment.
    ///
    /// Exactly one of `version` and `commit` must be given. Assigning by
    /// ref to a commit with no registered version first registers one,
    /// yielding an atomic two-tag plan.
    pub fn assign(
        &self,
        artifact: &str,
        stage: &str,
        version: Option<&str>,
        commit: Option<&str>,
        bump: Option<BumpPart>,
    ) -> Result<Plan, Error> {
        self.check_artifact_name(artifact)?;
        self.check_stage(stage)?;

        let (mut tags, target, assigned_version) = match (version, commit) {
            (Some(version), None) => {
                let art = self.lookup(artifact)?;
                let held = art
                    .version(version)
                    .ok_or_else(|| Error::UnknownVersion {
                        artifact: artifact.to_string(),
                        version: version.to_string(),
                    })?;
                if !held.is_active() {
                    return Err(Error::VersionNotRegistered {
                        artifact: artifact.to_string(),
                        version: version.to_string(),
                    });
                }
                (Vec::new(), held.commit.clone(), version.to_string())
            }
            (None, Some(commit)) => {
                let resolved = self
                    .state
                    .artifact(artifact)
                    .and_then(|art| art.version_at_commit(commit))
                    .filter(|v| v.is_active());
                match resolved {
                    Some(held) => (Vec::new(), commit.to_string(), held.version.clone()),
                    None => {
                        // No version at the target commit: register one
                        // first. Assignment resets the deprecation window,
                        // so the implicit registration is forced.
                        let Plan::Write(tags) =
                            self.register(artifact, commit, None, bump, true)?
                        else {
                            unreachable!("register always returns a write plan");
                        };
                        let version = tags[0]
                            .name
                            .split('@')
                            .nth(1)
                            .unwrap_or_default()
                            .to_string();
                        (tags, commit.to_string(), version)
                    }
                }
            }
            _ => return Err(Error::AmbiguousAssignTarget),
        };

        let seq = self.next_stage_seq(artifact, stage);
        let name = ParsedTag::Assignment {
            artifact: artifact.to_string(),
            stage: stage.to_string(),
            seq: Some(seq),
        }
        .to_string();
        self.check_tag_free(&name)?;
        tags.push(PlannedTag {
            name,
            message: format!(
                "Assigning stage {stage} to artifact {artifact} version {assigned_version}"
            ),
            target,
        });
        Ok(Plan::Write(tags))
    }

    /// Plan a stage unassignment, or with `delete` the removal of every
    /// tag touching the stage.
    ///
    /// With multi-version assignment several versions can hold the stage;
    /// `version` selects which one to demote. Without it the most
    /// recently assigned version is targeted.
    pub fn unassign(
        &self,
        artifact: &str,
        stage: &str,
        version: Option<&str>,
        delete: bool,
    ) -> Result<Plan, Error> {
        let art = self.lookup(artifact)?;

        if delete {
            let tags: Vec<String> = art
                .history
                .iter()
                .filter(|row| {
                    matches!(
                        row.event.kind,
                        EventKind::Assignment | EventKind::Unassignment
                    ) && row.event.stage.as_deref() == Some(stage)
                })
                .map(|row| row.event.reference.clone())
                .collect();
            if tags.is_empty() {
                return Err(Error::StageNotAssigned {
                    artifact: artifact.to_string(),
                    stage: stage.to_string(),
                });
            }
            return Ok(Plan::Delete(tags));
        }

        let not_assigned = || Error::StageNotAssigned {
            artifact: artifact.to_string(),
            stage: stage.to_string(),
        };
        let versions = art
            .stage_map
            .get(stage)
            .filter(|versions| !versions.is_empty())
            .ok_or_else(not_assigned)?;
        let current = match version {
            Some(version) => {
                let held = art.version(version).ok_or_else(|| Error::UnknownVersion {
                    artifact: artifact.to_string(),
                    version: version.to_string(),
                })?;
                if !versions.iter().any(|v| v == version) {
                    return Err(not_assigned());
                }
                held
            }
            None => versions
                .last()
                .and_then(|version| art.version(version))
                .ok_or_else(not_assigned)?,
        };

        let seq = self.next_stage_seq(artifact, stage);
        let name = ParsedTag::Unassignment {
            artifact: artifact.to_string(),
            stage: stage.to_string(),
            seq: Some(seq),
        }
        .to_string();
        self.check_tag_free(&name)?;
        Ok(Plan::Write(vec![PlannedTag {
            name,
            message: format!(
                "Unassigning stage {stage} from artifact {artifact} version {}",
                current.version
            ),
            target: current.commit.clone(),
        }]))
    }

    /// Plan an artifact deprecation, or with `delete` the removal of every
    /// tag of the artifact. Deprecation is idempotent: an already
    /// deprecated artifact yields an empty plan.
    pub fn deprecate(&self, artifact: &str, commit: &str, delete: bool) -> Result<Plan, Error> {
        let art = self.lookup(artifact)?;

        if delete {
            let mut tags: Vec<String> = Vec::new();
            for tag in art.tag_names() {
                if !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
            return Ok(Plan::Delete(tags));
        }

        if art.deprecated {
            log::info!("artifact {artifact} is already deprecated");
            return Ok(Plan::Write(Vec::new()));
        }

        let name = self.keyword_tag(art, artifact, EventKind::Deprecation);
        self.check_tag_free(&name)?;
        Ok(Plan::Write(vec![PlannedTag {
            name,
            message: format!("Deprecating artifact {artifact}"),
            target: commit.to_string(),
        }]))
    }

    /// Plan an artifact annotation carrying a free-text note.
    pub fn annotate(&self, artifact: &str, commit: &str, note: &str) -> Result<Plan, Error> {
        self.check_artifact_name(artifact)?;
        let name = match self.state.artifact(artifact) {
            Some(art) => self.keyword_tag(art, artifact, EventKind::Annotation),
            None => ParsedTag::Annotation {
                artifact: artifact.to_string(),
                seq: None,
            }
            .to_string(),
        };
        self.check_tag_free(&name)?;
        Ok(Plan::Write(vec![PlannedTag {
            name,
            message: note.to_string(),
            target: commit.to_string(),
        }]))
    }

    fn check_artifact_name(&self, artifact: &str) -> Result<(), Error> {
        if !artifact_name_valid(artifact) {
            return Err(Error::InvalidArtifactName(artifact.to_string()));
        }
        Ok(())
    }

    fn check_stage(&self, stage: &str) -> Result<(), Error> {
        if !artifact_name_valid(stage) {
            return Err(Error::InvalidStageName(stage.to_string()));
        }
        if !self.config.stage_allowed(stage) {
            return Err(Error::ForbiddenStage {
                stage: stage.to_string(),
                allowed: self.config.stages.clone(),
            });
        }
        Ok(())
    }

    fn check_tag_free(&self, name: &str) -> Result<(), Error> {
        let taken = self
            .state
            .artifacts
            .values()
            .flat_map(|artifact| artifact.tag_names())
            .any(|tag| tag == name);
        if taken {
            return Err(Error::TagExists(name.to_string()));
        }
        Ok(())
    }

    fn lookup(&self, artifact: &str) -> Result<&'a ArtifactState, Error> {
        self.state
            .artifact(artifact)
            .ok_or_else(|| Error::UnknownArtifact(artifact.to_string()))
    }

    // Next version from the greatest over the whole history, so deleted
    // and deregistered versions are never reissued.
    fn next_version(
        &self,
        artifact: Option<&ArtifactState>,
        bump: Option<BumpPart>,
    ) -> Result<ArtifactVersion, Error> {
        let versions: Vec<ArtifactVersion> = artifact
            .map(|art| {
                art.versions
                    .iter()
                    .filter_map(|v| {
                        ArtifactVersion::parse(&v.version, self.config.convention).ok()
                    })
                    .collect()
            })
            .unwrap_or_default();
        let previous = ArtifactVersion::greatest(&versions, true);
        Ok(ArtifactVersion::bump(
            previous,
            bump.unwrap_or_default(),
            self.config.convention,
        ))
    }

    fn next_stage_seq(&self, artifact: &str, stage: &str) -> u64 {
        self.state
            .artifact(artifact)
            .and_then(|art| art.max_seq_for_stage(stage))
            .map_or(1, |max| max + 1)
    }

    fn registration_tag(&self, artifact: &ArtifactState, version: &str) -> Option<String> {
        artifact
            .history
            .iter()
            .find(|row| {
                row.event.kind == EventKind::Registration
                    && row.event.version.as_deref() == Some(version)
            })
            .map(|row| row.event.reference.clone())
    }

    // First keyword tag is the plain form; later ones carry `#<seq>`.
    fn keyword_tag(&self, artifact: &ArtifactState, name: &str, kind: EventKind) -> String {
        let seq = artifact.max_seq_for_kind(kind).map(|max| max + 1);
        match kind {
            EventKind::Deprecation => ParsedTag::Deprecation {
                artifact: name.to_string(),
                seq,
            }
            .to_string(),
            _ => ParsedTag::Annotation {
                artifact: name.to_string(),
                seq,
            }
            .to_string(),
        }
    }
}

fn format_registration(artifact: &str, version: &str) -> String {
    ParsedTag::Registration {
        artifact: artifact.to_string(),
        version: version.to_string(),
    }
    .to_string()
}
