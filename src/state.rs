//! Folds the ordered event stream into the canonical registry state.
//!
//! The assembler never raises: suspect events are kept in history with a
//! conflict or orphan marker and the fold keeps going, so the state is a
//! pure function of the observed tag set and index blobs.

use std::collections::{BTreeMap, BTreeSet};

use crate::collector::EventStream;
use crate::config::{RegistryConfig, Sort};
use crate::event::{Event, EventKind};
use crate::index::ArtifactMeta;
use crate::version::Convention;

/// Marker recorded on a suspect history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// The event collides with earlier state (duplicate registration, or a
    /// legacy simple-form tag that disables per-stage history).
    Conflict,
    /// The event refers to a version or assignment that does not exist.
    Orphan,
}

/// One row of an artifact's history in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// The underlying event.
    pub event: Event,
    /// Set when the assembler found the event suspect.
    pub marker: Option<Marker>,
}

/// Assembled state of one version of an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionState {
    /// The version string.
    pub version: String,
    /// Committer timestamp of the registering event.
    pub created_at: i64,
    /// Commit the version points at.
    pub commit: String,
    /// The version has a registration event.
    pub registered: bool,
    /// The registration was withdrawn by a deregistration event.
    pub deprecated: bool,
    /// Stages currently held by this version.
    pub stages: BTreeSet<String>,
    /// Assignment and unassignment events resolved to this version.
    pub history: Vec<Event>,
}

impl VersionState {
    fn new(version: String, event: &Event) -> Self {
        VersionState {
            version,
            created_at: event.timestamp,
            commit: event.commit.clone(),
            registered: true,
            deprecated: false,
            stages: BTreeSet::new(),
            history: Vec::new(),
        }
    }

    /// Registered and not deregistered.
    pub fn is_active(&self) -> bool {
        self.registered && !self.deprecated
    }
}

/// Assembled state of one artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactState {
    /// Artifact name.
    pub name: String,
    /// Artifact-wide deprecation flag; reset by any later registration or
    /// assignment.
    pub deprecated: bool,
    /// Latest index metadata observed for the artifact.
    pub meta: Option<ArtifactMeta>,
    /// Versions in registration order.
    pub versions: Vec<VersionState>,
    /// Every event touching the artifact, in display order.
    pub history: Vec<HistoryRow>,
    /// Stages seen in legacy simple-form tags; history for these pairs is
    /// degraded to conflict markers.
    pub simple_stages: BTreeSet<String>,
    /// Free-text annotation notes, in event order.
    pub notes: Vec<String>,
    /// Stage to versions currently holding it, in assignment order. The
    /// list has at most one element unless multi-version is enabled.
    pub stage_map: BTreeMap<String, Vec<String>>,
}

impl ArtifactState {
    fn new(name: &str) -> Self {
        ArtifactState {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Find a version by its string.
    pub fn version(&self, version: &str) -> Option<&VersionState> {
        self.versions.iter().find(|v| v.version == version)
    }

    fn version_mut(&mut self, version: &str) -> Option<&mut VersionState> {
        self.versions.iter_mut().find(|v| v.version == version)
    }

    /// The version a tag at `commit` resolves to: the most recently
    /// registered version at that commit, preferring active versions.
    pub fn version_at_commit(&self, commit: &str) -> Option<&VersionState> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.commit == commit && v.is_active())
            .or_else(|| self.versions.iter().rev().find(|v| v.commit == commit))
    }

    /// Versions that are registered and not deregistered.
    pub fn active_versions(&self) -> impl Iterator<Item = &VersionState> {
        self.versions.iter().filter(|v| v.is_active())
    }

    /// Greatest `seq` among events keyed by `stage`, if any.
    pub fn max_seq_for_stage(&self, stage: &str) -> Option<u64> {
        self.history
            .iter()
            .filter(|row| {
                matches!(
                    row.event.kind,
                    EventKind::Assignment | EventKind::Unassignment
                ) && row.event.stage.as_deref() == Some(stage)
            })
            .filter_map(|row| row.event.seq)
            .max()
    }

    /// Greatest `seq` among events of `kind` with no stage key.
    pub fn max_seq_for_kind(&self, kind: EventKind) -> Option<u64> {
        self.history
            .iter()
            .filter(|row| row.event.kind == kind)
            .filter_map(|row| row.event.seq)
            .max()
    }

    /// Tag names of all events, in display order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.history
            .iter()
            .filter(|row| row.event.kind != EventKind::Commit)
            .map(|row| row.event.reference.as_str())
    }
}

/// The canonical, queryable registry state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    /// Artifacts by name.
    pub artifacts: BTreeMap<String, ArtifactState>,
    /// Convention the state was assembled under.
    pub convention: Convention,
    /// Sort order for "greatest" queries.
    pub sort: Sort,
}

impl RegistryState {
    /// Look up an artifact by name.
    pub fn artifact(&self, name: &str) -> Option<&ArtifactState> {
        self.artifacts.get(name)
    }
}

/// Fold the event stream into a [`RegistryState`].
pub fn assemble(stream: &EventStream, config: &RegistryConfig) -> RegistryState {
    let mut state = RegistryState {
        artifacts: BTreeMap::new(),
        convention: config.convention,
        sort: config.sort,
    };

    for event in &stream.events {
        let artifact = state
            .artifacts
            .entry(event.artifact.clone())
            .or_insert_with(|| ArtifactState::new(&event.artifact));
        let marker = apply(artifact, event, stream, config);
        artifact.history.push(HistoryRow {
            event: event.clone(),
            marker,
        });
    }

    finalize(&mut state);
    state
}

fn apply(
    artifact: &mut ArtifactState,
    event: &Event,
    stream: &EventStream,
    config: &RegistryConfig,
) -> Option<Marker> {
    match event.kind {
        EventKind::Commit => {
            if let Some(meta) = stream
                .index_blobs
                .get(&event.commit)
                .and_then(|index| index.get(&event.artifact))
            {
                artifact.meta = Some(meta.clone());
            }
            None
        }
        EventKind::Registration => apply_registration(artifact, event),
        EventKind::Deregistration => apply_deregistration(artifact, event),
        EventKind::Assignment => apply_assignment(artifact, event, config),
        EventKind::Unassignment => apply_unassignment(artifact, event, config),
        EventKind::Deprecation => {
            artifact.deprecated = true;
            None
        }
        EventKind::Annotation => {
            if let Some(message) = &event.message {
                artifact.notes.push(message.clone());
            }
            None
        }
    }
}

fn apply_registration(artifact: &mut ArtifactState, event: &Event) -> Option<Marker> {
    // Any registration resets the artifact-wide deprecation window.
    artifact.deprecated = false;
    let version = event.version.clone().unwrap_or_default();

    // Duplicate over a live registration: keep the event in history, mark
    // it, and do not shadow the earlier one.
    if artifact.version(&version).is_some_and(VersionState::is_active) {
        log::warn!(
            "duplicate registration of {}@{} by {}",
            artifact.name,
            version,
            event.reference
        );
        return Some(Marker::Conflict);
    }

    match artifact.version_mut(&version) {
        // Re-registration after deregistration revives the version at the
        // new target commit.
        Some(existing) => {
            existing.deprecated = false;
            existing.registered = true;
            existing.commit = event.commit.clone();
            existing.created_at = event.timestamp;
        }
        None => {
            artifact.versions.push(VersionState::new(version, event));
        }
    }
    None
}

fn apply_deregistration(artifact: &mut ArtifactState, event: &Event) -> Option<Marker> {
    let version = event.version.clone().unwrap_or_default();
    match artifact.version_mut(&version) {
        Some(existing) if existing.is_active() => {
            existing.deprecated = true;
            None
        }
        _ => Some(Marker::Orphan),
    }
}

fn apply_assignment(
    artifact: &mut ArtifactState,
    event: &Event,
    config: &RegistryConfig,
) -> Option<Marker> {
    // Any assignment resets the artifact-wide deprecation window.
    artifact.deprecated = false;
    let stage = event.stage.clone().unwrap_or_default();
    if event.simple {
        artifact.simple_stages.insert(stage.clone());
    }

    let Some(version) = artifact
        .version_at_commit(&event.commit)
        .map(|v| v.version.clone())
    else {
        // No version at the target commit: the stage points at nothing.
        artifact.stage_map.remove(&stage);
        return Some(Marker::Orphan);
    };

    if config.kanban {
        // At most one stage per version: this assignment displaces every
        // other stage currently held by the version.
        artifact.stage_map.retain(|held_stage, versions| {
            if held_stage == &stage {
                return true;
            }
            versions.retain(|v| v != &version);
            !versions.is_empty()
        });
    }

    let versions = artifact.stage_map.entry(stage).or_default();
    if config.multi_version {
        // Re-assignment of the same version re-stamps it at the end.
        versions.retain(|v| v != &version);
        versions.push(version.clone());
    } else {
        *versions = vec![version.clone()];
    }

    if let Some(state) = artifact.version_mut(&version) {
        state.history.push(event.clone());
    }
    None
}

fn apply_unassignment(
    artifact: &mut ArtifactState,
    event: &Event,
    config: &RegistryConfig,
) -> Option<Marker> {
    let stage = event.stage.clone().unwrap_or_default();
    if event.simple {
        artifact.simple_stages.insert(stage.clone());
    }

    let resolved = artifact
        .version_at_commit(&event.commit)
        .map(|v| v.version.clone());
    let previously_held = artifact.stage_map.contains_key(&stage);

    match (&resolved, config.multi_version) {
        (Some(version), true) => {
            if let Some(versions) = artifact.stage_map.get_mut(&stage) {
                versions.retain(|v| v != version);
                if versions.is_empty() {
                    artifact.stage_map.remove(&stage);
                }
            }
        }
        _ => {
            artifact.stage_map.remove(&stage);
        }
    }

    if let Some(version) = resolved {
        if let Some(state) = artifact.version_mut(&version) {
            state.history.push(event.clone());
        }
        if previously_held {
            None
        } else {
            Some(Marker::Orphan)
        }
    } else {
        Some(Marker::Orphan)
    }
}

fn finalize(state: &mut RegistryState) {
    for artifact in state.artifacts.values_mut() {
        // History for a simple-mode (artifact, stage) pair degrades to
        // conflict marker rows.
        for row in &mut artifact.history {
            if matches!(
                row.event.kind,
                EventKind::Assignment | EventKind::Unassignment
            ) && row
                .event
                .stage
                .as_deref()
                .is_some_and(|stage| artifact.simple_stages.contains(stage))
            {
                row.marker = Some(Marker::Conflict);
            }
        }

        // Project the per-stage currency back onto the versions.
        for version in &mut artifact.versions {
            version.stages.clear();
        }
        for (stage, versions) in &artifact.stage_map {
            for version in versions {
                if let Some(state) = artifact
                    .versions
                    .iter_mut()
                    .find(|v| &v.version == version)
                {
                    state.stages.insert(stage.clone());
                }
            }
        }
    }
}
