//! Pure queries over the assembled registry state.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Sort;
use crate::event::{Event, EventKind};
use crate::index::ArtifactMeta;
use crate::state::{ArtifactState, HistoryRow, RegistryState, VersionState};
use crate::version::ArtifactVersion;
use crate::Error;

/// One artifact line of the registry overview.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowRow {
    /// Artifact name.
    pub artifact: String,
    /// Greatest active version under the configured sort.
    pub latest: Option<String>,
    /// Current version(s) per stage.
    pub stages: BTreeMap<String, Vec<String>>,
    /// Artifact-wide deprecation flag.
    pub deprecated: bool,
    /// The artifact has at least one registered version.
    pub registered: bool,
    /// The artifact has index metadata.
    pub annotated: bool,
}

/// One version line of a per-artifact listing.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRow {
    /// Version string.
    pub version: String,
    /// Committer timestamp of the registration.
    pub created_at: i64,
    /// Commit the version points at.
    pub commit: String,
    /// Stages currently held by this version.
    pub stages: BTreeSet<String>,
    /// The registration was withdrawn.
    pub deprecated: bool,
}

/// Registry overview: one row per artifact.
pub fn show(state: &RegistryState) -> Vec<ShowRow> {
    state
        .artifacts
        .values()
        .map(|artifact| ShowRow {
            artifact: artifact.name.clone(),
            latest: latest_version(state, artifact).map(|v| v.version.clone()),
            stages: ordered_stage_map(state, artifact),
            deprecated: artifact.deprecated,
            registered: !artifact.versions.is_empty(),
            annotated: artifact.meta.is_some(),
        })
        .collect()
}

/// Per-version rows for one artifact.
///
/// Deregistered versions are excluded unless `include_all` is set.
pub fn show_versions(
    state: &RegistryState,
    artifact: &str,
    include_all: bool,
) -> Result<Vec<VersionRow>, Error> {
    let artifact = lookup(state, artifact)?;
    Ok(artifact
        .versions
        .iter()
        .filter(|v| include_all || v.is_active())
        .map(|v| VersionRow {
            version: v.version.clone(),
            created_at: v.created_at,
            commit: v.commit.clone(),
            stages: v.stages.clone(),
            deprecated: v.deprecated,
        })
        .collect())
}

/// Raw event rows in display order.
///
/// With an artifact the rows are that artifact's; without, the histories of
/// all artifacts merged in display order.
pub fn history(state: &RegistryState, artifact: Option<&str>) -> Result<Vec<HistoryRow>, Error> {
    match artifact {
        Some(name) => Ok(lookup(state, name)?.history.clone()),
        None => {
            let mut rows: Vec<HistoryRow> = state
                .artifacts
                .values()
                .flat_map(|artifact| artifact.history.iter().cloned())
                .collect();
            rows.sort_by(|a, b| a.event.order_key().cmp(&b.event.order_key()));
            Ok(rows)
        }
    }
}

/// Greatest registered, non-deprecated version of the artifact.
pub fn latest<'a>(
    state: &'a RegistryState,
    artifact: &str,
) -> Result<Option<&'a VersionState>, Error> {
    let artifact = lookup(state, artifact)?;
    Ok(latest_version(state, artifact))
}

/// The version currently pointed to by `stage`, or `None`.
pub fn which(state: &RegistryState, artifact: &str, stage: &str) -> Result<Option<String>, Error> {
    Ok(which_all(state, artifact, stage)?.into_iter().next())
}

/// All versions currently holding `stage`, ordered by the configured sort.
///
/// At most one element unless multi-version assignment is enabled.
pub fn which_all(
    state: &RegistryState,
    artifact: &str,
    stage: &str,
) -> Result<Vec<String>, Error> {
    let artifact = lookup(state, artifact)?;
    let Some(versions) = artifact.stage_map.get(stage) else {
        return Ok(Vec::new());
    };
    Ok(order_versions(state, versions))
}

/// Latest index metadata for the artifact.
pub fn describe<'a>(
    state: &'a RegistryState,
    artifact: &str,
) -> Result<Option<&'a ArtifactMeta>, Error> {
    Ok(lookup(state, artifact)?.meta.as_ref())
}

/// Classify a ref against the assembled state.
///
/// Returns the event recorded for the tag, or `None` for refs the registry
/// does not know about.
pub fn check_ref(state: &RegistryState, reference: &str) -> Option<Event> {
    let name = reference.strip_prefix("refs/tags/").unwrap_or(reference);
    state
        .artifacts
        .values()
        .flat_map(|artifact| artifact.history.iter())
        .find(|row| row.event.kind != EventKind::Commit && row.event.reference == name)
        .map(|row| row.event.clone())
}

fn lookup<'a>(state: &'a RegistryState, name: &str) -> Result<&'a ArtifactState, Error> {
    state
        .artifact(name)
        .ok_or_else(|| Error::UnknownArtifact(name.to_string()))
}

fn latest_version<'a>(
    state: &'a RegistryState,
    artifact: &'a ArtifactState,
) -> Option<&'a VersionState> {
    let active: Vec<&VersionState> = artifact.active_versions().collect();
    if active.is_empty() {
        return None;
    }
    match state.sort {
        Sort::ByTime => {
            let released: Vec<&VersionState> = active
                .iter()
                .copied()
                .filter(|v| !is_prerelease(state, v))
                .collect();
            let pool = if released.is_empty() { active } else { released };
            pool.into_iter().max_by_key(|v| v.created_at)
        }
        Sort::BySemver => {
            let parsed: Vec<(ArtifactVersion, &VersionState)> = active
                .iter()
                .filter_map(|v| {
                    ArtifactVersion::parse(&v.version, state.convention)
                        .ok()
                        .map(|parsed| (parsed, *v))
                })
                .collect();
            let greatest =
                ArtifactVersion::greatest(parsed.iter().map(|(parsed, _)| parsed), false)?;
            parsed
                .iter()
                .find(|(parsed, _)| parsed == greatest)
                .map(|(_, v)| *v)
        }
    }
}

fn is_prerelease(state: &RegistryState, version: &VersionState) -> bool {
    ArtifactVersion::parse(&version.version, state.convention)
        .map(|v| v.is_prerelease())
        .unwrap_or(false)
}

fn ordered_stage_map(
    state: &RegistryState,
    artifact: &ArtifactState,
) -> BTreeMap<String, Vec<String>> {
    artifact
        .stage_map
        .iter()
        .map(|(stage, versions)| (stage.clone(), order_versions(state, versions)))
        .collect()
}

// Assignment order is most-recent-first under by_time; by_semver orders
// greatest-first via the version algebra.
fn order_versions(state: &RegistryState, versions: &[String]) -> Vec<String> {
    match state.sort {
        Sort::ByTime => versions.iter().rev().cloned().collect(),
        Sort::BySemver => {
            let mut parsed: Vec<(Option<ArtifactVersion>, String)> = versions
                .iter()
                .map(|v| {
                    (
                        ArtifactVersion::parse(v, state.convention).ok(),
                        v.clone(),
                    )
                })
                .collect();
            parsed.sort_by(|(a, an), (b, bn)| match (a, b) {
                (Some(a), Some(b)) => b.compare(a),
                _ => bn.cmp(an),
            });
            parsed.into_iter().map(|(_, name)| name).collect()
        }
    }
}
