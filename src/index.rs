//! Reader for the declarative `artifacts.yaml` index.
//!
//! The top level is a mapping from artifact name to metadata. The legacy
//! list form `[{name, type, path, ...}, ...]` is accepted on read and
//! converted. Unknown keys are preserved under `custom` so forward
//! compatible additions survive a round trip through the registry.

use std::collections::BTreeMap;
use std::path::Path;

use git2::{Commit, Repository};
use serde::{Deserialize, Serialize};

use crate::codec::artifact_name_valid;
use crate::Error;

fn default_virtual() -> bool {
    true
}

/// Index metadata for one artifact, as of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Free-form artifact type, checked against the configured allow-list.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Repo-relative path or URI of the artifact's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// True when the registry does not pin the content to a commit.
    #[serde(rename = "virtual", default = "default_virtual")]
    pub is_virtual: bool,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unknown keys, preserved verbatim.
    #[serde(flatten)]
    pub custom: BTreeMap<String, serde_yaml::Value>,
}

impl Default for ArtifactMeta {
    fn default() -> Self {
        ArtifactMeta {
            kind: None,
            path: None,
            is_virtual: default_virtual(),
            labels: Vec::new(),
            description: None,
            custom: BTreeMap::new(),
        }
    }
}

impl ArtifactMeta {
    /// An artifact without a tracked path is virtual regardless of the flag.
    pub fn effectively_virtual(&self) -> bool {
        self.is_virtual || self.path.is_none()
    }
}

/// Normalized index: artifact name to metadata.
pub type ArtifactIndex = BTreeMap<String, ArtifactMeta>;

#[derive(Debug, Deserialize)]
struct LegacyRow {
    name: String,
    #[serde(flatten)]
    meta: ArtifactMeta,
}

// Shape detection: a flat mapping or the legacy list form. A bare
// `name:` row with no body maps to default metadata.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawIndex {
    Map(BTreeMap<String, Option<ArtifactMeta>>),
    List(Vec<LegacyRow>),
}

/// Parse index text into the normalized flat mapping.
///
/// Rows with invalid artifact names are dropped with a warning rather than
/// failing the whole index.
pub fn parse_index(text: &str, origin: &str) -> Result<ArtifactIndex, Error> {
    if text.trim().is_empty() {
        return Ok(ArtifactIndex::new());
    }
    let raw: RawIndex = serde_yaml::from_str(text).map_err(|e| Error::MalformedIndex {
        path: origin.to_string(),
        reason: e.to_string(),
    })?;
    let entries: Vec<(String, ArtifactMeta)> = match raw {
        RawIndex::Map(map) => map
            .into_iter()
            .map(|(name, meta)| (name, meta.unwrap_or_default()))
            .collect(),
        RawIndex::List(rows) => rows.into_iter().map(|r| (r.name, r.meta)).collect(),
    };
    let mut index = ArtifactIndex::new();
    for (name, meta) in entries {
        if !artifact_name_valid(&name) {
            log::warn!("index {origin}: dropping row with invalid artifact name `{name}`");
            continue;
        }
        index.insert(name, meta);
    }
    Ok(index)
}

/// Read the index blob at a commit.
///
/// A missing file yields an empty mapping; a malformed file is an error the
/// caller may downgrade for historical commits.
pub fn read_at_commit(
    repo: &Repository,
    commit: &Commit,
    index_path: &str,
) -> Result<ArtifactIndex, Error> {
    let tree = commit.tree()?;
    let entry = match tree.get_path(Path::new(index_path)) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => {
            log::trace!("no {index_path} at {}", commit.id());
            return Ok(ArtifactIndex::new());
        }
        Err(e) => return Err(e.into()),
    };
    let object = entry.to_object(repo)?;
    let blob = match object.as_blob() {
        Some(blob) => blob,
        None => return Ok(ArtifactIndex::new()),
    };
    let text = match std::str::from_utf8(blob.content()) {
        Ok(text) => text,
        Err(e) => {
            return Err(Error::MalformedIndex {
                path: index_path.to_string(),
                reason: format!("not valid UTF-8: {e}"),
            })
        }
    };
    parse_index(text, &format!("{index_path}@{}", commit.id()))
}

/// Read the index from the working tree.
pub fn read_worktree(repo: &Repository, index_path: &str) -> Result<ArtifactIndex, Error> {
    let workdir = match repo.workdir() {
        Some(dir) => dir,
        None => return Ok(ArtifactIndex::new()),
    };
    let full = workdir.join(index_path);
    if !full.exists() {
        return Ok(ArtifactIndex::new());
    }
    let text = std::fs::read_to_string(&full)?;
    parse_index(&text, index_path)
}

#[cfg(test)]
mod tests {
    use claims::assert_err;
    use map_macro::btree_map;

    use super::*;

    #[test]
    fn flat_mapping_form() {
        let yaml = "\
rf:
  type: model
  path: models/rf.pkl
  virtual: false
features:
  type: dataset
";
        let index = parse_index(yaml, "artifacts.yaml").unwrap();
        assert_eq!(2, index.len());
        let rf = &index["rf"];
        assert_eq!(Some("model".to_string()), rf.kind);
        assert_eq!(Some("models/rf.pkl".to_string()), rf.path);
        assert!(!rf.is_virtual);
        assert!(!rf.effectively_virtual());
        // `virtual` defaults to true
        assert!(index["features"].is_virtual);
    }

    #[test]
    fn legacy_list_form_is_converted() {
        let yaml = "\
- name: rf
  type: model
- name: nn
  path: models/nn.pt
";
        let index = parse_index(yaml, "artifacts.yaml").unwrap();
        assert_eq!(2, index.len());
        assert_eq!(Some("model".to_string()), index["rf"].kind);
        assert_eq!(Some("models/nn.pt".to_string()), index["nn"].path);
    }

    #[test]
    fn unknown_keys_are_preserved_under_custom() {
        let yaml = "\
rf:
  type: model
  owner: ml-team
  priority: 3
";
        let index = parse_index(yaml, "artifacts.yaml").unwrap();
        let expected = btree_map! {
            "owner".to_string() => serde_yaml::Value::from("ml-team"),
            "priority".to_string() => serde_yaml::Value::from(3),
        };
        assert_eq!(expected, index["rf"].custom);
    }

    #[test]
    fn missing_and_empty_are_empty() {
        assert!(parse_index("", "artifacts.yaml").unwrap().is_empty());
        assert!(parse_index("   \n", "artifacts.yaml").unwrap().is_empty());
    }

    #[test]
    fn malformed_index_is_an_error() {
        assert_err!(parse_index("{not yaml: [", "artifacts.yaml"));
        assert_err!(parse_index("- 3\n- 4\n", "artifacts.yaml"));
    }

    #[test]
    fn invalid_names_are_dropped() {
        let yaml = "\
ok-name:
  type: model
bad name:
  type: model
";
        let index = parse_index(yaml, "artifacts.yaml").unwrap();
        assert_eq!(1, index.len());
        assert!(index.contains_key("ok-name"));
    }
}
