//! Registry configuration from `.gto` and the `GTO_` environment.
//!
//! Precedence, lowest to highest: built-in defaults, the `.gto` YAML file
//! at the repository root, `GTO_`-prefixed environment variables. List
//! values in the environment are comma-separated.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::version::Convention;
use crate::Error;

/// Name of the configuration file at the repository root.
pub const CONFIG_FILE: &str = ".gto";
/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "GTO_";
/// Default index path within the repository.
pub const DEFAULT_INDEX: &str = "artifacts.yaml";

/// Order used by "greatest" queries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    /// Greatest by event timestamp.
    #[default]
    ByTime,
    /// Greatest by the version algebra.
    BySemver,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::ByTime => write!(f, "by_time"),
            Sort::BySemver => write!(f, "by_semver"),
        }
    }
}

impl FromStr for Sort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "by_time" => Ok(Sort::ByTime),
            "by_semver" => Ok(Sort::BySemver),
            _ => Err(Error::Config(format!(
                "sort must be `by_time` or `by_semver`, not `{s}`"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    types: Vec<String>,
    stages: Vec<String>,
    version_convention: Option<Convention>,
    emojis: Option<bool>,
    index: Option<String>,
    sort: Option<Sort>,
    kanban: Option<bool>,
    multi_version: Option<bool>,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_yaml::Value>,
}

/// Resolved registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Allow-list of artifact types; empty means any.
    pub types: Vec<String>,
    /// Allow-list of stage names; empty means any.
    pub stages: Vec<String>,
    /// Version naming convention.
    pub convention: Convention,
    /// Render decorative glyphs in output (boundary concern).
    pub emojis: bool,
    /// Path of the index file within the repository.
    pub index: String,
    /// Order for "greatest" queries.
    pub sort: Sort,
    /// At most one stage per version (computed view).
    pub kanban: bool,
    /// Allow several versions to hold the same stage concurrently.
    pub multi_version: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            types: Vec::new(),
            stages: Vec::new(),
            convention: Convention::default(),
            emojis: false,
            index: DEFAULT_INDEX.to_string(),
            sort: Sort::default(),
            kanban: false,
            multi_version: false,
        }
    }
}

impl RegistryConfig {
    /// Load configuration for a repository rooted at `root`.
    ///
    /// Reads `.gto` when present, then applies `GTO_` environment
    /// overrides.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let mut config = RegistryConfig::default();
        let file = root.join(CONFIG_FILE);
        if file.exists() {
            let text = std::fs::read_to_string(&file)?;
            config.apply_file(&text)?;
            log::debug!("configuration loaded from {}", file.display());
        }
        config.apply_overrides(|key| std::env::var(key).ok())?;
        log::trace!("resolved configuration: {config:?}");
        Ok(config)
    }

    fn apply_file(&mut self, text: &str) -> Result<(), Error> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let raw: RawConfig = serde_yaml::from_str(text)
            .map_err(|e| Error::Config(format!("cannot parse {CONFIG_FILE}: {e}")))?;
        for key in raw.unknown.keys() {
            log::warn!("unknown configuration key `{key}` ignored");
        }
        self.types = raw.types;
        self.stages = raw.stages;
        if let Some(convention) = raw.version_convention {
            self.convention = convention;
        }
        if let Some(emojis) = raw.emojis {
            self.emojis = emojis;
        }
        if let Some(index) = raw.index {
            self.index = index;
        }
        if let Some(sort) = raw.sort {
            self.sort = sort;
        }
        if let Some(kanban) = raw.kanban {
            self.kanban = kanban;
        }
        if let Some(multi_version) = raw.multi_version {
            self.multi_version = multi_version;
        }
        Ok(())
    }

    // Environment lookup is injected so tests do not mutate process state.
    fn apply_overrides<F>(&mut self, get: F) -> Result<(), Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = get("GTO_TYPES") {
            self.types = split_list(&value);
        }
        if let Some(value) = get("GTO_STAGES") {
            self.stages = split_list(&value);
        }
        if let Some(value) = get("GTO_VERSION_CONVENTION") {
            self.convention = value.parse()?;
        }
        if let Some(value) = get("GTO_EMOJIS") {
            self.emojis = parse_bool("GTO_EMOJIS", &value)?;
        }
        if let Some(value) = get("GTO_INDEX") {
            self.index = value;
        }
        if let Some(value) = get("GTO_SORT") {
            self.sort = value.parse()?;
        }
        if let Some(value) = get("GTO_KANBAN") {
            self.kanban = parse_bool("GTO_KANBAN", &value)?;
        }
        if let Some(value) = get("GTO_MULTI_VERSION") {
            self.multi_version = parse_bool("GTO_MULTI_VERSION", &value)?;
        }
        Ok(())
    }

    /// Is the stage acceptable under the allow-list?
    pub fn stage_allowed(&self, stage: &str) -> bool {
        self.stages.is_empty() || self.stages.iter().any(|s| s == stage)
    }

    /// Is the artifact type acceptable under the allow-list?
    pub fn type_allowed(&self, kind: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t == kind)
    }

    /// Set the artifact type allow-list.
    pub fn set_types(mut self, types: Vec<String>) -> Self {
        self.types = types;
        self
    }

    /// Set the stage allow-list.
    pub fn set_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Set the version convention.
    pub fn set_convention(mut self, convention: Convention) -> Self {
        self.convention = convention;
        self
    }

    /// Set the sort order for "greatest" queries.
    pub fn set_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    /// Set the index path.
    pub fn set_index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    /// Enable or disable the kanban workflow.
    pub fn set_kanban(mut self, kanban: bool) -> Self {
        self.kanban = kanban;
        self
    }

    /// Enable or disable multiple versions per stage.
    pub fn set_multi_version(mut self, multi_version: bool) -> Self {
        self.multi_version = multi_version;
        self
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be a boolean, not `{value}`"))),
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_err;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let config = RegistryConfig::default();
        assert_eq!(Convention::Numbers, config.convention);
        assert_eq!(Sort::ByTime, config.sort);
        assert_eq!(DEFAULT_INDEX, config.index);
        assert!(config.types.is_empty());
        assert!(config.stage_allowed("anything"));
        assert!(!config.kanban);
        assert!(!config.multi_version);
    }

    #[test]
    fn file_settings_are_applied() {
        let mut config = RegistryConfig::default();
        config
            .apply_file(
                "\
types: [model, dataset]
stages: [dev, staging, prod]
version_convention: semver
sort: by_semver
emojis: true
index: registry/artifacts.yaml
",
            )
            .unwrap();
        assert_eq!(vec!["model", "dataset"], config.types);
        assert_eq!(Convention::Semver, config.convention);
        assert_eq!(Sort::BySemver, config.sort);
        assert!(config.emojis);
        assert_eq!("registry/artifacts.yaml", config.index);
        assert!(config.stage_allowed("prod"));
        assert!(!config.stage_allowed("qa"));
        assert!(config.type_allowed("model"));
        assert!(!config.type_allowed("notebook"));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = RegistryConfig::default();
        config.apply_file("stages: [dev]\n").unwrap();
        config
            .apply_overrides(|key| match key {
                "GTO_STAGES" => Some("staging, prod".to_string()),
                "GTO_VERSION_CONVENTION" => Some("semver".to_string()),
                "GTO_EMOJIS" => Some("true".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(vec!["staging", "prod"], config.stages);
        assert_eq!(Convention::Semver, config.convention);
        assert!(config.emojis);
    }

    #[rstest]
    #[case::bad_convention("GTO_VERSION_CONVENTION", "semantic")]
    #[case::bad_sort("GTO_SORT", "by_date")]
    #[case::bad_bool("GTO_EMOJIS", "maybe")]
    fn invalid_environment_values_are_config_errors(#[case] key: &str, #[case] value: &str) {
        let mut config = RegistryConfig::default();
        let result = config.apply_overrides(|k| {
            if k == key {
                Some(value.to_string())
            } else {
                None
            }
        });
        assert_err!(result);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut config = RegistryConfig::default();
        assert_err!(config.apply_file("stages: [unterminated"));
    }
}
