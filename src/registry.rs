//! High-level facade binding a repository to the registry engine.

use std::path::Path;

use git2::Repository;

use crate::cancel::Token;
use crate::collector::{self, Scope};
use crate::config::RegistryConfig;
use crate::git_utils;
use crate::mutator::Plan;
use crate::state::{self, RegistryState};
use crate::Error;

/// A repository paired with its resolved configuration.
///
/// ```no_run
/// use tagreg::cancel::Token;
/// use tagreg::collector::Scope;
/// use tagreg::Registry;
///
/// # fn main() -> Result<(), tagreg::Error> {
/// let registry = Registry::open(std::path::Path::new("."))?;
/// let state = registry.assemble(&Scope::Head, &Token::new())?;
/// for name in state.artifacts.keys() {
///     println!("{name}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct Registry {
    repo: Repository,
    config: RegistryConfig,
}

impl Registry {
    /// Discover the repository containing `path` and load its
    /// configuration from `.gto` and the environment.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let repo = git_utils::open_repository(path)?;
        let root = repo.workdir().map(Path::to_path_buf);
        let config = RegistryConfig::load(root.as_deref().unwrap_or(path))?;
        Ok(Registry { repo, config })
    }

    /// Bind a repository to an explicit configuration.
    pub fn with_config(path: &Path, config: RegistryConfig) -> Result<Self, Error> {
        let repo = git_utils::open_repository(path)?;
        Ok(Registry { repo, config })
    }

    /// The resolved configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The underlying repository handle.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Collect events over `scope` and fold them into a fresh state.
    ///
    /// There is no incremental update path: writes become visible on the
    /// next call.
    pub fn assemble(&self, scope: &Scope, token: &Token) -> Result<RegistryState, Error> {
        let stream = collector::collect(&self.repo, &self.config, scope, token)?;
        Ok(state::assemble(&stream, &self.config))
    }

    /// Resolve a commitish spec, defaulting to HEAD.
    pub fn resolve_commit(&self, spec: Option<&str>) -> Result<String, Error> {
        git_utils::resolve_commit(&self.repo, spec)
    }

    /// Apply a mutation plan to the repository.
    pub fn apply(&self, plan: &Plan, token: &Token) -> Result<Vec<String>, Error> {
        git_utils::apply_plan(&self.repo, plan, token)
    }
}
