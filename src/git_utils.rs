//! git2 helpers for the boundary around the core engine.
//!
//! The core never writes tags; plans computed by the mutator are applied
//! here, with rollback of partially created multi-tag plans.

use std::path::Path;

use git2::{ObjectType, Repository};

use crate::cancel::Token;
use crate::mutator::{Plan, PlannedTag};
use crate::Error;

/// Discover the repository containing `path`.
pub fn open_repository(path: &Path) -> Result<Repository, Error> {
    Ok(Repository::discover(path)?)
}

/// Resolve a commitish spec to a commit sha; `None` resolves HEAD.
pub fn resolve_commit(repo: &Repository, spec: Option<&str>) -> Result<String, Error> {
    match spec {
        Some(spec) => {
            let object = repo
                .revparse_single(spec)
                .map_err(|_| Error::UnknownRef(spec.to_string()))?;
            let commit = object
                .peel(ObjectType::Commit)
                .map_err(|_| Error::UnknownRef(spec.to_string()))?;
            Ok(commit.id().to_string())
        }
        None => {
            let head = repo.head()?.peel_to_commit()?;
            Ok(head.id().to_string())
        }
    }
}

/// Create one annotated tag from a plan entry.
pub fn create_tag(repo: &Repository, planned: &PlannedTag) -> Result<(), Error> {
    let oid = git2::Oid::from_str(&planned.target)?;
    let object = repo.find_object(oid, Some(ObjectType::Commit))?;
    let signature = repo.signature()?;
    repo.tag(&planned.name, &object, &signature, &planned.message, false)?;
    log::info!("created tag {} at {}", planned.name, planned.target);
    Ok(())
}

/// Delete a tag by name.
pub fn delete_tag(repo: &Repository, name: &str) -> Result<(), Error> {
    repo.tag_delete(name)?;
    log::info!("deleted tag {name}");
    Ok(())
}

/// Apply a plan, returning the names of the tags created or deleted.
///
/// Multi-tag write plans are atomic from the registry's viewpoint: the
/// token is checked before each write, and when a later tag fails the
/// earlier ones are rolled back before the error surfaces.
pub fn apply_plan(repo: &Repository, plan: &Plan, token: &Token) -> Result<Vec<String>, Error> {
    match plan {
        Plan::Write(tags) => {
            let mut created: Vec<String> = Vec::new();
            for planned in tags {
                let result = token.check().and_then(|()| create_tag(repo, planned));
                if let Err(e) = result {
                    for name in created.iter().rev() {
                        if let Err(rollback) = delete_tag(repo, name) {
                            log::error!("rollback of tag {name} failed: {rollback}");
                        }
                    }
                    return Err(e);
                }
                created.push(planned.name.clone());
            }
            Ok(created)
        }
        Plan::Delete(tags) => {
            let mut deleted = Vec::new();
            for name in tags {
                token.check()?;
                delete_tag(repo, name)?;
                deleted.push(name.clone());
            }
            Ok(deleted)
        }
    }
}
