//! Enumerates tag refs and scoped commits into an ordered event stream.

use std::collections::BTreeMap;

use git2::{BranchType, Commit, ObjectType, Repository};

use crate::cancel::Token;
use crate::codec;
use crate::config::RegistryConfig;
use crate::event::Event;
use crate::index::{self, ArtifactIndex};
use crate::Error;

/// Which commits to scan for index observations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum Scope {
    /// HEAD only.
    #[default]
    Head,
    /// The tip of every local branch, plus HEAD.
    AllBranches,
    /// Every commit reachable from a local branch or HEAD.
    AllCommits,
    /// An explicit set of commitish specs.
    Commits(Vec<String>),
}

/// The collector's output: display-ordered events plus the index blobs
/// read along the way, keyed by commit sha.
#[derive(Debug, Default, Clone)]
pub struct EventStream {
    /// Events sorted by (commit time, tag-creation time, seq, tag name).
    pub events: Vec<Event>,
    /// Index content per scanned commit.
    pub index_blobs: BTreeMap<String, ArtifactIndex>,
}

/// Collect the event stream for a repository.
///
/// Tag names outside the registry grammars are ignored; two tags with
/// identical parsed content are both kept, ordered by their tag objects'
/// creation times. The token is checked once per tag ref and once per
/// scoped commit.
pub fn collect(
    repo: &Repository,
    config: &RegistryConfig,
    scope: &Scope,
    token: &Token,
) -> Result<EventStream, Error> {
    let mut events = collect_tag_events(repo, config, token)?;
    let mut index_blobs = BTreeMap::new();

    let head_id = head_commit_id(repo);
    for commit in scope_commits(repo, scope)? {
        token.check()?;
        let sha = commit.id().to_string();
        if !index_blobs.contains_key(&sha) {
            let index = match index::read_at_commit(repo, &commit, &config.index) {
                Ok(index) => index,
                // Historical scans must not abort on a malformed index;
                // only the index at HEAD is fatal.
                Err(e @ Error::MalformedIndex { .. }) => {
                    if Some(commit.id()) == head_id {
                        return Err(e);
                    }
                    log::warn!("{e}; treating index at {sha} as empty");
                    ArtifactIndex::new()
                }
                Err(e) => return Err(e),
            };
            index_blobs.insert(sha.clone(), index);
        }
        let author = commit.author().name().unwrap_or_default().to_string();
        let timestamp = commit.time().seconds();
        for artifact in index_blobs[&sha].keys() {
            events.push(Event {
                kind: crate::event::EventKind::Commit,
                artifact: artifact.clone(),
                version: None,
                stage: None,
                reference: sha.clone(),
                commit: sha.clone(),
                author: author.clone(),
                timestamp,
                created_at: timestamp,
                seq: None,
                message: None,
                simple: false,
            });
        }
    }

    events.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    log::debug!("collected {} events", events.len());
    Ok(EventStream {
        events,
        index_blobs,
    })
}

fn collect_tag_events(
    repo: &Repository,
    config: &RegistryConfig,
    token: &Token,
) -> Result<Vec<Event>, Error> {
    let mut events = Vec::new();
    let names = repo.tag_names(None)?;
    for name in names.iter().flatten() {
        token.check()?;
        let Some(parsed) = codec::parse(name, config.convention) else {
            continue;
        };
        let oid = repo.refname_to_id(&format!("refs/tags/{name}"))?;
        let object = repo.find_object(oid, None)?;

        let (commit, author, created_at, message) = match object.as_tag() {
            Some(tag) => {
                let target = tag.target()?.peel_to_commit()?;
                let (author, created_at) = match tag.tagger() {
                    Some(tagger) => (
                        tagger.name().unwrap_or_default().to_string(),
                        tagger.when().seconds(),
                    ),
                    None => (
                        target.author().name().unwrap_or_default().to_string(),
                        target.time().seconds(),
                    ),
                };
                let message = tag.message().map(|m| m.trim_end().to_string());
                (target, author, created_at, message)
            }
            None => {
                // Lightweight tag: fall back to the referenced commit.
                let target = object.peel_to_commit()?;
                let author = target.author().name().unwrap_or_default().to_string();
                let created_at = target.time().seconds();
                (target, author, created_at, None)
            }
        };

        log::trace!("tag `{name}` parsed as {parsed:?}");
        events.push(Event::from_parsed(
            parsed,
            name.to_string(),
            commit.id().to_string(),
            author,
            commit.time().seconds(),
            created_at,
            message,
        ));
    }
    Ok(events)
}

fn head_commit_id(repo: &Repository) -> Option<git2::Oid> {
    repo.head().ok()?.peel_to_commit().ok().map(|c| c.id())
}

fn scope_commits<'a>(repo: &'a Repository, scope: &Scope) -> Result<Vec<Commit<'a>>, Error> {
    let mut commits = Vec::new();
    match scope {
        Scope::Head => {
            if let Ok(head) = repo.head() {
                commits.push(head.peel_to_commit()?);
            }
        }
        Scope::AllBranches => {
            if let Ok(head) = repo.head() {
                commits.push(head.peel_to_commit()?);
            }
            for branch in repo.branches(Some(BranchType::Local))? {
                let (branch, _) = branch?;
                let commit = branch.get().peel_to_commit()?;
                if !commits.iter().any(|c: &Commit| c.id() == commit.id()) {
                    commits.push(commit);
                }
            }
        }
        Scope::AllCommits => {
            let mut revwalk = repo.revwalk()?;
            revwalk.push_glob("refs/heads/*")?;
            if repo.head().is_ok() {
                revwalk.push_head()?;
            }
            for oid in revwalk {
                commits.push(repo.find_commit(oid?)?);
            }
        }
        Scope::Commits(specs) => {
            for spec in specs {
                let object = repo
                    .revparse_single(spec)
                    .map_err(|_| Error::UnknownRef(spec.clone()))?;
                let commit = object
                    .peel(ObjectType::Commit)
                    .map_err(|_| Error::UnknownRef(spec.clone()))?
                    .into_commit()
                    .map_err(|_| Error::UnknownRef(spec.clone()))?;
                commits.push(commit);
            }
        }
    }
    Ok(commits)
}
