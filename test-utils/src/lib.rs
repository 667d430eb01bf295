//! Git fixture helpers for the tagreg test suites.

use git2::{Commit, ObjectType, Oid, Repository, Signature, Time};
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Create a temporary directory and initialise a git repository with a
/// first commit in it. Returns the directory and the repository.
pub fn create_test_git_directory() -> (PathBuf, Repository) {
    let temp_dir_string = format!("tests/tmp/test-{}", Uuid::new_v4());
    let temp_dir = Path::new(&temp_dir_string);
    std::fs::create_dir_all(temp_dir).expect("failed to create temporary directory");
    println!("Temporary directory: {temp_dir:?}");

    let repo = Repository::init(temp_dir).expect("failed to initialise repo");
    {
        let mut config = repo.config().expect("failed to open repo config");
        config.set_str("user.name", "tester").unwrap();
        config.set_str("user.email", "tester@example.net").unwrap();
    }

    let file_path = temp_dir.join("first-file");
    let mut file = File::create(&file_path).unwrap();
    file.write_all(b"Hello, world!").unwrap();
    let res = add_and_commit(&repo, Path::new("first-file"), "chore: initial commit", None);
    println!("add_and_commit result: {res:?}");

    (temp_dir.into(), repo)
}

/// Find the last commit in the repository.
pub fn find_last_commit(repo: &'_ Repository) -> Result<Commit<'_>, git2::Error> {
    let obj = repo.head()?.resolve()?.peel(ObjectType::Commit)?;
    obj.into_commit()
        .map_err(|_| git2::Error::from_str("Couldn't find commit"))
}

/// Add a file to the index and commit the change, optionally with a fixed
/// author/committer timestamp. Returns the commit id.
pub fn add_and_commit(
    repo: &Repository,
    path: &Path,
    message: &str,
    when: Option<i64>,
) -> Result<Oid, git2::Error> {
    let mut index = repo.index()?;
    index.add_path(path)?;
    index.write()?;
    let oid = index.write_tree()?;
    let signature = match when {
        Some(seconds) => Signature::new("tester", "tester@example.net", &Time::new(seconds, 0))?,
        None => Signature::now("tester", "tester@example.net")?,
    };
    let tree = repo.find_tree(oid)?;
    let parents = match find_last_commit(repo) {
        Ok(commit) => vec![commit],
        Err(_) => vec![],
    };
    let parents: Vec<&Commit> = parents.iter().collect();
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )
}

/// Write a file under the repository and commit it.
pub fn commit_file(
    repo: &Repository,
    temp_dir: &Path,
    file_name: &str,
    content: &str,
    message: &str,
    when: Option<i64>,
) -> Result<Oid, git2::Error> {
    let file_path = temp_dir.join(file_name);
    let mut file = File::create(&file_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    println!("added file: {}", file_path.display());
    add_and_commit(repo, Path::new(file_name), message, when)
}

/// Write `artifacts.yaml` and commit it.
pub fn commit_index(
    repo: &Repository,
    temp_dir: &Path,
    yaml: &str,
    message: &str,
) -> Result<Oid, git2::Error> {
    commit_file(repo, temp_dir, "artifacts.yaml", yaml, message, None)
}

/// Create an annotated tag on a commit, optionally with a fixed tagger
/// timestamp.
pub fn tag_commit(
    repo: &Repository,
    name: &str,
    target: Oid,
    message: &str,
    when: Option<i64>,
) -> Result<Oid, git2::Error> {
    let object = repo.find_object(target, Some(ObjectType::Commit))?;
    let signature = match when {
        Some(seconds) => Signature::new("tester", "tester@example.net", &Time::new(seconds, 0))?,
        None => Signature::now("tester", "tester@example.net")?,
    };
    repo.tag(name, &object, &signature, message, false)
}

/// Create a lightweight tag on a commit.
pub fn tag_lightweight(repo: &Repository, name: &str, target: Oid) -> Result<Oid, git2::Error> {
    let object = repo.find_object(target, Some(ObjectType::Commit))?;
    repo.tag_lightweight(name, &object, false)
}

/// Display the commit id, author, date and message.
#[allow(dead_code)]
pub fn display_commit(commit: &Commit) {
    let timestamp = commit.time().seconds();
    let tm = chrono::DateTime::from_timestamp(timestamp, 0).unwrap();
    println!(
        "commit {}\nAuthor: {}\nDate:   {}\n\n    {}",
        commit.id(),
        commit.author(),
        tm.to_rfc2822(),
        commit.message().unwrap_or("no commit message")
    );
}
