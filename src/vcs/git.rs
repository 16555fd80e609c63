//! git2 implementation of the version-control backend.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use git2::{
    Commit, ErrorCode, Index, IndexAddOption, ObjectType, Oid, Repository, Signature, Sort,
    StatusOptions,
};
use parking_lot::Mutex;

use super::{CommitInfo, VersionContent, VersionControlBackend};
use crate::error::{Result, StoreError};

const DEFAULT_AUTHOR: &str = "wiki-hub";
const DEFAULT_EMAIL: &str = "wiki-hub@localhost";

/// Repository rooted at the storage directory; its metadata lives in the
/// hidden `.git` directory the store never exposes.
pub struct GitBackend {
    root: PathBuf,
    repo: Mutex<Repository>,
}

impl GitBackend {
    /// Open the repository at `root`, creating it if absent.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let repo = if root.join(".git").exists() {
            Repository::open(&root)?
        } else {
            std::fs::create_dir_all(&root)?;
            Repository::init(&root)?
        };
        Ok(Self {
            root,
            repo: Mutex::new(repo),
        })
    }
}

impl VersionControlBackend for GitBackend {
    fn init(&self) -> Result<()> {
        let repo = self.repo.lock();
        let mut config = repo.config()?;
        if config.get_string("user.name").is_err() {
            config.set_str("user.name", DEFAULT_AUTHOR)?;
        }
        if config.get_string("user.email").is_err() {
            config.set_str("user.email", DEFAULT_EMAIL)?;
        }
        Ok(())
    }

    fn commit(&self, paths: &[String], message: &str) -> Result<String> {
        let repo = self.repo.lock();
        let mut index = repo.index()?;
        for path in paths {
            let rel = Path::new(path);
            if self.root.join(rel).exists() {
                index.add_path(rel)?;
            } else {
                // deletion, or the source side of a rename
                match index.remove_path(rel) {
                    Ok(()) => {}
                    Err(err) if err.code() == ErrorCode::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        let oid = commit_staged(&repo, &mut index, message)?;
        Ok(oid.to_string())
    }

    fn pending_changes(&self) -> Result<Vec<String>> {
        let repo = self.repo.lock();
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut options))?;
        Ok(statuses
            .iter()
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect())
    }

    fn commit_all(&self, message: &str) -> Result<String> {
        let repo = self.repo.lock();
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        // add_all does not stage deletions
        index.update_all(["*"].iter(), None)?;
        let oid = commit_staged(&repo, &mut index, message)?;
        Ok(oid.to_string())
    }

    fn log(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let repo = self.repo.lock();
        if repo.head().is_err() {
            return Ok(Vec::new());
        }
        let mut walk = repo.revwalk()?;
        walk.push_head()?;
        // TIME alone can tie for commits landing within the same second;
        // the topological constraint keeps children ahead of parents
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        let target = Path::new(path);
        let mut history = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            if commit_touches(&commit, target) {
                history.push(commit_info(&commit));
            }
        }
        Ok(history)
    }

    fn show_at_revision(&self, path: &str, revision: &str) -> Result<Option<VersionContent>> {
        let repo = self.repo.lock();
        let commit = lookup_commit(&repo, path, revision)?;
        let entry = match commit.tree()?.get_path(Path::new(path)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Blob) => entry,
            _ => return Ok(None),
        };
        let blob = repo.find_blob(entry.id())?;
        let content = String::from_utf8_lossy(blob.content()).into_owned();
        Ok(Some(VersionContent {
            commit: commit_info(&commit),
            content,
        }))
    }

    fn checkout_path_at_revision(&self, path: &str, revision: &str) -> Result<()> {
        let repo = self.repo.lock();
        let commit = lookup_commit(&repo, path, revision)?;
        let entry = commit.tree()?.get_path(Path::new(path)).map_err(|_| {
            StoreError::VersionNotFound {
                path: path.to_string(),
                revision: revision.to_string(),
            }
        })?;
        let blob = repo.find_blob(entry.id())?;
        let destination = self.root.join(path);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, blob.content())?;
        Ok(())
    }
}

fn lookup_commit<'r>(repo: &'r Repository, path: &str, revision: &str) -> Result<Commit<'r>> {
    repo.revparse_single(revision)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| StoreError::VersionNotFound {
            path: path.to_string(),
            revision: revision.to_string(),
        })
}

/// Stage writes are done by the caller; this writes the tree and commits on
/// HEAD, handling the unborn-branch case for the first commit.
fn commit_staged(repo: &Repository, index: &mut Index, message: &str) -> Result<Oid> {
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = signature(repo)?;
    let oid = match repo.head() {
        Ok(head) => {
            let parent = head.peel_to_commit()?;
            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent],
            )?
        }
        Err(_) => repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &[])?,
    };
    Ok(oid)
}

fn signature(repo: &Repository) -> Result<Signature<'static>> {
    match repo.signature() {
        Ok(signature) => Ok(signature),
        Err(_) => Ok(Signature::now(DEFAULT_AUTHOR, DEFAULT_EMAIL)?),
    }
}

fn blob_at(commit: &Commit<'_>, path: &Path) -> Option<Oid> {
    commit
        .tree()
        .ok()?
        .get_path(path)
        .ok()
        .map(|entry| entry.id())
}

/// Whether this commit changed `path` relative to every parent: introduced
/// it, removed it, or changed its blob.
fn commit_touches(commit: &Commit<'_>, path: &Path) -> bool {
    let current = blob_at(commit, path);
    if commit.parent_count() == 0 {
        return current.is_some();
    }
    commit.parents().all(|parent| blob_at(&parent, path) != current)
}

fn commit_info(commit: &Commit<'_>) -> CommitInfo {
    let date = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);
    CommitInfo {
        hash: commit.id().to_string(),
        date,
        message: commit.message().unwrap_or_default().trim_end().to_string(),
        author: commit.author().name().unwrap_or("unknown").to_string(),
    }
}
