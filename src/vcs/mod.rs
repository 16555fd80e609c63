//! Git-backed version history with serialized commit application.
//!
//! The store never touches the repository directly: it goes through
//! [`VersionControl`], which owns a [`VersionControlBackend`] and a bounded
//! commit queue drained by a single consumer task. Commits therefore apply
//! strictly in the order they were issued even when document mutations
//! overlap; interleaved stage/commit calls against one repository would
//! corrupt its lock state.

mod git;
mod tests;

pub use git::GitBackend;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

const QUEUE_CAPACITY: usize = 256;

/// How commits relate to the document operation that triggered them.
///
/// `Sync` awaits each commit before the operation returns and propagates
/// backend failures to the caller; `Background` enqueues and returns, with
/// failures only logged. Normal operation is `Background` so saving an edit
/// never waits on version-control latency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    Sync,
    #[default]
    Background,
}

/// One recorded revision touching a path. Newest first in history listings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub author: String,
}

/// A revision plus the full document content as it existed there.
#[derive(Clone, Debug, Serialize)]
pub struct VersionContent {
    #[serde(flatten)]
    pub commit: CommitInfo,
    pub content: String,
}

/// Capability interface over the underlying repository.
///
/// Synchronous by design; [`VersionControl`] runs it on blocking threads.
/// All paths are root-relative with forward slashes.
pub trait VersionControlBackend: Send + Sync + 'static {
    /// Ensure the repository exists with a usable commit identity. Idempotent.
    fn init(&self) -> Result<()>;
    /// Stage the named paths (additions and deletions alike) and commit,
    /// returning the new revision hash.
    fn commit(&self, paths: &[String], message: &str) -> Result<String>;
    /// Root-relative paths with uncommitted worktree changes.
    fn pending_changes(&self) -> Result<Vec<String>>;
    /// Stage everything outstanding and commit.
    fn commit_all(&self, message: &str) -> Result<String>;
    /// Every revision touching `path`, newest first; empty when the path has
    /// no history.
    fn log(&self, path: &str) -> Result<Vec<CommitInfo>>;
    /// Content of `path` as of `revision`, or `None` if the path did not
    /// exist at that revision.
    fn show_at_revision(&self, path: &str, revision: &str) -> Result<Option<VersionContent>>;
    /// Overwrite the working copy of `path` with its content at `revision`.
    /// Does not commit.
    fn checkout_path_at_revision(&self, path: &str, revision: &str) -> Result<()>;
}

struct CommitJob {
    paths: Vec<String>,
    message: String,
    reply: Option<oneshot::Sender<Result<String>>>,
}

/// Front end over the backend: serializes commits through one queue and runs
/// read-side operations on blocking threads.
pub struct VersionControl {
    backend: Arc<dyn VersionControlBackend>,
    queue: mpsc::Sender<CommitJob>,
    mode: CommitMode,
}

impl VersionControl {
    /// Spawns the consumer task that applies commits strictly FIFO. Must be
    /// called from within a Tokio runtime.
    pub fn new(backend: Arc<dyn VersionControlBackend>, mode: CommitMode) -> Self {
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_commit_queue(backend.clone(), rx));
        Self {
            backend,
            queue,
            mode,
        }
    }

    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    pub async fn initialize(&self) -> Result<()> {
        let backend = self.backend.clone();
        blocking(move || backend.init()).await
    }

    /// Fold files changed outside the application into one revision. Called
    /// once at startup, before any document operation.
    pub async fn commit_pending_changes(&self) -> Result<()> {
        let backend = self.backend.clone();
        blocking(move || {
            let pending = backend.pending_changes()?;
            if pending.is_empty() {
                return Ok(());
            }
            debug!(count = pending.len(), "committing external file changes");
            backend.commit_all("Commit external file changes")?;
            Ok(())
        })
        .await
    }

    pub async fn commit_file(&self, path: &str, message: &str) -> Result<()> {
        self.commit_files(vec![path.to_string()], message).await
    }

    /// Queue one commit covering all `paths`. In `Sync` mode the call returns
    /// once the commit has been applied (or failed); in `Background` mode it
    /// returns as soon as the job is enqueued.
    pub async fn commit_files(&self, paths: Vec<String>, message: &str) -> Result<()> {
        match self.mode {
            CommitMode::Sync => {
                let (tx, rx) = oneshot::channel();
                self.enqueue(paths, message, Some(tx)).await?;
                let outcome = rx
                    .await
                    .map_err(|_| StoreError::Commit("commit worker stopped".to_string()))?;
                outcome.map(|_| ())
            }
            CommitMode::Background => self.enqueue(paths, message, None).await,
        }
    }

    async fn enqueue(
        &self,
        paths: Vec<String>,
        message: &str,
        reply: Option<oneshot::Sender<Result<String>>>,
    ) -> Result<()> {
        self.queue
            .send(CommitJob {
                paths,
                message: message.to_string(),
                reply,
            })
            .await
            .map_err(|_| StoreError::Commit("commit worker stopped".to_string()))
    }

    pub async fn history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let backend = self.backend.clone();
        let path = path.to_string();
        blocking(move || backend.log(&path)).await
    }

    pub async fn content_at(&self, path: &str, revision: &str) -> Result<Option<VersionContent>> {
        let backend = self.backend.clone();
        let path = path.to_string();
        let revision = revision.to_string();
        blocking(move || backend.show_at_revision(&path, &revision)).await
    }

    /// Overwrite the working copy of `path` with its content at `revision`.
    /// The caller commits afterwards so the restore is an auditable revision.
    pub async fn restore(&self, path: &str, revision: &str) -> Result<()> {
        let backend = self.backend.clone();
        let path = path.to_string();
        let revision = revision.to_string();
        blocking(move || backend.checkout_path_at_revision(&path, &revision)).await
    }
}

async fn blocking<T: Send + 'static>(
    task: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StoreError::Commit(format!("version control task panicked: {err}")))?
}

/// Single consumer draining the commit queue in FIFO order. A failed commit
/// is reported to its caller (or logged when there is none) and the loop
/// moves on; it must never stall the jobs behind it.
async fn run_commit_queue(
    backend: Arc<dyn VersionControlBackend>,
    mut jobs: mpsc::Receiver<CommitJob>,
) {
    while let Some(job) = jobs.recv().await {
        let CommitJob {
            paths,
            message,
            reply,
        } = job;
        let backend = backend.clone();
        let commit_message = message.clone();
        let outcome = tokio::task::spawn_blocking(move || backend.commit(&paths, &commit_message))
            .await
            .map_err(|err| StoreError::Commit(format!("commit task panicked: {err}")))
            .and_then(|result| result.map_err(|err| StoreError::Commit(err.to_string())));
        match reply {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                if let Err(err) = outcome {
                    warn!(%err, %message, "background commit failed");
                }
            }
        }
    }
}
