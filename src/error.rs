//! Error taxonomy for the document store.

use std::io;
use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The resolved path escapes the storage root. Never retried.
    #[error("path '{0}' escapes the storage root")]
    PathTraversal(String),

    #[error("the storage root cannot be deleted")]
    RootDeletion,

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    /// The requested revision does not exist or does not contain the path.
    #[error("revision {revision} does not contain '{path}'")]
    VersionNotFound { path: String, revision: String },

    /// The version-control backend failed to record a commit.
    #[error("commit failed: {0}")]
    Commit(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Git(#[from] git2::Error),
}

impl StoreError {
    /// Maps a filesystem error onto the store-relative path it occurred on.
    pub(crate) fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            _ => StoreError::Io(err),
        }
    }
}
