//! Construction-time configuration for the document store.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::DEFAULT_TTL;
use crate::vcs::CommitMode;

#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
    /// Absolute directory under which every folder and page must resolve.
    pub root: PathBuf,
    /// How long cached reads stay trusted.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: Duration,
    /// Whether document operations wait for their commit to land.
    #[serde(default)]
    pub commit_mode: CommitMode,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_TTL
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache_ttl: DEFAULT_TTL,
            commit_mode: CommitMode::default(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode = mode;
        self
    }
}
