//! Versioned document store for a personal markdown wiki.
//!
//! Pages are plain markdown files under a single storage root, folders are
//! directories, and every page mutation is recorded as a commit in a git
//! repository rooted at the same directory. Reads go through a TTL cache
//! that every write path invalidates explicitly.

pub mod cache;
pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod vcs;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::{DocumentStore, FileNode, FolderNode};
pub use vcs::{CommitInfo, CommitMode, VersionContent};
