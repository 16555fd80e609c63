//! The document store orchestrator.
//!
//! Combines path containment, filesystem I/O, the TTL cache and the commit
//! queue. Side-effect order for every mutation is fixed: validate, mutate the
//! filesystem, invalidate the affected cache keys, then queue or await the
//! commit. Cache invalidation happens strictly after the filesystem mutation
//! succeeds, so a concurrent reader can never re-cache data that is about to
//! change out from under it.


use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{try_join_all, BoxFuture};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::paths::PathResolver;
use crate::vcs::{CommitInfo, GitBackend, VersionContent, VersionControl};

/// Recognized document extension; only files carrying it are listed.
pub const PAGE_EXTENSION: &str = "md";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    File,
}

/// A directory under the storage root, with its subfolders as children.
/// Pages are listed separately via [`DocumentStore::get_pages`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub children: Vec<FolderNode>,
}

/// One markdown page within a folder, non-recursive.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Typed cache keys in place of the historical substring scheme: one cache
/// per key kind, invalidated by structural match.
struct StoreCaches {
    trees: TtlCache<String, FolderNode>,
    pages: TtlCache<String, Vec<FileNode>>,
    content: TtlCache<String, String>,
}

impl StoreCaches {
    fn new(ttl: Duration) -> Self {
        Self {
            trees: TtlCache::new(ttl),
            pages: TtlCache::new(ttl),
            content: TtlCache::new(ttl),
        }
    }

    /// Any folder or page mutation drops every cached tree; trees are cheap
    /// to rebuild at this scale.
    fn invalidate_trees(&self) {
        self.trees.clear();
    }

    /// Drop listing and content entries for one folder subtree. Matching is
    /// component-wise, so `docs` does not hit `docs-archive`.
    fn invalidate_subtree(&self, folder: &str) {
        let prefix = format!("{folder}/");
        let in_subtree =
            |key: &String| key == folder || prefix == "/" || key.starts_with(prefix.as_str());
        self.pages.invalidate_if(in_subtree);
        self.content.invalidate_if(in_subtree);
    }
}

/// Public-facing store. Owns its cache and version control exclusively;
/// collaborators (HTTP layer, agent tools) go through these operations only.
pub struct DocumentStore {
    resolver: PathResolver,
    caches: StoreCaches,
    vcs: VersionControl,
}

impl DocumentStore {
    /// Open the store rooted at `config.root`, creating the directory and
    /// its repository if absent, and spawn the commit queue. Must be called
    /// from within a Tokio runtime. Call [`DocumentStore::initialize`] once
    /// before serving operations.
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root)?;
        let resolver = PathResolver::new(&config.root)?;
        let backend = GitBackend::open(resolver.root())?;
        let vcs = VersionControl::new(Arc::new(backend), config.commit_mode);
        Ok(Self {
            resolver,
            caches: StoreCaches::new(config.cache_ttl),
            vcs,
        })
    }

    /// Ensure the repository has a commit identity and fold files changed
    /// outside the application into an "external changes" revision.
    pub async fn initialize(&self) -> Result<()> {
        self.vcs.initialize().await?;
        self.vcs.commit_pending_changes().await?;
        info!(root = %self.resolver.root().display(), "document store initialized");
        Ok(())
    }

    pub fn root(&self) -> &std::path::Path {
        self.resolver.root()
    }

    // ---- folders ----

    /// Recursive folder tree, cache-checked, subfolders scanned in parallel,
    /// children sorted by name. Hidden directories (dot-prefixed, including
    /// the repository metadata) are never exposed.
    pub async fn get_folder_tree(&self, path: &str) -> Result<FolderNode> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        if let Some(tree) = self.caches.trees.get(&relative) {
            return Ok(tree);
        }
        let metadata = tokio::fs::metadata(&absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &relative))?;
        if !metadata.is_dir() {
            return Err(StoreError::NotADirectory(relative));
        }
        debug!(path = %relative, "building folder tree");
        let tree = scan_folder(self.resolver.clone(), absolute).await?;
        self.caches.trees.insert(relative, tree.clone());
        Ok(tree)
    }

    pub async fn create_folder(&self, path: &str) -> Result<()> {
        let absolute = self.resolver.resolve(path)?;
        tokio::fs::create_dir_all(&absolute).await?;
        self.caches.invalidate_trees();
        Ok(())
    }

    pub async fn delete_folder(&self, path: &str) -> Result<()> {
        let absolute = self.resolver.resolve(path)?;
        if self.resolver.is_root(&absolute) {
            return Err(StoreError::RootDeletion);
        }
        let relative = self.resolver.relative_of(&absolute);
        let metadata = tokio::fs::metadata(&absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &relative))?;
        if !metadata.is_dir() {
            return Err(StoreError::NotADirectory(relative));
        }
        tokio::fs::remove_dir_all(&absolute).await?;
        self.caches.invalidate_trees();
        self.caches.invalidate_subtree(&relative);
        Ok(())
    }

    pub async fn rename_folder(&self, old: &str, new: &str) -> Result<()> {
        let old_absolute = self.resolver.resolve(old)?;
        let new_absolute = self.resolver.resolve(new)?;
        let old_relative = self.resolver.relative_of(&old_absolute);
        let new_relative = self.resolver.relative_of(&new_absolute);
        tokio::fs::metadata(&old_absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &old_relative))?;
        if let Some(parent) = new_absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_absolute, &new_absolute).await?;
        self.caches.invalidate_trees();
        self.caches.invalidate_subtree(&old_relative);
        self.caches.invalidate_subtree(&new_relative);
        Ok(())
    }

    // ---- pages ----

    /// Markdown pages directly inside one folder, sorted by name.
    pub async fn get_pages(&self, folder: &str) -> Result<Vec<FileNode>> {
        let absolute = self.resolver.resolve(folder)?;
        let relative = self.resolver.relative_of(&absolute);
        if let Some(pages) = self.caches.pages.get(&relative) {
            return Ok(pages);
        }
        let metadata = tokio::fs::metadata(&absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &relative))?;
        if !metadata.is_dir() {
            return Err(StoreError::NotADirectory(relative));
        }
        let mut entries = tokio::fs::read_dir(&absolute).await?;
        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let entry_path = entry.path();
            if entry_path.extension() != Some(OsStr::new(PAGE_EXTENSION)) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            // birth time is unavailable on some filesystems
            let created_at = metadata
                .created()
                .map(DateTime::<Utc>::from)
                .unwrap_or(modified_at);
            pages.push(FileNode {
                path: self.resolver.relative_of(&entry_path),
                name,
                node_type: NodeType::File,
                created_at,
                modified_at,
            });
        }
        pages.sort_by(|a, b| a.name.cmp(&b.name));
        self.caches.pages.insert(relative, pages.clone());
        Ok(pages)
    }

    pub async fn create_page(&self, path: &str, content: &str) -> Result<()> {
        let relative = self.write_page(path, content).await?;
        self.vcs
            .commit_file(&relative, &format!("Created page: {relative}"))
            .await
    }

    /// Exact bytes previously written; no normalization is applied.
    pub async fn get_page_content(&self, path: &str) -> Result<String> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        if let Some(content) = self.caches.content.get(&relative) {
            return Ok(content);
        }
        let content = tokio::fs::read_to_string(&absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &relative))?;
        self.caches.content.insert(relative, content.clone());
        Ok(content)
    }

    pub async fn update_page(&self, path: &str, content: &str) -> Result<()> {
        let relative = self.write_page(path, content).await?;
        self.vcs
            .commit_file(&relative, &format!("Updated page: {relative}"))
            .await
    }

    pub async fn delete_page(&self, path: &str) -> Result<()> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        tokio::fs::remove_file(&absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &relative))?;
        self.invalidate_page(&relative);
        self.vcs
            .commit_file(&relative, &format!("Deleted page: {relative}"))
            .await
    }

    /// Rename within or across folders; one commit covers both paths so the
    /// revision captures the rename rather than a delete plus create.
    pub async fn rename_page(&self, old: &str, new: &str) -> Result<()> {
        let old_absolute = self.resolver.resolve(old)?;
        let new_absolute = self.resolver.resolve(new)?;
        let old_relative = self.resolver.relative_of(&old_absolute);
        let new_relative = self.resolver.relative_of(&new_absolute);
        tokio::fs::metadata(&old_absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &old_relative))?;
        if let Some(parent) = new_absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_absolute, &new_absolute).await?;
        self.invalidate_page(&old_relative);
        self.invalidate_page(&new_relative);
        self.vcs
            .commit_files(
                vec![old_relative.clone(), new_relative.clone()],
                &format!("Renamed page: {old_relative} -> {new_relative}"),
            )
            .await
    }

    /// Move a page into another folder, keeping its file name. Fails with
    /// [`StoreError::DestinationExists`] when the target is occupied, leaving
    /// the source untouched. Returns the new root-relative path.
    pub async fn move_page(&self, old: &str, new_folder: &str) -> Result<String> {
        let old_absolute = self.resolver.resolve(old)?;
        let old_relative = self.resolver.relative_of(&old_absolute);
        let folder_absolute = self.resolver.resolve(new_folder)?;
        tokio::fs::metadata(&old_absolute)
            .await
            .map_err(|err| StoreError::from_io(err, &old_relative))?;
        let file_name = old_absolute
            .file_name()
            .ok_or_else(|| StoreError::NotFound(old_relative.clone()))?;
        let new_absolute = folder_absolute.join(file_name);
        let new_relative = self.resolver.relative_of(&new_absolute);
        if tokio::fs::try_exists(&new_absolute).await? {
            return Err(StoreError::DestinationExists(new_relative));
        }
        tokio::fs::create_dir_all(&folder_absolute).await?;
        tokio::fs::rename(&old_absolute, &new_absolute).await?;
        self.invalidate_page(&old_relative);
        self.invalidate_page(&new_relative);
        self.vcs
            .commit_files(
                vec![old_relative.clone(), new_relative.clone()],
                &format!("Moved page: {old_relative} -> {new_relative}"),
            )
            .await?;
        Ok(new_relative)
    }

    // ---- history ----

    /// Revisions touching a page, newest first; empty when it has none.
    /// Never cached: history must always be authoritative.
    pub async fn get_history(&self, path: &str) -> Result<Vec<CommitInfo>> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        self.vcs.history(&relative).await
    }

    /// Page content as of one revision.
    pub async fn get_page_version(&self, path: &str, revision: &str) -> Result<VersionContent> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        self.vcs
            .content_at(&relative, revision)
            .await?
            .ok_or_else(|| StoreError::VersionNotFound {
                path: relative,
                revision: revision.to_string(),
            })
    }

    /// Overwrite the working copy with the content at `revision` and record
    /// the restoration as a new revision, keeping history append-only.
    pub async fn restore_page_version(&self, path: &str, revision: &str) -> Result<()> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        self.vcs.restore(&relative, revision).await?;
        self.invalidate_page(&relative);
        self.vcs
            .commit_file(&relative, &format!("Restored page: {relative} to {revision}"))
            .await
    }

    // ---- internals ----

    async fn write_page(&self, path: &str, content: &str) -> Result<String> {
        let absolute = self.resolver.resolve(path)?;
        let relative = self.resolver.relative_of(&absolute);
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, content).await?;
        self.invalidate_page(&relative);
        Ok(relative)
    }

    fn invalidate_page(&self, relative: &str) {
        self.caches.invalidate_trees();
        self.caches
            .pages
            .invalidate(&parent_folder(relative).to_string());
        self.caches.content.invalidate(&relative.to_string());
    }
}

fn parent_folder(relative: &str) -> &str {
    relative.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn scan_folder(resolver: PathResolver, dir: PathBuf) -> BoxFuture<'static, Result<FolderNode>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut subdirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                subdirs.push(entry.path());
            }
        }
        let mut children = try_join_all(
            subdirs
                .into_iter()
                .map(|subdir| scan_folder(resolver.clone(), subdir)),
        )
        .await?;
        children.sort_by(|a, b| a.name.cmp(&b.name));
        let path = resolver.relative_of(&dir);
        let name = if path.is_empty() {
            "root".to_string()
        } else {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string())
        };
        Ok(FolderNode {
            name,
            path,
            node_type: NodeType::Folder,
            children,
        })
    })
}
