//! Containment of caller-supplied paths inside the storage root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StoreError};

/// Resolves root-relative paths to absolute ones, rejecting anything that
/// would land outside the storage root.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// The root must already exist; it is canonicalized once so every later
    /// containment check compares against a stable absolute path.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a root-relative path. Empty input, `.` and `/` all denote the
    /// root itself; leading separators are stripped.
    ///
    /// Resolution is lexical so targets that do not exist yet still resolve.
    /// Containment is tracked per component rather than by string-prefix
    /// comparison, which sibling directories sharing a prefix would defeat
    /// (`/data` vs `/data-secret`).
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let normalized = relative.trim().replace('\\', "/");
        let trimmed = normalized.trim_start_matches('/');
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(trimmed).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(StoreError::PathTraversal(relative.to_string()));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::PathTraversal(relative.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    /// Forward-slash root-relative form of an absolute path inside the root.
    /// The root itself maps to the empty string.
    pub fn relative_of(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default()
    }

    pub fn is_root(&self, absolute: &Path) -> bool {
        absolute == self.root
    }
}
