// 💾 Storage Port
// Named blobs by relative `/`-separated path. Two interchangeable backends:
// a plain directory and a single-file SQLite archive.

pub mod archive;
pub mod directory;

pub use archive::ArchiveStorage;
pub use directory::DirectoryStorage;

use crate::error::{ContainerError, Result};
use std::path::Path;
use tracing::debug;

/// Characters that are invalid in a path segment on at least one platform
const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\'];

/// Suffix of the `.<name>.partial` staging names; reserved on every backend
pub(crate) const STAGING_SUFFIX: &str = ".partial";

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Byte storage the container lifecycle persists into.
///
/// Implementations must behave identically: same path rules, same NotFound
/// semantics, create-or-replace writes. A blob never sits below another blob,
/// and a path that only prefixes other blobs is not a blob (reads give NotFound,
/// writes are contract violations).
pub trait Storage: Send + Sync {
    /// Read a blob. Fails with `NotFound` if absent.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a blob.
    fn write(&mut self, path: &str, content: &[u8]) -> Result<()>;

    /// Create or replace a blob from a local file.
    fn write_file(&mut self, path: &str, local: &Path) -> Result<()> {
        let content = std::fs::read(local).map_err(|e| {
            ContainerError::failed(format!("reading local file {}", local.display()), e)
        })?;
        self.write(path, &content)
    }

    /// Remove a blob. Fails with `NotFound` if absent.
    fn remove(&mut self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Every stored path, sorted.
    fn list_paths(&self) -> Result<Vec<String>>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path)
    }

    fn write(&mut self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content)
    }

    fn write_file(&mut self, path: &str, local: &Path) -> Result<()> {
        (**self).write_file(path, local)
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        (**self).remove(path)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path)
    }

    fn list_paths(&self) -> Result<Vec<String>> {
        (**self).list_paths()
    }
}

// ============================================================================
// PATH RULES
// ============================================================================

/// Check a relative storage path. Violations are contract errors, never storage errors.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ContainerError::contract("storage path is empty"));
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(ContainerError::contract(format!(
            "storage path '{}' must be relative and name a blob",
            path
        )));
    }

    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(ContainerError::contract(format!(
                "storage path '{}' contains an invalid segment",
                path
            )));
        }
        if let Some(c) = segment
            .chars()
            .find(|c| INVALID_PATH_CHARS.contains(c) || c.is_control())
        {
            return Err(ContainerError::contract(format!(
                "storage path '{}' contains invalid character {:?}",
                path, c
            )));
        }
        if is_staging_name(segment) {
            return Err(ContainerError::contract(format!(
                "storage path '{}' uses a reserved staging name",
                path
            )));
        }
    }

    Ok(())
}

pub(crate) fn is_staging_name(segment: &str) -> bool {
    segment.len() > STAGING_SUFFIX.len() + 1 && segment.starts_with('.') && segment.ends_with(STAGING_SUFFIX)
}

/// Every proper prefix of a path: `a`, `a/b` for `a/b/c`.
pub(crate) fn parent_paths(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

/// Reject a write that would nest a blob under a blob or replace a directory of blobs.
pub(crate) fn nesting_conflict(
    path: &str,
    blob_at: impl Fn(&str) -> Result<bool>,
    has_children: bool,
) -> Result<()> {
    for parent in parent_paths(path) {
        if blob_at(parent)? {
            return Err(ContainerError::contract(format!(
                "storage path '{}' lies below blob '{}'",
                path, parent
            )));
        }
    }
    if has_children {
        return Err(ContainerError::contract(format!(
            "storage path '{}' already holds other blobs",
            path
        )));
    }
    Ok(())
}

/// Pick a backend for a location on disk.
///
/// An existing directory, or a path without extension, is a directory container;
/// anything else is an archive file.
pub fn open_storage(location: &Path) -> Result<Box<dyn Storage>> {
    let is_directory = location.is_dir() || (!location.exists() && location.extension().is_none());

    if is_directory {
        debug!(location = %location.display(), "using directory storage");
        Ok(Box::new(DirectoryStorage::open(location)?))
    } else {
        debug!(location = %location.display(), "using archive storage");
        Ok(Box::new(ArchiveStorage::open(location)?))
    }
}
