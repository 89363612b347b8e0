// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local Workspace Files
//!
//! [`WorkspaceFiles`] over the local filesystem via `tokio::fs`. Relative
//! paths resolve against the workspace root; absolute paths are used as-is.
//!
//! **Limitations:**
//! - Writes are not atomic: a crash mid-write can leave a truncated file.
//! - No traversal checks. Callers hand in paths that are already sanitized.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::storage::{FileStoreError, WorkspaceFiles};

/// Workspace file access rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalWorkspaceFiles {
    root: PathBuf,
}

impl LocalWorkspaceFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl WorkspaceFiles for LocalWorkspaceFiles {
    async fn read_to_string(&self, path: &str) -> Result<String, FileStoreError> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| FileStoreError::from_io(path, e))
    }

    async fn write(&self, path: &str, contents: &str) -> Result<(), FileStoreError> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FileStoreError::from_io(path, e))?;
        }

        tokio::fs::write(&full_path, contents)
            .await
            .map_err(|e| FileStoreError::from_io(path, e))?;

        debug!(path = %full_path.display(), bytes = contents.len(), "Wrote workspace file");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileStoreError::from_io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let files = LocalWorkspaceFiles::new(dir.path());

        files.write("src/nested/a.ts", "Hello").await.unwrap();

        assert_eq!(files.read_to_string("src/nested/a.ts").await.unwrap(), "Hello");
        assert!(dir.path().join("src/nested/a.ts").exists());
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let dir = TempDir::new().unwrap();
        let files = LocalWorkspaceFiles::new(dir.path());

        let err = files.read_to_string("nope.txt").await.unwrap_err();
        assert!(matches!(err, FileStoreError::NotFound(path) if path == "nope.txt"));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = LocalWorkspaceFiles::new(dir.path());

        files.write("a.txt.conflict", "x").await.unwrap();
        files.remove("a.txt.conflict").await.unwrap();
        files.remove("a.txt.conflict").await.unwrap();
        assert!(!dir.path().join("a.txt.conflict").exists());
    }

    #[tokio::test]
    async fn test_absolute_paths_bypass_root() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let files = LocalWorkspaceFiles::new(root.path());
        let target = other.path().join("b.txt");

        files.write(target.to_str().unwrap(), "outside").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "outside");
    }
}
