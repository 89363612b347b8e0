// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workspace File Access - Anti-Corruption Layer for the shared file tree
//!
//! The conflict resolver reads baselines and writes merged content and
//! manual-resolution artifacts through [`WorkspaceFiles`], which keeps the
//! domain free of direct filesystem calls and lets tests inject failures.

use async_trait::async_trait;
use thiserror::Error;

/// Workspace file access errors
#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl FileStoreError {
    pub(crate) fn from_io(path: &str, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => FileStoreError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                FileStoreError::PermissionDenied(path.to_string())
            }
            _ => FileStoreError::IoError(format!("{}: {}", path, error)),
        }
    }
}

/// Text file access rooted at the workspace.
///
/// Paths are interpreted relative to the workspace root unless absolute.
#[async_trait]
pub trait WorkspaceFiles: Send + Sync {
    /// Read a whole file as UTF-8 text.
    async fn read_to_string(&self, path: &str) -> Result<String, FileStoreError>;

    /// Replace a file's contents, creating it (and missing parents) if needed.
    async fn write(&self, path: &str, contents: &str) -> Result<(), FileStoreError>;

    /// Remove a file. Removing a missing file is not an error.
    async fn remove(&self, path: &str) -> Result<(), FileStoreError>;
}
