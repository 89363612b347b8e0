// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lock Key Canonicalization
//!
//! Turns a caller-supplied workspace path into the key used by the lock table,
//! so that `src/a.ts`, `./src/a.ts` and `src//b/../a.ts` contend for the same
//! lock. Canonicalization is purely lexical: the filesystem is never touched
//! and symlinks are not resolved. Traversal safety is enforced upstream.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements internal responsibilities for lock key

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum accepted path length in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Lock key errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockKeyError {
    #[error("Path is empty")]
    Empty,

    #[error("Path contains a null byte: {0:?}")]
    NullByte(String),

    #[error("Path too long ({0} bytes)")]
    TooLong(usize),
}

/// Canonical, comparable form of a workspace path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockKey(String);

impl LockKey {
    /// Canonicalize `path` into a lock key.
    ///
    /// - `\` separators are treated as `/`
    /// - empty and `.` components are dropped
    /// - `..` removes the preceding component when there is one
    /// - a leading `/` is preserved, a trailing `/` is not
    ///
    /// # Examples
    /// ```
    /// use loom_core::domain::lock_key::LockKey;
    ///
    /// let a = LockKey::parse("./src//lib/../a.ts").unwrap();
    /// assert_eq!(a.as_str(), "src/a.ts");
    /// ```
    pub fn parse(path: &str) -> Result<Self, LockKeyError> {
        if path.len() > MAX_PATH_LEN {
            return Err(LockKeyError::TooLong(path.len()));
        }
        if path.contains('\0') {
            return Err(LockKeyError::NullByte(path.to_string()));
        }

        let unified = path.replace('\\', "/");
        let absolute = unified.starts_with('/');

        let mut parts: Vec<&str> = Vec::new();
        for component in unified.split('/') {
            match component {
                "" | "." => {}
                ".." => match parts.last() {
                    Some(&last) if last != ".." => {
                        parts.pop();
                    }
                    _ if absolute => {}
                    _ => parts.push(".."),
                },
                other => parts.push(other),
            }
        }

        let joined = parts.join("/");
        let key = if absolute {
            format!("/{}", joined)
        } else {
            joined
        };

        if key.is_empty() {
            return Err(LockKeyError::Empty);
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_spellings_share_a_key() {
        let expected = LockKey::parse("src/a.ts").unwrap();
        for spelling in ["./src/a.ts", "src//a.ts", "src/./a.ts", "src/lib/../a.ts", "src\\a.ts"] {
            assert_eq!(LockKey::parse(spelling).unwrap(), expected, "{spelling}");
        }
    }

    #[test]
    fn test_absolute_paths_keep_root() {
        let key = LockKey::parse("/workspace/./src/a.ts").unwrap();
        assert_eq!(key.as_str(), "/workspace/src/a.ts");

        let clamped = LockKey::parse("/../a.ts").unwrap();
        assert_eq!(clamped.as_str(), "/a.ts");
    }

    #[test]
    fn test_relative_parent_beyond_start_is_kept() {
        let key = LockKey::parse("../shared/a.ts").unwrap();
        assert_eq!(key.as_str(), "../shared/a.ts");
    }

    #[test]
    fn test_trailing_separator_dropped() {
        assert_eq!(LockKey::parse("src/dir/").unwrap().as_str(), "src/dir");
    }

    #[test]
    fn test_rejects_empty_and_degenerate() {
        assert_eq!(LockKey::parse(""), Err(LockKeyError::Empty));
        assert_eq!(LockKey::parse("./"), Err(LockKeyError::Empty));
        assert_eq!(LockKey::parse("a/.."), Err(LockKeyError::Empty));
    }

    #[test]
    fn test_rejects_null_byte_and_long_paths() {
        assert!(matches!(LockKey::parse("a\0b"), Err(LockKeyError::NullByte(_))));

        let long = "a".repeat(MAX_PATH_LEN + 1);
        assert_eq!(LockKey::parse(&long), Err(LockKeyError::TooLong(MAX_PATH_LEN + 1)));
    }
}
