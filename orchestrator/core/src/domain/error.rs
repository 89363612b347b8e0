// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Error Kinds
//!
//! Transport-agnostic classification shared by every error type in the
//! workspace. A request layer maps an [`ErrorKind`] onto its own status codes
//! without having to know each module's error enum.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Single error taxonomy for locks, conflicts and swarms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a failed core operation.
///
/// Swarm unit failures are not represented here: they are captured per unit
/// and surface as the `partial` / `failed` aggregate status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Missing or malformed input, rejected before any state was touched.
    Validation,
    /// Unknown lock, conflict or execution.
    NotFound,
    /// Right entity, wrong caller (e.g. releasing another agent's lock).
    Mismatch,
    /// The operation is illegal for the entity's current status.
    ConflictState,
    /// Disk read/write failure. State is left at its pre-failure value.
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Mismatch => "mismatch",
            ErrorKind::ConflictState => "conflict-state",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form_matches_display() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Mismatch,
            ErrorKind::ConflictState,
            ErrorKind::Io,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
