// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Aggregate
//!
//! A [`Conflict`] records two divergent edits to the same workspace file and
//! tracks their resolution through a small state machine:
//!
//! ```text
//! pending ──► auto-resolving ──► resolved
//!                  │   ▲
//!                  ▼   │
//!            manual-required ──► resolved (manual)
//! ```
//!
//! No transition leaves `resolved`, and a [`Resolution`] is attached exactly
//! when the status is `resolved`. Failed resolution attempts roll the status
//! back to where it was before the attempt.
//!
//! The merge rule ([`append_merge`]) and the manual artifact layout
//! ([`render_conflict_artifact`]) are pure functions so the resolver can run
//! them outside any lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::error::ErrorKind;
use crate::domain::storage::FileStoreError;

/// Identity attached to a merge performed without a human.
pub const SYSTEM_RESOLVER: &str = "system";

/// Suffix appended to a file path to name its manual-resolution artifact.
pub const ARTIFACT_SUFFIX: &str = ".conflict";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One side of a conflict: who edited, what they produced, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorSnapshot {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl EditorSnapshot {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStatus {
    Pending,
    AutoResolving,
    Resolved,
    ManualRequired,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::AutoResolving => "auto-resolving",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::ManualRequired => "manual-required",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    /// Both editors appended to the same baseline.
    Append,
    /// Content supplied by whoever worked the `.conflict` artifact.
    Manual,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::Append => "append",
            ResolutionMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub merged_content: String,
    pub method: ResolutionMethod,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
}

/// Conflict errors
#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Invalid conflict input: {0}")]
    InvalidInput(String),

    #[error("Conflict {0} not found")]
    NotFound(ConflictId),

    #[error("Cannot {operation} conflict {id} while it is {status}")]
    InvalidState {
        id: ConflictId,
        status: ConflictStatus,
        operation: &'static str,
    },

    #[error("Conflict {0} already has a manual resolution in progress")]
    ResolutionInProgress(ConflictId),

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: FileStoreError,
    },
}

impl ConflictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConflictError::InvalidInput(_) => ErrorKind::Validation,
            ConflictError::NotFound(_) => ErrorKind::NotFound,
            ConflictError::InvalidState { .. } | ConflictError::ResolutionInProgress(_) => {
                ErrorKind::ConflictState
            }
            ConflictError::WriteFailed { .. } => ErrorKind::Io,
        }
    }
}

/// Two divergent edits to one file and the record of their resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub file_path: String,
    /// On-disk content when the conflict was detected (empty if unreadable).
    pub baseline_content: String,
    pub editor_a: EditorSnapshot,
    pub editor_b: EditorSnapshot,
    pub detected_at: DateTime<Utc>,
    status: ConflictStatus,
    resolution: Option<Resolution>,
    audit_log: Vec<String>,
    /// Set while a manual resolution's write is in flight.
    #[serde(skip)]
    manual_claimed: bool,
}

impl Conflict {
    pub fn detect(
        file_path: impl Into<String>,
        baseline_content: impl Into<String>,
        editor_a: EditorSnapshot,
        editor_b: EditorSnapshot,
    ) -> Self {
        let mut conflict = Self {
            id: ConflictId::new(),
            file_path: file_path.into(),
            baseline_content: baseline_content.into(),
            editor_a,
            editor_b,
            detected_at: Utc::now(),
            status: ConflictStatus::Pending,
            resolution: None,
            audit_log: Vec::new(),
            manual_claimed: false,
        };
        let entry = format!(
            "Conflict detected on {} between {} and {}",
            conflict.file_path, conflict.editor_a.id, conflict.editor_b.id
        );
        conflict.record(entry);
        conflict
    }

    pub fn status(&self) -> ConflictStatus {
        self.status
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn audit_log(&self) -> &[String] {
        &self.audit_log
    }

    pub fn artifact_path(&self) -> String {
        format!("{}{}", self.file_path, ARTIFACT_SUFFIX)
    }

    /// Append a timestamped line to the audit log.
    pub fn record(&mut self, entry: impl AsRef<str>) {
        self.audit_log
            .push(format!("[{}] {}", Utc::now().to_rfc3339(), entry.as_ref()));
    }

    /// Enter `auto-resolving`. Returns the status held before, so that a
    /// failed attempt can be rolled back with [`Conflict::abort_attempt`].
    pub fn begin_auto_resolve(&mut self) -> Result<ConflictStatus, ConflictError> {
        let previous = self.status;
        match previous {
            ConflictStatus::ManualRequired if self.manual_claimed => {
                Err(ConflictError::ResolutionInProgress(self.id))
            }
            ConflictStatus::Pending | ConflictStatus::ManualRequired => {
                self.status = ConflictStatus::AutoResolving;
                self.record(format!("Auto-resolution started (was {})", previous));
                Ok(previous)
            }
            _ => Err(self.invalid_state("auto-resolve")),
        }
    }

    /// Finish an automatic merge. Only legal while `auto-resolving`.
    pub fn resolve_merged(&mut self, merged_content: String) -> Result<(), ConflictError> {
        if self.status != ConflictStatus::AutoResolving {
            return Err(self.invalid_state("complete merge for"));
        }
        self.apply_resolution(Resolution {
            merged_content,
            method: ResolutionMethod::Append,
            resolved_at: Utc::now(),
            resolved_by: SYSTEM_RESOLVER.to_string(),
        });
        Ok(())
    }

    /// Reserve a `manual-required` conflict for one manual resolution. Other
    /// resolution attempts are rejected until the claim is completed by
    /// [`Conflict::resolve_manually`] or dropped by [`Conflict::release_manual_claim`].
    pub fn claim_manual(&mut self, resolved_by: &str) -> Result<(), ConflictError> {
        if self.status != ConflictStatus::ManualRequired {
            return Err(self.invalid_state("manually resolve"));
        }
        if self.manual_claimed {
            return Err(ConflictError::ResolutionInProgress(self.id));
        }
        self.manual_claimed = true;
        self.record(format!("Manual resolution started by {}", resolved_by));
        Ok(())
    }

    /// Drop a manual claim after a failed write. The status stays
    /// `manual-required`.
    pub fn release_manual_claim(&mut self, reason: &str) {
        self.manual_claimed = false;
        self.record(format!("Manual resolution attempt failed: {}", reason));
    }

    /// Close a claimed `manual-required` conflict with externally supplied
    /// content.
    pub fn resolve_manually(
        &mut self,
        merged_content: String,
        resolved_by: impl Into<String>,
    ) -> Result<(), ConflictError> {
        if self.status != ConflictStatus::ManualRequired {
            return Err(self.invalid_state("manually resolve"));
        }
        if !self.manual_claimed {
            return Err(self.invalid_state("complete unclaimed manual resolution for"));
        }
        self.manual_claimed = false;
        self.apply_resolution(Resolution {
            merged_content,
            method: ResolutionMethod::Manual,
            resolved_at: Utc::now(),
            resolved_by: resolved_by.into(),
        });
        Ok(())
    }

    /// Escalate after the side-by-side artifact has been written.
    pub fn require_manual(&mut self) -> Result<(), ConflictError> {
        if self.status != ConflictStatus::AutoResolving {
            return Err(self.invalid_state("escalate"));
        }
        self.status = ConflictStatus::ManualRequired;
        let entry = format!(
            "Edits are not pure appends; manual resolution required (artifact: {})",
            self.artifact_path()
        );
        self.record(entry);
        Ok(())
    }

    /// Roll an in-flight attempt back to the status it started from.
    pub fn abort_attempt(&mut self, previous: ConflictStatus, reason: &str) {
        if self.status == ConflictStatus::AutoResolving {
            self.status = previous;
        }
        self.record(format!("Resolution attempt failed: {}", reason));
    }

    fn apply_resolution(&mut self, resolution: Resolution) {
        let entry = format!(
            "Resolved by {} using {} merge",
            resolution.resolved_by, resolution.method.as_str()
        );
        self.status = ConflictStatus::Resolved;
        self.resolution = Some(resolution);
        self.record(entry);
    }

    fn invalid_state(&self, operation: &'static str) -> ConflictError {
        ConflictError::InvalidState {
            id: self.id,
            status: self.status,
            operation,
        }
    }
}

/// Merge two edits that both extend `baseline` verbatim.
///
/// Returns `None` for every other edit shape. The result is the baseline,
/// then A's addition, a line break, then B's addition. B's addition loses one
/// leading line break so that two line-appends do not leave a blank line
/// between them.
///
/// ```
/// use loom_core::domain::conflict::append_merge;
///
/// let merged = append_merge("Hello", "Hello\nLine A", "Hello\nLine B");
/// assert_eq!(merged.as_deref(), Some("Hello\nLine A\nLine B"));
/// assert_eq!(append_merge("Hello", "Hi there", "Hello\nLine B"), None);
/// ```
pub fn append_merge(baseline: &str, content_a: &str, content_b: &str) -> Option<String> {
    let suffix_a = content_a.strip_prefix(baseline)?;
    let suffix_b = content_b.strip_prefix(baseline)?;
    let suffix_b = suffix_b
        .strip_prefix("\r\n")
        .or_else(|| suffix_b.strip_prefix('\n'))
        .unwrap_or(suffix_b);

    let mut merged = String::with_capacity(baseline.len() + suffix_a.len() + suffix_b.len() + 1);
    merged.push_str(baseline);
    merged.push_str(suffix_a);
    merged.push('\n');
    merged.push_str(suffix_b);
    Some(merged)
}

/// Render the side-by-side artifact written next to a file that needs manual
/// resolution.
pub fn render_conflict_artifact(editor_a: &EditorSnapshot, editor_b: &EditorSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<<<<<<< Editor A: {} ({})\n",
        editor_a.id,
        editor_a.timestamp.to_rfc3339()
    ));
    push_block(&mut out, &editor_a.content);
    out.push_str("=======\n");
    push_block(&mut out, &editor_b.content);
    out.push_str(&format!(
        ">>>>>>> Editor B: {} ({})\n",
        editor_b.id,
        editor_b.timestamp.to_rfc3339()
    ));
    out
}

fn push_block(out: &mut String, content: &str) {
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
}
