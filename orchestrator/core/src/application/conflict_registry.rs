// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conflict Registry & Resolver
//!
//! Owns every [`Conflict`] for the life of the process. Conflicts are created
//! by [`ConflictRegistry::detect`] and closed either by the append merge
//! ([`ConflictRegistry::auto_resolve`]) or by a human working the `.conflict`
//! artifact ([`ConflictRegistry::resolve_manually`]). They are never deleted.
//!
//! Every resolution suspends on a disk write. The table lock is never held
//! across that write; once it completes the conflict is looked up again and
//! its status re-checked before the transition is applied. A failed write
//! puts the status back to what it was before the attempt, so callers can
//! simply retry.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Conflict lifecycle orchestration over [`WorkspaceFiles`]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::conflict::{
    append_merge, render_conflict_artifact, Conflict, ConflictError, ConflictId, ConflictStatus,
    EditorSnapshot, ResolutionMethod,
};
use crate::domain::events::ConflictEvent;
use crate::domain::storage::{FileStoreError, WorkspaceFiles};
use crate::infrastructure::event_bus::EventBus;

#[derive(Default)]
struct ConflictTable {
    by_id: HashMap<ConflictId, Conflict>,
    order: Vec<ConflictId>,
}

pub struct ConflictRegistry {
    files: Arc<dyn WorkspaceFiles>,
    event_bus: EventBus,
    conflicts: Mutex<ConflictTable>,
}

impl ConflictRegistry {
    pub fn new(files: Arc<dyn WorkspaceFiles>, event_bus: EventBus) -> Self {
        Self {
            files,
            event_bus,
            conflicts: Mutex::new(ConflictTable::default()),
        }
    }

    /// Record two divergent edits to `file_path`.
    ///
    /// The current on-disk content becomes the baseline. A file that cannot
    /// be read yields an empty baseline rather than failing the call.
    pub async fn detect(
        &self,
        file_path: &str,
        editor_a: EditorSnapshot,
        editor_b: EditorSnapshot,
    ) -> Result<Conflict, ConflictError> {
        validate_detect(file_path, &editor_a, &editor_b)?;

        let baseline = match self.files.read_to_string(file_path).await {
            Ok(content) => content,
            Err(FileStoreError::NotFound(_)) => {
                debug!(path = %file_path, "No baseline on disk, using empty content");
                String::new()
            }
            Err(e) => {
                warn!(path = %file_path, error = %e, "Baseline read failed, using empty content");
                String::new()
            }
        };

        let conflict = Conflict::detect(file_path, baseline, editor_a, editor_b);
        {
            let mut table = self.conflicts.lock();
            table.order.push(conflict.id);
            table.by_id.insert(conflict.id, conflict.clone());
        }

        metrics::counter!("loom_conflicts_detected_total").increment(1);
        info!(
            conflict_id = %conflict.id,
            path = %conflict.file_path,
            editor_a = %conflict.editor_a.id,
            editor_b = %conflict.editor_b.id,
            "Conflict detected"
        );
        self.event_bus
            .publish_conflict_event(ConflictEvent::ConflictDetected {
                conflict: conflict.clone(),
            });
        Ok(conflict)
    }

    /// Conflicts in detection order, optionally restricted to one status.
    pub fn list(&self, status: Option<ConflictStatus>) -> Vec<Conflict> {
        let table = self.conflicts.lock();
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id))
            .filter(|conflict| status.map_or(true, |wanted| conflict.status() == wanted))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: ConflictId) -> Result<Conflict, ConflictError> {
        self.conflicts
            .lock()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(ConflictError::NotFound(id))
    }

    /// Try the append merge; escalate to manual resolution when the edits
    /// are not pure appends to the baseline.
    ///
    /// Legal from `pending` and `manual-required`. Returns the conflict as it
    /// stands afterwards: `resolved` when merged, `manual-required` once the
    /// side-by-side artifact is on disk.
    pub async fn auto_resolve(&self, id: ConflictId) -> Result<Conflict, ConflictError> {
        let (previous, snapshot) = self.update(id, |conflict| {
            let previous = conflict.begin_auto_resolve()?;
            Ok((previous, conflict.clone()))
        })?;

        match append_merge(
            &snapshot.baseline_content,
            &snapshot.editor_a.content,
            &snapshot.editor_b.content,
        ) {
            Some(merged) => {
                self.write_or_restore(id, previous, &snapshot.file_path, &merged)
                    .await?;

                let resolved = self.update(id, |conflict| {
                    conflict.resolve_merged(merged)?;
                    Ok(conflict.clone())
                })?;
                self.announce_resolved(&resolved, ResolutionMethod::Append);
                Ok(resolved)
            }
            None => {
                let artifact_path = snapshot.artifact_path();
                let artifact = render_conflict_artifact(&snapshot.editor_a, &snapshot.editor_b);
                self.write_or_restore(id, previous, &artifact_path, &artifact)
                    .await?;

                let escalated = self.update(id, |conflict| {
                    conflict.require_manual()?;
                    Ok(conflict.clone())
                })?;
                info!(
                    conflict_id = %id,
                    path = %escalated.file_path,
                    artifact = %artifact_path,
                    "Conflict requires manual resolution"
                );
                self.event_bus
                    .publish_conflict_event(ConflictEvent::ManualResolutionRequired {
                        conflict: escalated.clone(),
                        artifact_path,
                    });
                Ok(escalated)
            }
        }
    }

    /// Close a `manual-required` conflict with human-supplied content.
    ///
    /// The conflict is claimed before the write, so a concurrent manual or
    /// automatic attempt is rejected without touching the file. The content is
    /// written first; the `.conflict` artifact is removed afterwards on a
    /// best-effort basis.
    pub async fn resolve_manually(
        &self,
        id: ConflictId,
        merged_content: String,
        resolved_by: &str,
    ) -> Result<Conflict, ConflictError> {
        if resolved_by.trim().is_empty() {
            return Err(ConflictError::InvalidInput(
                "resolved_by must not be empty".to_string(),
            ));
        }

        let file_path = self.update(id, |conflict| {
            conflict.claim_manual(resolved_by)?;
            Ok(conflict.file_path.clone())
        })?;

        if let Err(source) = self.files.write(&file_path, &merged_content).await {
            let reason = format!("writing {} failed: {}", file_path, source);
            if let Some(conflict) = self.conflicts.lock().by_id.get_mut(&id) {
                conflict.release_manual_claim(&reason);
            }
            warn!(
                conflict_id = %id,
                path = %file_path,
                error = %source,
                "Manual resolution write failed"
            );
            return Err(ConflictError::WriteFailed {
                path: file_path,
                source,
            });
        }

        let resolved = self.update(id, |conflict| {
            conflict.resolve_manually(merged_content, resolved_by)?;
            Ok(conflict.clone())
        })?;

        let artifact_path = resolved.artifact_path();
        if let Err(e) = self.files.remove(&artifact_path).await {
            warn!(
                conflict_id = %id,
                artifact = %artifact_path,
                error = %e,
                "Failed to remove conflict artifact"
            );
        }

        self.announce_resolved(&resolved, ResolutionMethod::Manual);
        Ok(resolved)
    }

    /// Apply `f` to the conflict under the table lock.
    fn update<T>(
        &self,
        id: ConflictId,
        f: impl FnOnce(&mut Conflict) -> Result<T, ConflictError>,
    ) -> Result<T, ConflictError> {
        let mut table = self.conflicts.lock();
        let conflict = table.by_id.get_mut(&id).ok_or(ConflictError::NotFound(id))?;
        f(conflict)
    }

    async fn write_or_restore(
        &self,
        id: ConflictId,
        previous: ConflictStatus,
        path: &str,
        contents: &str,
    ) -> Result<(), ConflictError> {
        match self.files.write(path, contents).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let reason = format!("writing {} failed: {}", path, source);
                if let Some(conflict) = self.conflicts.lock().by_id.get_mut(&id) {
                    conflict.abort_attempt(previous, &reason);
                }
                warn!(
                    conflict_id = %id,
                    path = %path,
                    error = %source,
                    "Conflict resolution write failed"
                );
                Err(ConflictError::WriteFailed {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }

    fn announce_resolved(&self, conflict: &Conflict, method: ResolutionMethod) {
        metrics::counter!("loom_conflicts_resolved_total", "method" => method.as_str())
            .increment(1);
        info!(
            conflict_id = %conflict.id,
            path = %conflict.file_path,
            method = method.as_str(),
            "Conflict resolved"
        );
        self.event_bus
            .publish_conflict_event(ConflictEvent::ConflictResolved {
                conflict: conflict.clone(),
            });
    }
}

fn validate_detect(
    file_path: &str,
    editor_a: &EditorSnapshot,
    editor_b: &EditorSnapshot,
) -> Result<(), ConflictError> {
    if file_path.trim().is_empty() {
        return Err(ConflictError::InvalidInput("file path must not be empty".to_string()));
    }
    if editor_a.id.trim().is_empty() || editor_b.id.trim().is_empty() {
        return Err(ConflictError::InvalidInput("editor ids must not be empty".to_string()));
    }
    if editor_a.id == editor_b.id {
        return Err(ConflictError::InvalidInput(format!(
            "both edits come from {}",
            editor_a.id
        )));
    }
    Ok(())
}
