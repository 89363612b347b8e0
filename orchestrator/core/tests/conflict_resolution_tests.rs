// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for conflict detection and resolution against a real
//! workspace directory.
//!
//! Covers the append merge end to end (detect, resolve, re-read the file),
//! escalation to a `.conflict` artifact, manual resolution, and the
//! retry-safe behaviour when a write fails.

use async_trait::async_trait;
use loom_core::application::ConflictRegistry;
use loom_core::domain::conflict::{ConflictStatus, EditorSnapshot, ResolutionMethod};
use loom_core::domain::error::ErrorKind;
use loom_core::domain::events::ConflictEvent;
use loom_core::domain::storage::{FileStoreError, WorkspaceFiles};
use loom_core::infrastructure::event_bus::{DomainEvent, EventBus, EventReceiver};
use loom_core::infrastructure::LocalWorkspaceFiles;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    dir
}

fn conflict_event_names(receiver: &mut EventReceiver) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let DomainEvent::Conflict(event) = event {
            names.push(event.name());
        }
    }
    names
}

#[tokio::test]
async fn test_pure_appends_merge_on_disk() {
    let dir = workspace(&[("src/a.ts", "Hello")]);
    let bus = EventBus::new(32);
    let mut receiver = bus.subscribe();
    let registry = ConflictRegistry::new(Arc::new(LocalWorkspaceFiles::new(dir.path())), bus);

    let conflict = registry
        .detect(
            "src/a.ts",
            EditorSnapshot::new("agent-1", "Hello\nLine A"),
            EditorSnapshot::new("agent-2", "Hello\nLine B"),
        )
        .await
        .unwrap();
    let resolved = registry.auto_resolve(conflict.id).await.unwrap();

    assert_eq!(resolved.status(), ConflictStatus::Resolved);
    let on_disk = std::fs::read_to_string(dir.path().join("src/a.ts")).unwrap();
    assert_eq!(on_disk, "Hello\nLine A\nLine B");
    assert_eq!(resolved.resolution().unwrap().merged_content, on_disk);
    assert!(!dir.path().join("src/a.ts.conflict").exists());

    assert_eq!(
        conflict_event_names(&mut receiver),
        vec!["conflict:detected", "conflict:resolved"]
    );
}

#[tokio::test]
async fn test_rewrite_escalates_to_artifact() {
    let dir = workspace(&[("notes.md", "Hello")]);
    let bus = EventBus::new(32);
    let mut receiver = bus.subscribe();
    let registry = ConflictRegistry::new(Arc::new(LocalWorkspaceFiles::new(dir.path())), bus);

    let conflict = registry
        .detect(
            "notes.md",
            EditorSnapshot::new("agent-1", "Hi there"),
            EditorSnapshot::new("agent-2", "Hello\nLine B"),
        )
        .await
        .unwrap();
    let escalated = registry.auto_resolve(conflict.id).await.unwrap();

    assert_eq!(escalated.status(), ConflictStatus::ManualRequired);
    assert!(escalated.resolution().is_none());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
        "Hello"
    );

    let artifact = std::fs::read_to_string(dir.path().join("notes.md.conflict")).unwrap();
    let lines: Vec<&str> = artifact.lines().collect();
    assert!(lines[0].starts_with("<<<<<<< Editor A: agent-1"));
    assert_eq!(lines[1], "Hi there");
    assert_eq!(lines[2], "=======");
    assert_eq!(&lines[3..5], &["Hello", "Line B"]);
    assert!(lines[5].starts_with(">>>>>>> Editor B: agent-2"));

    match receiver.recv().await.unwrap() {
        DomainEvent::Conflict(ConflictEvent::ConflictDetected { .. }) => {}
        other => panic!("unexpected event {:?}", other),
    }
    match receiver.recv().await.unwrap() {
        DomainEvent::Conflict(ConflictEvent::ManualResolutionRequired { artifact_path, .. }) => {
            assert_eq!(artifact_path, "notes.md.conflict");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_manual_resolution_after_escalation() {
    let dir = workspace(&[("notes.md", "Hello")]);
    let registry = ConflictRegistry::new(
        Arc::new(LocalWorkspaceFiles::new(dir.path())),
        EventBus::new(32),
    );

    let conflict = registry
        .detect(
            "notes.md",
            EditorSnapshot::new("agent-1", "Hi there"),
            EditorSnapshot::new("agent-2", "Greetings"),
        )
        .await
        .unwrap();
    registry.auto_resolve(conflict.id).await.unwrap();

    let resolved = registry
        .resolve_manually(conflict.id, "Hi there, greetings".to_string(), "reviewer")
        .await
        .unwrap();

    assert_eq!(resolved.status(), ConflictStatus::Resolved);
    assert_eq!(resolved.resolution().unwrap().method, ResolutionMethod::Manual);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("notes.md")).unwrap(),
        "Hi there, greetings"
    );
    assert!(!dir.path().join("notes.md.conflict").exists());
    assert!(resolved.audit_log().len() >= 4);
}

#[tokio::test]
async fn test_identical_edits_still_resolve() {
    let dir = workspace(&[("a.txt", "same")]);
    let registry = ConflictRegistry::new(
        Arc::new(LocalWorkspaceFiles::new(dir.path())),
        EventBus::new(32),
    );

    let conflict = registry
        .detect(
            "a.txt",
            EditorSnapshot::new("agent-1", "same"),
            EditorSnapshot::new("agent-2", "same"),
        )
        .await
        .unwrap();
    let resolved = registry.auto_resolve(conflict.id).await.unwrap();

    assert_eq!(resolved.status(), ConflictStatus::Resolved);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
        "same\n"
    );
}

/// Wraps the local store and fails every write while `broken` is set.
struct FlakyFiles {
    inner: LocalWorkspaceFiles,
    broken: AtomicBool,
}

#[async_trait]
impl WorkspaceFiles for FlakyFiles {
    async fn read_to_string(&self, path: &str) -> Result<String, FileStoreError> {
        self.inner.read_to_string(path).await
    }

    async fn write(&self, path: &str, contents: &str) -> Result<(), FileStoreError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(FileStoreError::PermissionDenied(path.to_string()));
        }
        self.inner.write(path, contents).await
    }

    async fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        self.inner.remove(path).await
    }
}

#[tokio::test]
async fn test_failed_artifact_write_is_retry_safe() {
    let dir = workspace(&[("a.txt", "Hello")]);
    let files = Arc::new(FlakyFiles {
        inner: LocalWorkspaceFiles::new(dir.path()),
        broken: AtomicBool::new(true),
    });
    let registry = ConflictRegistry::new(files.clone(), EventBus::new(32));

    let conflict = registry
        .detect(
            "a.txt",
            EditorSnapshot::new("agent-1", "Rewritten"),
            EditorSnapshot::new("agent-2", "Hello!"),
        )
        .await
        .unwrap();

    let err = registry.auto_resolve(conflict.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(
        registry.get(conflict.id).unwrap().status(),
        ConflictStatus::Pending
    );
    assert!(!dir.path().join("a.txt.conflict").exists());

    files.broken.store(false, Ordering::SeqCst);
    let escalated = registry.auto_resolve(conflict.id).await.unwrap();
    assert_eq!(escalated.status(), ConflictStatus::ManualRequired);
    assert!(dir.path().join("a.txt.conflict").exists());

    // manual-required may be retried; the edits are still not appends
    files.broken.store(true, Ordering::SeqCst);
    let err = registry.auto_resolve(conflict.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(
        registry.get(conflict.id).unwrap().status(),
        ConflictStatus::ManualRequired
    );
}

#[tokio::test]
async fn test_conflict_serializes_with_kebab_case_status() {
    let dir = workspace(&[]);
    let registry = ConflictRegistry::new(
        Arc::new(LocalWorkspaceFiles::new(dir.path())),
        EventBus::new(32),
    );
    let conflict = registry
        .detect(
            "missing.txt",
            EditorSnapshot::new("agent-1", "a"),
            EditorSnapshot::new("agent-2", "b"),
        )
        .await
        .unwrap();

    let value = serde_json::to_value(&conflict).unwrap();
    assert_eq!(value["status"], "pending");
    assert_eq!(value["baseline_content"], "");
    assert!(value["resolution"].is_null());
    assert_eq!(value["editor_a"]["id"], "agent-1");
}
