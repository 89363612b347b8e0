// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workspace Watcher - notify adapter feeding the change fan-out bus
//!
//! Wraps one recursive `notify` watcher rooted at the workspace. Each raw
//! notification is classified into created / updated / deleted and published
//! on the [`ChangeBus`] directly from the notify callback thread, so events
//! reach subscribers in notification order with no intermediate queue.
//!
//! A newly created directory is only watched once the backend has registered
//! it, and entries written into it before that produce no notification. The
//! watcher therefore walks every new directory and reports what is already
//! inside as created. A subscriber may see such an entry twice when the
//! backend also caught it.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Anti-corruption layer over the native change-notification API

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::change::{ChangeEvent, ChangeKind};
use crate::infrastructure::change_bus::ChangeBus;

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Workspace root {path} is not accessible: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start watcher on {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Decide what a raw notification means for one path.
///
/// Returns `None` for notifications that do not change content (access).
/// A rename is ambiguous on its own, so the path's current existence decides:
/// present means it was created, absent means it was deleted.
pub fn classify(kind: &EventKind, exists: bool) -> Option<ChangeKind> {
    match kind {
        EventKind::Access(_) => None,
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if exists {
            ChangeKind::Created
        } else {
            ChangeKind::Deleted
        }),
        _ => Some(ChangeKind::Updated),
    }
}

/// Filters paths against the workspace root and excluded directory names.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    excluded_dirs: Vec<String>,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>, excluded_dirs: Vec<String>) -> Self {
        Self {
            root: root.into(),
            excluded_dirs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace-relative, `/`-separated form of `path`, or `None` when the
    /// path is outside the root, is the root itself, or sits under an
    /// excluded directory.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_string_lossy();
                    if self.excluded_dirs.iter().any(|dir| *dir == part) {
                        return None;
                    }
                    parts.push(part.into_owned());
                }
                Component::CurDir => {}
                _ => return None,
            }
        }

        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}

/// Running watcher. Dropping it (or calling [`WorkspaceWatcher::stop`])
/// stops notification delivery.
pub struct WorkspaceWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl WorkspaceWatcher {
    /// Start watching `root` recursively, publishing classified events on `bus`.
    pub fn start(
        root: impl AsRef<Path>,
        excluded_dirs: Vec<String>,
        bus: ChangeBus,
    ) -> Result<Self, WatcherError> {
        let requested = root.as_ref();
        // notify reports canonical paths on some platforms (/private/var on macOS)
        let root = std::fs::canonicalize(requested).map_err(|source| WatcherError::RootUnavailable {
            path: requested.to_path_buf(),
            source,
        })?;

        let filter = PathFilter::new(root.clone(), excluded_dirs);
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => dispatch(&filter, &bus, event),
            Err(error) => warn!(error = %error, "Workspace watcher error"),
        })
        .map_err(|source| WatcherError::Notify {
            path: root.clone(),
            source,
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| WatcherError::Notify {
                path: root.clone(),
                source,
            })?;

        info!(root = %root.display(), "Workspace watcher started");
        Ok(Self {
            root,
            _watcher: watcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(self) {
        info!(root = %self.root.display(), "Workspace watcher stopped");
    }
}

/// `created` events for everything already inside a newly created
/// directory, parents before children, skipping excluded directories.
pub fn scan_new_directory(filter: &PathFilter, dir: &Path) -> Vec<ChangeEvent> {
    WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| filter.relative(entry.path()).is_some())
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(error = %error, "Skipping unreadable entry in new directory");
                None
            }
        })
        .filter_map(|entry| {
            let relative = filter.relative(entry.path())?;
            Some(ChangeEvent::new(
                entry.into_path(),
                relative,
                ChangeKind::Created,
            ))
        })
        .collect()
}

fn dispatch(filter: &PathFilter, bus: &ChangeBus, event: Event) {
    for path in event.paths {
        let Some(relative) = filter.relative(&path) else {
            continue;
        };
        let Some(kind) = classify(&event.kind, path.exists()) else {
            continue;
        };

        debug!(path = %relative, kind = %kind, "Workspace change observed");
        let new_directory = kind == ChangeKind::Created && path.is_dir();
        bus.publish(&ChangeEvent::new(path.clone(), relative, kind));

        if new_directory {
            for change in scan_new_directory(filter, &path) {
                debug!(path = %change.relative_path, "Backfilled entry of new directory");
                bus.publish(&change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn test_classification() {
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File), true),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File), false),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content)), true),
            Some(ChangeKind::Updated)
        );
        assert_eq!(classify(&EventKind::Any, true), Some(ChangeKind::Updated));
        assert_eq!(classify(&EventKind::Access(AccessKind::Any), true), None);
    }

    #[test]
    fn test_rename_checks_existence() {
        let rename = EventKind::Modify(ModifyKind::Name(RenameMode::Any));
        assert_eq!(classify(&rename, true), Some(ChangeKind::Created));
        assert_eq!(classify(&rename, false), Some(ChangeKind::Deleted));
    }

    #[test]
    fn test_filter_excludes_directories_at_any_depth() {
        let filter = PathFilter::new("/ws", vec![".git".to_string(), "node_modules".to_string()]);

        assert_eq!(filter.relative(Path::new("/ws/src/a.ts")).as_deref(), Some("src/a.ts"));
        assert_eq!(filter.relative(Path::new("/ws/.git/HEAD")), None);
        assert_eq!(filter.relative(Path::new("/ws/web/node_modules/x/index.js")), None);
        assert_eq!(
            filter.relative(Path::new("/ws/src/.gitignore")).as_deref(),
            Some("src/.gitignore")
        );
    }

    #[test]
    fn test_filter_drops_root_and_outside_paths() {
        let filter = PathFilter::new("/ws", vec![]);
        assert_eq!(filter.relative(Path::new("/ws")), None);
        assert_eq!(filter.relative(Path::new("/elsewhere/a.ts")), None);
    }

    #[test]
    fn test_new_directory_scan_reports_existing_entries() {
        let root = tempfile::TempDir::new().unwrap();
        let root_path = std::fs::canonicalize(root.path()).unwrap();
        std::fs::create_dir_all(root_path.join("src/lib/.git")).unwrap();
        std::fs::write(root_path.join("src/a.ts"), "Hello").unwrap();
        std::fs::write(root_path.join("src/lib/b.ts"), "x").unwrap();
        std::fs::write(root_path.join("src/lib/.git/HEAD"), "ref").unwrap();

        let filter = PathFilter::new(root_path.clone(), vec![".git".to_string()]);
        let found = scan_new_directory(&filter, &root_path.join("src"));

        let paths: Vec<&str> = found.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/lib", "src/lib/b.ts"]);
        assert!(found.iter().all(|e| e.kind == ChangeKind::Created));
    }

    #[test]
    fn test_missing_root_is_reported() {
        let result = WorkspaceWatcher::start("/definitely/not/here", vec![], ChangeBus::new());
        assert!(matches!(result, Err(WatcherError::RootUnavailable { .. })));
    }
}
