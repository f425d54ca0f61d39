use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::daemon::DaemonEvent;

/// A logical filesystem change, flattened from raw notify events. Renames
/// arrive as a deletion of the old path plus a creation of the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FsChange {
    pub fn path(&self) -> &Path {
        match self {
            FsChange::Created(path) | FsChange::Modified(path) | FsChange::Deleted(path) => path,
        }
    }
}

/// Recursive notify watcher feeding the daemon's event channel. Dropping the
/// watcher stops the notification stream.
pub struct TreeWatcher {
    _watcher: RecommendedWatcher,
}

impl TreeWatcher {
    pub fn start(root: &Path, tx: Sender<DaemonEvent>) -> Result<TreeWatcher, notify::Error> {
        let mut watcher = RecommendedWatcher::new(
            move |outcome: Result<Event, notify::Error>| match outcome {
                Ok(event) => {
                    for change in convert_event(event) {
                        // A send failure means the daemon is already draining.
                        if tx.send(DaemonEvent::Fs(change)).is_err() {
                            break;
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(DaemonEvent::WatcherError(err.to_string()));
                }
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(TreeWatcher { _watcher: watcher })
    }
}

fn convert_event(event: Event) -> Vec<FsChange> {
    match event.kind {
        EventKind::Create(_) => event.paths.into_iter().map(FsChange::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            let mut changes = Vec::new();
            if let Some(old) = paths.next() {
                changes.push(FsChange::Deleted(old));
            }
            if let Some(new) = paths.next() {
                changes.push(FsChange::Created(new));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.into_iter().map(FsChange::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.into_iter().map(FsChange::Created).collect()
        }
        EventKind::Modify(_) => event.paths.into_iter().map(FsChange::Modified).collect(),
        EventKind::Remove(_) => event.paths.into_iter().map(FsChange::Deleted).collect(),
        _ => Vec::new(),
    }
}
