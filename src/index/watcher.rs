//! File watcher for incremental indexing
//!
//! Debounced filesystem events are forwarded to an async channel. The receiver
//! only needs to know that something changed: `update()` works out what from
//! modification times.

use anyhow::{Context, Result};
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode},
    DebouncedEvent, Debouncer, RecommendedCache,
};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// File change event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A file was created or modified
    Modified(PathBuf),
    /// A file was deleted
    Deleted(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified(p) | Self::Deleted(p) => p,
        }
    }
}

/// File watcher handle
pub struct FileWatcher {
    rx: UnboundedReceiver<FileChange>,
    /// Keep the watcher alive
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Watch `root` recursively, ignoring anything under a directory named in
    /// `excluded_dirs`.
    pub fn new(root: &Path, excluded_dirs: &[String], debounce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<FileChange>();
        let excluded: HashSet<String> = excluded_dirs.iter().cloned().collect();

        let mut debouncer = new_debouncer(
            debounce,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify_debouncer_full::notify::Error>>| {
                match result {
                    Ok(events) => {
                        for event in events {
                            if let Some(change) = process_event(&event, &excluded) {
                                if tx.send(change).is_err() {
                                    debug!("File watcher channel closed");
                                    return;
                                }
                            }
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            error!("File watcher error: {:?}", error);
                        }
                    }
                }
            },
        )
        .context("Failed to create file watcher")?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| {
                format!(
                    "Failed to watch {}. On Linux the inotify limit can be raised with: \
                     sudo sysctl -w fs.inotify.max_user_watches=524288",
                    root.display()
                )
            })?;
        info!(path = %root.display(), "Watching directory for changes");

        Ok(Self {
            rx,
            _debouncer: debouncer,
        })
    }

    /// Wait for the next change. `None` once the watcher has shut down.
    pub async fn recv(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }

    /// Discard events already queued, returning how many there were
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

fn in_excluded_dir(path: &Path, excluded: &HashSet<String>) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => excluded.contains(name.to_string_lossy().as_ref()),
        _ => false,
    })
}

/// Process a notify event and convert to FileChange
fn process_event(event: &DebouncedEvent, excluded: &HashSet<String>) -> Option<FileChange> {
    let path = event
        .paths
        .iter()
        .find(|p| !in_excluded_dir(p, excluded))?;

    match &event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            if path.is_dir() {
                None
            } else if path.exists() {
                Some(FileChange::Modified(path.clone()))
            } else {
                // Renamed away
                Some(FileChange::Deleted(path.clone()))
            }
        }
        EventKind::Remove(_) => Some(FileChange::Deleted(path.clone())),
        _ => None,
    }
}
