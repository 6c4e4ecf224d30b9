//! Directory change watcher for leader diagnostics.
//!
//! Watches a single directory and exposes a non-blocking "read next batch
//! of change events, or none" operation for the leader's idle loop. Raw
//! backend events are decoded into a symbolic action name plus the
//! affected paths; an empty batch is the normal case, not an error.

use crate::error::{Result, SolodError};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::{debug, warn};

/// A decoded change event: what happened, and to which paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Symbolic action name (`CREATE`, `MODIFY`, `REMOVE`, `RENAME`,
    /// `ACCESS`, `OTHER`).
    pub action: &'static str,
    /// Paths the event refers to; renames may carry both ends.
    pub paths: Vec<PathBuf>,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        for path in &self.paths {
            write!(f, " {}", path.display())?;
        }
        Ok(())
    }
}

/// Non-recursive watcher over one directory.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    path: PathBuf,
}

impl fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatcher").field("path", &self.path).finish()
    }
}

impl DirectoryWatcher {
    /// Start watching `path` (a directory, non-recursive).
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(tx).map_err(|e| SolodError::Watch {
            message: format!("Failed to create watcher: {}", e),
            path: path.clone(),
        })?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| SolodError::Watch {
                message: format!("Failed to watch directory: {}", e),
                path: path.clone(),
            })?;

        debug!("Watching {} for changes", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
            path,
        })
    }

    /// Drain whatever events are ready right now, without blocking.
    ///
    /// Backend errors are logged and skipped; a disconnected backend
    /// simply yields empty batches from then on.
    pub fn poll_events(&self) -> Vec<ChangeEvent> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => batch.push(decode(event)),
                Ok(Err(e)) => {
                    warn!("Watcher error on {}: {}", self.path.display(), e);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// The watched directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decode a raw backend event into its symbolic form.
fn decode(event: Event) -> ChangeEvent {
    let action = match event.kind {
        EventKind::Create(_) => "CREATE",
        EventKind::Modify(ModifyKind::Name(_)) => "RENAME",
        EventKind::Modify(_) => "MODIFY",
        EventKind::Remove(_) => "REMOVE",
        EventKind::Access(_) => "ACCESS",
        _ => "OTHER",
    };
    ChangeEvent {
        action,
        paths: event.paths,
    }
}
