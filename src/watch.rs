//! File system watcher feeding the reconciliation service.
//!
//! Raw `notify` events are filtered down to created or modified
//! configuration files and handed to [`ReconcileService::handle_file_event`]
//! strictly one after the other. Debouncing happens in the service.

use crate::error::Result;
use crate::parser::{is_config_file, is_in_state_dir};
use crate::reconcile::ReconcileService;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Recursive watcher over a directory tree.
pub struct FileWatcher {
    // dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    root: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created or `root`
    /// cannot be watched.
    pub fn new(root: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // receiver gone means we are shutting down
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| {
            crate::err!(Watch {
                path: root.to_path_buf(),
                source: e,
            })
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| {
                crate::err!(Watch {
                    path: root.to_path_buf(),
                    source: e,
                })
            })?;

        tracing::info!(root = %root.display(), "Watching for configuration changes");

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
            events: rx,
        })
    }

    /// The watched directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Next batch of relevant paths, `None` once the watcher is gone.
    pub async fn next_paths(&mut self) -> Option<Vec<PathBuf>> {
        loop {
            match self.events.recv().await? {
                Ok(event) => {
                    let paths = relevant_paths(event);
                    if !paths.is_empty() {
                        return Some(paths);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        }
    }

    /// Feed changes into `service` until `shutdown` completes.
    ///
    /// Returns the number of events handed to the service.
    pub async fn run<F>(mut self, service: &ReconcileService, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut handled = 0;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(events = handled, "Stopping file watcher");
                    break;
                }
                paths = self.next_paths() => {
                    let Some(paths) = paths else {
                        tracing::warn!("File watcher closed");
                        break;
                    };
                    for path in paths {
                        tracing::debug!(path = %path.display(), "Configuration file changed");
                        service.handle_file_event(&path).await;
                        handled += 1;
                    }
                }
            }
        }

        handled
    }
}

/// Paths of an event that should trigger classification.
fn relevant_paths(event: Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }

    event
        .paths
        .into_iter()
        .filter(|p| is_config_file(p) && !is_in_state_dir(p))
        .collect()
}
