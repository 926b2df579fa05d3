use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::app::Msg;

/// Watches every file in a [`Config`](crate::Config) watch set and
/// forwards change events into the app's message channel. notify's own
/// thread is the long-lived background context; all communication back
/// to the event loop is a `Msg`, never shared state.
pub struct ConfigWatcher {
    watcher: RecommendedWatcher,
    watched: BTreeSet<PathBuf>,
}

impl ConfigWatcher {
    pub fn new(tx: UnboundedSender<Msg>) -> notify::Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        let _ = tx.send(Msg::FileChanged(event.paths));
                    }
                }
                Err(err) => {
                    let _ = tx.send(Msg::WatchFailed(err.to_string()));
                }
            },
            notify::Config::default(),
        )?;
        Ok(Self {
            watcher,
            watched: BTreeSet::new(),
        })
    }

    /// Brings the watched set in line with `paths`: stale paths are
    /// unwatched, new ones armed.
    pub fn sync(&mut self, paths: &BTreeSet<PathBuf>) -> notify::Result<()> {
        let stale: Vec<PathBuf> = self.watched.difference(paths).cloned().collect();
        for path in stale {
            let _ = self.watcher.unwatch(&path);
            self.watched.remove(&path);
        }
        for path in paths {
            if self.watched.insert(path.clone()) {
                if let Err(err) = self.watcher.watch(path, RecursiveMode::NonRecursive) {
                    self.watched.remove(path);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Editors that save via rename/replace leave the old watch pointing
    /// at a dead inode; re-arm the path so the next save is still seen.
    pub fn rearm(&mut self, path: &Path) {
        if self.watched.contains(path) && path.exists() {
            let _ = self.watcher.unwatch(path);
            let _ = self.watcher.watch(path, RecursiveMode::NonRecursive);
        }
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched.contains(path)
    }
}
