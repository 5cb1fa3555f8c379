//! Block-list file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::BlockList;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the block-list file and delivers a fresh snapshot on every change
pub struct BlockListWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<BlockList>,
}

impl BlockListWatcher {
    /// Start watching `path`.
    ///
    /// The parent directory is watched so that a block-list created or
    /// replaced after startup is picked up too.
    pub fn new(path: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = path.file_name().map(|n| n.to_os_string());

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();
        let watched = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let touches_list = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_list {
                        return;
                    }

                    debug!("Blocked device list changed: {:?}", event.paths);

                    let path = watched.clone();
                    let tx = tx.clone();
                    runtime_handle.spawn(async move {
                        // Let the editor finish writing
                        tokio::time::sleep(DEBOUNCE).await;

                        let list = BlockList::load(&path);
                        if let Err(e) = tx.send(list).await {
                            error!("Failed to deliver blocked device list update: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        info!("Blocked device list watcher started for: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next reloaded list.
    /// Returns None if the watcher has been closed
    pub async fn next_list(&mut self) -> Option<BlockList> {
        self.rx.recv().await
    }
}
