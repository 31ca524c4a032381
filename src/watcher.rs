// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Source directory watcher for continuous sorting

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::runner::is_png_name;
use crate::Result;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file appeared, either created in place or renamed into the directory
    FileArrived(PathBuf),
    /// A file left the directory
    FileRemoved(PathBuf),
    /// Watcher error
    Error(String),
}

/// Non-recursive watcher over a single source directory
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let watcher = RecommendedWatcher::new(tx, config)?;

        Ok(Self {
            watcher,
            event_rx: rx,
        })
    }

    /// Start watching `path`. Sorted output lands in subfolders, which a
    /// non-recursive watch does not see.
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", path);
        Ok(())
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(WatchEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }
}

fn convert_event(event: Event) -> Option<WatchEvent> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.first().map(|p| WatchEvent::FileArrived(p.clone()))
        }
        // Both ends of a rename: paths are [from, to]
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1).map(|p| WatchEvent::FileArrived(p.clone()))
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.first().map(|p| WatchEvent::FileRemoved(p.clone()))
        }
        _ => None,
    }
}

/// Check if an arriving file should be sorted
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    is_png_name(path)
}

/// Wait for file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let check_interval = Duration::from_millis(500);
    let start = std::time::Instant::now();

    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(check_interval).await;

        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true;
        }

        let current_size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false,
        };

        if current_size == last_size {
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}
