//! Drop folder monitoring
//!
//! One `notify` subscription feeds a single event loop, so directory diffs
//! are processed strictly one after another. New entries settle once their
//! size has stopped changing across one stability interval, and settled
//! entries go out together when nothing else dropped is still growing.
//! Archives are extracted in place while the loop is paused.

use crate::naming;
use crate::services::archive_extractor::{ArchiveExtractor, ExtractionProgress};
use notify::{RecursiveMode, Watcher};
use romdock_common::events::{EventBus, RomdockEvent};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Filesystem notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lifecycle of the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    /// Monitoring paused while an archive is extracted
    ExtractingArchive,
}

#[derive(Debug)]
enum WatchMessage {
    DirectoryChanged,
    StabilityCheck { path: PathBuf, previous_size: u64 },
}

/// An arrival still waiting to settle
#[derive(Debug, Default)]
struct PendingEntry {
    /// Read as zero bytes on two consecutive checks
    empty: bool,
}

/// Monitors one import directory and reports settled files
pub struct DirectoryWatcher {
    dir: PathBuf,
    stability_interval: Duration,
    extractor: ArchiveExtractor,
    event_bus: EventBus,
    state: watch::Sender<WatcherState>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, stability_interval: Duration, event_bus: EventBus) -> Self {
        let (state, _) = watch::channel(WatcherState::Idle);
        Self {
            dir: dir.into(),
            stability_interval,
            extractor: ArchiveExtractor::new(),
            event_bus,
            state,
        }
    }

    /// Observe state changes
    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// Start monitoring
    ///
    /// Archives already present are extracted before monitoring begins. Their
    /// members and every other file already present go out as the first
    /// batch on `completed`. The returned task runs until `shutdown` fires.
    pub async fn start(
        self,
        completed: mpsc::Sender<Vec<PathBuf>>,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, WatcherError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Subscribe first so nothing dropped during the initial pass is missed
        let (tx, rx) = mpsc::unbounded_channel();
        let notify_tx = tx.clone();
        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(_) => {
                    let _ = notify_tx.send(WatchMessage::DirectoryChanged);
                }
                Err(e) => tracing::warn!("Filesystem notification error: {}", e),
            }
        })?;
        fs_watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;

        let mut initial = Vec::new();
        for path in list_entries(&self.dir)? {
            if naming::is_archive(&path) {
                if let Some(members) = self.extract(&path).await {
                    initial.extend(members);
                }
            } else {
                initial.push(path);
            }
        }
        let known = list_entries(&self.dir)?;

        if !initial.is_empty() {
            tracing::info!(files = initial.len(), "Reporting files present at startup");
            let _ = completed.send(initial).await;
        }

        self.state.send_replace(WatcherState::Watching);
        tracing::info!(dir = %self.dir.display(), "Watching import directory");

        let handle = tokio::spawn(async move {
            // The notify watcher lives as long as the loop
            let _fs_watcher = fs_watcher;
            self.run(known, tx, rx, completed, shutdown).await;
        });
        Ok(handle)
    }

    async fn run(
        self,
        mut known: HashSet<PathBuf>,
        tx: mpsc::UnboundedSender<WatchMessage>,
        mut rx: mpsc::UnboundedReceiver<WatchMessage>,
        completed: mpsc::Sender<Vec<PathBuf>>,
        shutdown: CancellationToken,
    ) {
        let mut pending: HashMap<PathBuf, PendingEntry> = HashMap::new();
        let mut settled: Vec<PathBuf> = Vec::new();

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                WatchMessage::DirectoryChanged => {
                    let current = match list_entries(&self.dir) {
                        Ok(current) => current,
                        Err(e) => {
                            tracing::warn!(dir = %self.dir.display(), "Listing import directory failed: {}", e);
                            continue;
                        }
                    };
                    for path in current.difference(&known) {
                        if !pending.contains_key(path) {
                            let size = entry_size(path).unwrap_or(0);
                            tracing::debug!(path = %path.display(), size, "New entry, waiting for it to settle");
                            pending.insert(path.clone(), PendingEntry::default());
                            self.schedule_check(&tx, path.clone(), size);
                        }
                    }
                    known = current;
                }
                WatchMessage::StabilityCheck { path, previous_size } => {
                    let Some(size) = entry_size(&path) else {
                        tracing::debug!(path = %path.display(), "Entry vanished before settling");
                        pending.remove(&path);
                        if !self.flush_when_quiet(&pending, &mut settled, &completed).await {
                            break;
                        }
                        continue;
                    };

                    if !is_settled(previous_size, size) {
                        if let Some(entry) = pending.get_mut(&path) {
                            entry.empty = previous_size == 0 && size == 0;
                        }
                        self.schedule_check(&tx, path, size);
                        // An entry that turned out empty no longer holds the batch back
                        if !self.flush_when_quiet(&pending, &mut settled, &completed).await {
                            break;
                        }
                        continue;
                    }

                    pending.remove(&path);
                    tracing::debug!(path = %path.display(), size, "Entry settled");

                    if naming::is_archive(&path) {
                        if let Some(members) = self.extract(&path).await {
                            // Extracted members are reported here, not as new arrivals
                            known.remove(&path);
                            for member in &members {
                                if let Some(top) = top_level_entry(&self.dir, member) {
                                    known.insert(top);
                                }
                            }
                            settled.extend(members);
                        }
                    } else {
                        settled.push(path);
                    }

                    if !self.flush_when_quiet(&pending, &mut settled, &completed).await {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(WatcherState::Idle);
        tracing::info!(dir = %self.dir.display(), "Directory watcher stopped");
    }

    /// Report everything settled so far once no other arrival is still
    /// being written
    ///
    /// Files dropped together settle at different times; holding them until
    /// the drop is quiet keeps a disc image and its tracks in one batch.
    /// Returns false when the receiver is gone.
    async fn flush_when_quiet(
        &self,
        pending: &HashMap<PathBuf, PendingEntry>,
        settled: &mut Vec<PathBuf>,
        completed: &mpsc::Sender<Vec<PathBuf>>,
    ) -> bool {
        if settled.is_empty() || pending.values().any(|entry| !entry.empty) {
            return true;
        }
        let batch = std::mem::take(settled);
        tracing::debug!(files = batch.len(), "Reporting settled files");
        completed.send(batch).await.is_ok()
    }

    fn schedule_check(&self, tx: &mpsc::UnboundedSender<WatchMessage>, path: PathBuf, previous_size: u64) {
        let tx = tx.clone();
        let interval = self.stability_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(WatchMessage::StabilityCheck {
                path,
                previous_size,
            });
        });
    }

    /// Extract an archive with monitoring paused; None on failure
    async fn extract(&self, archive: &Path) -> Option<Vec<PathBuf>> {
        self.state.send_replace(WatcherState::ExtractingArchive);
        self.event_bus.emit_lossy(RomdockEvent::ArchiveInflationStarted {
            path: archive.to_path_buf(),
            timestamp: chrono::Utc::now(),
        });

        let (progress_tx, mut progress_rx) = mpsc::channel::<ExtractionProgress>(32);
        let bus = self.event_bus.clone();
        let relay = tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                bus.emit_lossy(RomdockEvent::ArchiveInflationProgress {
                    path: update.archive,
                    completed: update.completed,
                    total: update.total,
                    timestamp: chrono::Utc::now(),
                });
            }
        });

        let dest = archive.parent().unwrap_or(&self.dir).to_path_buf();
        let result = self.extractor.extract(archive, &dest, Some(progress_tx)).await;
        let _ = relay.await;

        // Monitoring resumes whatever the outcome
        self.state.send_replace(WatcherState::Watching);

        match result {
            Ok(members) => Some(members),
            Err(e) => {
                tracing::warn!(archive = %archive.display(), "Archive extraction failed: {}", e);
                self.event_bus.emit_lossy(RomdockEvent::ArchiveInflationFailed {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                None
            }
        }
    }
}

/// Settled when two consecutive readings agree and the file is not empty
///
/// Some synced filesystems report 0 bytes before the write starts.
pub fn is_settled(previous_size: u64, current_size: u64) -> bool {
    previous_size == current_size && current_size > 0
}

/// Visible top-level entries of a directory
fn list_entries(dir: &Path) -> std::io::Result<HashSet<PathBuf>> {
    let mut entries = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !naming::is_hidden_or_marker(&path) {
            entries.insert(path);
        }
    }
    Ok(entries)
}

/// File size, or the total size of a dropped folder
fn entry_size(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_dir() {
        return Some(metadata.len());
    }
    Some(
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum(),
    )
}

fn top_level_entry(dir: &Path, member: &Path) -> Option<PathBuf> {
    let relative = member.strip_prefix(dir).ok()?;
    relative.components().next().map(|c| dir.join(c))
}
