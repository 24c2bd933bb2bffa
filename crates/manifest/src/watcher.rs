//! Filesystem watching for the archive root.
//!
//! The notify callback translates raw events into [`WatcherEvent`]s and sends
//! them through an unbounded channel instead of touching the store. A single
//! consumer task applies them, so the store keeps one writer. The channel is
//! created before the initial scan and drained only after it, which buffers
//! anything that changes while the scan runs.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use fnv::FnvHashSet;
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::{ManifestError, Result};
use crate::parser::{parse_file, ArchiveLayout};
use crate::scanner::scan_records;
use crate::store::ManifestStore;

/// A change to apply to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// A file or directory appeared.
    Created(PathBuf),
    /// A file or directory went away.
    Removed(PathBuf),
    /// File contents or metadata changed.
    Modified(PathBuf),
    /// A rename where both ends are known.
    Moved { from: PathBuf, to: PathBuf },
    /// Something happened to the path but the kind is unknown.
    Changed(PathBuf),
    /// The backend dropped events; the whole root must be walked again.
    RescanRequired,
    /// The backend reported an error.
    Error(String),
}

/// Lifecycle of the watcher task.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum WatcherState {
    Idle = 0,
    Running = 1,
    Failed = 2,
}

impl WatcherState {
    pub(crate) fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Acquire) {
            1 => Self::Running,
            2 => Self::Failed,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

/// Maps a notify event onto store changes. Access events produce nothing.
///
/// A queue overflow arrives as an event flagged for rescan, usually with no
/// paths, and becomes a single [`WatcherEvent::RescanRequired`].
pub fn translate(event: Event) -> Vec<WatcherEvent> {
    if event.need_rescan() {
        return vec![WatcherEvent::RescanRequired];
    }
    let paths = event.paths;
    let each = |paths: Vec<PathBuf>, make: fn(PathBuf) -> WatcherEvent| {
        paths.into_iter().map(make).collect::<Vec<_>>()
    };
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => each(paths, WatcherEvent::Created),
        EventKind::Remove(_) => each(paths, WatcherEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(paths, WatcherEvent::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(paths, WatcherEvent::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            match <[PathBuf; 2]>::try_from(paths) {
                Ok([from, to]) => vec![WatcherEvent::Moved { from, to }],
                Err(paths) => each(paths, WatcherEvent::Changed),
            }
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_)) => {
            each(paths, WatcherEvent::Modified)
        }
        _ => each(paths, WatcherEvent::Changed),
    }
}

/// Starts a recursive notify watch on `root`.
///
/// Events are queued on the returned receiver until someone drains it. The
/// watcher stops when the returned handle is dropped.
pub fn create_archive_watcher(
    root: &Path,
) -> Result<(RecommendedWatcher, UnboundedReceiver<WatcherEvent>)> {
    let (event_tx, event_rx) = unbounded_channel();
    let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
        forward(&event_tx, event_result)
    })
    .map_err(|error| {
        ManifestError::Watcher(format!(
            "failed to create archive watcher for {}: {error}",
            root.display()
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|error| {
            ManifestError::Watcher(format!("failed to watch {}: {error}", root.display()))
        })?;

    Ok((watcher, event_rx))
}

fn forward(event_tx: &UnboundedSender<WatcherEvent>, event_result: notify::Result<Event>) {
    let events = match event_result {
        Ok(event) => translate(event),
        Err(error) => vec![WatcherEvent::Error(error.to_string())],
    };
    for event in events {
        // The receiver is gone once the index shuts down.
        let _ = event_tx.send(event);
    }
}

/// Applies one path event to the store.
///
/// Paths that do not parse are skipped with a debug log. `Error` events are
/// not handled here.
pub fn apply_event(store: &ManifestStore, layout: &ArchiveLayout, event: WatcherEvent) {
    match event {
        WatcherEvent::Created(path) => upsert_path(store, layout, &path),
        WatcherEvent::Removed(path) => remove_path(store, layout, &path),
        WatcherEvent::Modified(path) => {
            if path.is_file() {
                upsert_file(store, layout, &path);
            }
        }
        WatcherEvent::Moved { from, to } => {
            upsert_path(store, layout, &to);
            remove_path(store, layout, &from);
        }
        WatcherEvent::Changed(path) => {
            if path.exists() {
                upsert_path(store, layout, &path);
            } else {
                remove_path(store, layout, &path);
            }
        }
        WatcherEvent::RescanRequired => rescan(store, layout),
        WatcherEvent::Error(_) => {}
    }
}

/// Brings the store back in line with the disk after lost events. Records
/// still on disk are refreshed in place and the rest are dropped.
fn rescan(store: &ManifestStore, layout: &ArchiveLayout) {
    let (records, report) = scan_records(layout, &layout.root);
    let found: FnvHashSet<_> = records.iter().map(|record| record.key().clone()).collect();
    for record in records {
        store.replace(record);
    }
    let stale = store.retain(|record| found.contains(record.key()));
    log::warn!(
        "archive watcher lost events; rescanned root={} records={} stale={} failures={}",
        layout.root.display(),
        report.records,
        stale,
        report.failures,
    );
}

fn upsert_path(store: &ManifestStore, layout: &ArchiveLayout, path: &Path) {
    if path.is_dir() {
        let (records, report) = scan_records(layout, path);
        for record in records {
            store.replace(record);
        }
        log::debug!(
            "archive directory added path={} records={} failures={}",
            path.display(),
            report.records,
            report.failures,
        );
    } else {
        upsert_file(store, layout, path);
    }
}

fn upsert_file(store: &ManifestStore, layout: &ArchiveLayout, path: &Path) {
    match parse_file(layout, path) {
        Ok(record) => {
            let key = record.key().clone();
            if store.replace(record) == 0 {
                log::debug!("archive record added key={}", key);
            } else {
                log::debug!("archive record refreshed key={}", key);
            }
        }
        Err(failure) => log::debug!("ignoring archive change: {}", failure),
    }
}

fn remove_path(store: &ManifestStore, layout: &ArchiveLayout, path: &Path) {
    let key = match layout.key_for(path) {
        Ok(key) => key,
        Err(failure) => {
            log::debug!("ignoring archive removal: {}", failure);
            return;
        }
    };
    // The path may have been a directory; its key then prefixes its records.
    let removed = store.remove_under(&key);
    if removed > 0 {
        log::debug!("archive records removed key={} count={}", key, removed);
    }
}

/// Spawns the task that drains `events` into `store`.
///
/// Must be called from within a tokio runtime. The task ends when the watcher
/// is dropped, or on the first backend error, which marks `state` as
/// [`WatcherState::Failed`] and leaves the store as it was.
pub fn spawn_watch_task(
    store: Arc<ManifestStore>,
    layout: ArchiveLayout,
    mut events: UnboundedReceiver<WatcherEvent>,
    state: Arc<AtomicU8>,
) -> JoinHandle<()> {
    state.store(WatcherState::Running as u8, Ordering::Release);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let WatcherEvent::Error(message) = event {
                log::error!(
                    "archive watcher failed root={} error={}; serving last known contents",
                    layout.root.display(),
                    message
                );
                state.store(WatcherState::Failed as u8, Ordering::Release);
                return;
            }

            let store = store.clone();
            let layout = layout.clone();
            let applied =
                tokio::task::spawn_blocking(move || apply_event(&store, &layout, event)).await;
            if let Err(error) = applied {
                log::error!("archive watcher task panicked: {}", error);
                state.store(WatcherState::Failed as u8, Ordering::Release);
                return;
            }
        }
        state.store(WatcherState::Idle as u8, Ordering::Release);
    })
}
