//! `ManifestIndex`: the store, its archive layout and the watcher that keeps
//! it current, behind one handle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use notify::RecommendedWatcher;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::{canonicalize_existing_path, ManifestError, Result};
use crate::filter::{available_facet_values, Criteria, FacetValues};
use crate::parser::ArchiveLayout;
use crate::query::{self, Page, Sort};
use crate::scanner::ScanReport;
use crate::store::{ManifestStore, StoreState};
use crate::types::Record;
use crate::watcher::{create_archive_watcher, spawn_watch_task, WatcherState};

pub struct ManifestIndex {
    layout: ArchiveLayout,
    store: Arc<ManifestStore>,
    start_lock: tokio::sync::Mutex<()>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watcher_state: Arc<AtomicU8>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ManifestIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestIndex")
            .field("layout", &self.layout)
            .field("store", &self.store)
            .field("watcher", &"<watcher>")
            .finish()
    }
}

impl ManifestIndex {
    /// Creates an empty, unstarted index. The root is canonicalized so that
    /// watcher paths and scanned paths share one prefix.
    pub fn new(mut layout: ArchiveLayout) -> Self {
        layout.root = canonicalize_existing_path(layout.root);
        Self {
            layout,
            store: Arc::new(ManifestStore::new()),
            start_lock: tokio::sync::Mutex::new(()),
            watcher: Mutex::new(None),
            watcher_state: Arc::new(AtomicU8::new(WatcherState::Idle as u8)),
            watch_task: Mutex::new(None),
        }
    }

    /// Scans the archive and attaches the watcher.
    ///
    /// The watch is registered before the scan so that changes made while
    /// scanning are queued and applied once the scan is committed. Calling
    /// this again after a successful start returns `Ok(None)`.
    pub async fn start(&self) -> Result<Option<ScanReport>> {
        let _guard = self.start_lock.lock().await;
        if self.store.state() == StoreState::Ready {
            return Ok(None);
        }
        let started = Instant::now();
        let root = self.layout.root.clone();
        if !root.is_dir() {
            return Err(ManifestError::PathNotFound(root));
        }

        let (watcher, events) = create_archive_watcher(&root)?;

        let store = self.store.clone();
        let layout = self.layout.clone();
        let report = tokio::task::spawn_blocking(move || store.scan(&layout))
            .await
            .map_err(|error| ManifestError::Internal(format!("archive scan panicked: {error}")))??;

        *self.watcher.lock() = Some(watcher);
        let task = spawn_watch_task(
            self.store.clone(),
            self.layout.clone(),
            events,
            self.watcher_state.clone(),
        );
        *self.watch_task.lock() = Some(task);

        log::info!(
            "manifest index started root={} records={} watcher={} total_init_ms={}",
            root.display(),
            self.store.len(),
            self.watcher_state().as_str(),
            started.elapsed().as_millis(),
        );
        Ok(report)
    }

    /// True once the scan is committed and the watcher has been attached.
    pub fn is_ready(&self) -> bool {
        self.store.state() == StoreState::Ready && self.watcher.lock().is_some()
    }

    /// Detaches the watcher and stops applying changes. Queries keep
    /// answering from the last known contents.
    pub fn shutdown(&self) {
        self.watcher.lock().take();
        if let Some(task) = self.watch_task.lock().take() {
            task.abort();
        }
        self.watcher_state
            .store(WatcherState::Idle as u8, Ordering::Release);
    }

    pub fn state(&self) -> StoreState {
        self.store.state()
    }

    pub fn watcher_state(&self) -> WatcherState {
        WatcherState::load(&self.watcher_state)
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Facet values still selectable under `criteria`.
    pub fn params(&self, criteria: &Criteria) -> FacetValues {
        let snapshot = self.store.all();
        available_facet_values(snapshot.iter().map(|record| &**record), criteria)
    }

    /// Number of records matching `criteria`.
    pub fn count(&self, criteria: &Criteria) -> usize {
        query::count(&self.store.all(), criteria)
    }

    /// One page of matching records, optionally sorted.
    pub fn list(&self, criteria: &Criteria, sort: Option<Sort>, page: Page) -> Vec<Arc<Record>> {
        query::execute(&self.store.all(), criteria, sort, page)
    }
}
