//! In-memory manifest store.
//!
//! Records live in an insertion-ordered `Vec<Arc<Record>>` published through
//! an `Arc`. Readers clone the outer `Arc` under a briefly held read lock and
//! then iterate without any lock; the single writer copies on write with
//! `Arc::make_mut`, so a reader never observes a half-applied mutation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::error::{ManifestError, Result};
use crate::parser::ArchiveLayout;
use crate::scanner::{scan_records, ScanReport};
use crate::types::{Record, RecordKey};

/// Initialization state of the store.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum StoreState {
    Idle = 0,
    Scanning = 1,
    Ready = 2,
}

impl StoreState {
    fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Acquire) {
            1 => Self::Scanning,
            2 => Self::Ready,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Ready => "ready",
        }
    }
}

/// A view of the store contents at the time it was taken.
///
/// Iterating does not hold any lock and can be repeated.
#[derive(Debug, Clone, Default)]
pub struct Snapshot(Arc<Vec<Arc<Record>>>);

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Record>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Arc<Record>;
    type IntoIter = std::slice::Iter<'a, Arc<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Default)]
pub struct ManifestStore {
    records: RwLock<Arc<Vec<Arc<Record>>>>,
    state: AtomicU8,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StoreState {
        StoreState::load(&self.state)
    }

    /// Appends a record. Duplicates are not checked.
    pub fn insert(&self, record: Record) {
        let mut records = self.records.write();
        Arc::make_mut(&mut records).push(Arc::new(record));
    }

    /// Stores `record` in place of the first record with the same identity,
    /// dropping any later duplicates, or appends it if the key is new.
    /// Returns the number of records it replaced.
    ///
    /// Replacing a record with an equal one leaves the store untouched, so a
    /// `touch` never copies the vector under a live snapshot.
    pub fn replace(&self, record: Record) -> usize {
        let mut records = self.records.write();
        let Some(position) = records
            .iter()
            .position(|existing| existing.key() == record.key())
        else {
            Arc::make_mut(&mut records).push(Arc::new(record));
            return 0;
        };
        let duplicates = records[position + 1..]
            .iter()
            .filter(|existing| existing.key() == record.key())
            .count();
        if duplicates == 0 && *records[position] == record {
            return 1;
        }

        let records = Arc::make_mut(&mut records);
        if duplicates > 0 {
            let key = record.key().clone();
            let mut index = 0;
            records.retain(|existing| {
                let keep = index <= position || existing.key() != &key;
                index += 1;
                keep
            });
        }
        records[position] = Arc::new(record);
        duplicates + 1
    }

    /// Removes every record with identity `key`. Unknown keys are a no-op.
    pub fn remove(&self, key: &RecordKey) -> usize {
        self.remove_where(|record| record.key() == key)
    }

    /// Removes every record at or below the archive-relative directory `dir`.
    pub fn remove_under(&self, dir: &RecordKey) -> usize {
        self.remove_where(|record| record.key().is_within(dir))
    }

    /// Keeps only the records for which `keep` returns true.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: Fn(&Record) -> bool,
    {
        self.remove_where(|record| !keep(record))
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Record) -> bool,
    {
        // Read first so removals of unknown paths never copy the vector.
        if !self.records.read().iter().any(|record| predicate(record)) {
            return 0;
        }
        let mut records = self.records.write();
        let records = Arc::make_mut(&mut records);
        let before = records.len();
        records.retain(|record| !predicate(record));
        before - records.len()
    }

    /// Populates the store from the archive. Runs at most once.
    ///
    /// The state flag flips to `Scanning` before the walk starts, so a second
    /// caller racing the first returns `Ok(None)` instead of walking again.
    pub fn scan(&self, layout: &ArchiveLayout) -> Result<Option<ScanReport>> {
        if self
            .state
            .compare_exchange(
                StoreState::Idle as u8,
                StoreState::Scanning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(None);
        }

        if !layout.root.is_dir() {
            self.state.store(StoreState::Idle as u8, Ordering::Release);
            return Err(ManifestError::PathNotFound(layout.root.clone()));
        }

        let started = Instant::now();
        let (scanned, report) = scan_records(layout, &layout.root);
        {
            let mut records = self.records.write();
            Arc::make_mut(&mut records).extend(scanned.into_iter().map(Arc::new));
        }
        self.state.store(StoreState::Ready as u8, Ordering::Release);

        log::info!(
            "archive scan root={} files={} records={} failures={} elapsed_ms={}",
            layout.root.display(),
            report.files,
            report.records,
            report.failures,
            started.elapsed().as_millis(),
        );
        Ok(Some(report))
    }

    /// Returns the current contents.
    pub fn all(&self) -> Snapshot {
        Snapshot(self.records.read().clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
