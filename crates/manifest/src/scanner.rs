//! Parallel archive walk that turns files into records.
//!
//! Directories are read with rayon, children are sorted by name, and the
//! resulting file list is in lexicographic path order. Records therefore land
//! in the store in a deterministic order regardless of thread scheduling.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::parser::{parse_file, ArchiveLayout};
use crate::types::Record;

/// Counters for one walk.
#[derive(Debug, Default)]
pub struct WalkData {
    /// Number of regular files seen.
    pub num_files: AtomicUsize,
    /// Number of directories read.
    pub num_dirs: AtomicUsize,
}

/// Summary of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Regular files found.
    pub files: usize,
    /// Files that parsed into records.
    pub records: usize,
    /// Files that did not parse.
    pub failures: usize,
}

/// Collects every regular file below `path`, in path order.
pub fn walk_files(path: &Path, walk_data: &WalkData) -> Vec<PathBuf> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Vec::new();
    };
    if !metadata.file_type().is_dir() {
        if is_regular_file(path, &metadata.file_type()) {
            walk_data.num_files.fetch_add(1, Ordering::Relaxed);
            return vec![path.to_path_buf()];
        }
        return Vec::new();
    }

    walk_data.num_dirs.fetch_add(1, Ordering::Relaxed);
    let read_dir = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(error) => {
            log::warn!("unable to read directory {}: {}", path.display(), error);
            return Vec::new();
        }
    };

    let mut entries: Vec<_> = read_dir.filter_map(Result::ok).collect();
    entries.sort_unstable_by_key(|entry| entry.file_name());

    entries
        .into_par_iter()
        .map(|entry| {
            let child_path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                return Vec::new();
            };
            if file_type.is_dir() {
                walk_files(&child_path, walk_data)
            } else if is_regular_file(&child_path, &file_type) {
                walk_data.num_files.fetch_add(1, Ordering::Relaxed);
                vec![child_path]
            } else {
                Vec::new()
            }
        })
        .flatten()
        .collect()
}

/// Symlinks count when they point at a regular file.
fn is_regular_file(path: &Path, file_type: &fs::FileType) -> bool {
    file_type.is_file() || (file_type.is_symlink() && path.is_file())
}

/// Walks `path` (the archive root or a subtree of it) and parses every file.
///
/// Parse failures are logged at debug level and counted; they never abort
/// the scan.
pub fn scan_records(layout: &ArchiveLayout, path: &Path) -> (Vec<Record>, ScanReport) {
    let started = Instant::now();
    let walk_data = WalkData::default();
    let files = walk_files(path, &walk_data);

    let parsed: Vec<_> = files
        .par_iter()
        .map(|file| parse_file(layout, file))
        .collect();

    let mut records = Vec::with_capacity(parsed.len());
    let mut failures = 0usize;
    for result in parsed {
        match result {
            Ok(record) => records.push(record),
            Err(failure) => {
                failures += 1;
                log::debug!("skipping archive file: {}", failure);
            }
        }
    }

    let report = ScanReport {
        files: files.len(),
        records: records.len(),
        failures,
    };
    log::debug!(
        "archive walk path={} dirs={} files={} records={} failures={} elapsed_ms={}",
        path.display(),
        walk_data.num_dirs.load(Ordering::Relaxed),
        report.files,
        report.records,
        report.failures,
        started.elapsed().as_millis(),
    );
    (records, report)
}
