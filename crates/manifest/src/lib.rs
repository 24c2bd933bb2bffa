//! Archive manifest library.
//!
//! This crate turns a directory tree of operating-system images into a
//! queryable manifest:
//! - Filename parsing into structured records
//! - A copy-on-write in-memory store fed by a parallel scan
//! - Filesystem watching that keeps the store current
//! - Facet filtering, facet discovery, natural sorting and pagination

pub mod error;
pub mod filter;
pub mod index;
pub mod natural;
pub mod parser;
pub mod query;
pub mod scanner;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export main types
pub use error::{ManifestError, Result};
pub use filter::{available_facet_values, filter, matches, Criteria, Facet, FacetValues};
pub use index::ManifestIndex;
pub use natural::natural_cmp;
pub use parser::{parse_file_name, parse_path, ArchiveLayout, ParseFailure, ParsedName};
pub use query::{count, execute, Page, Sort};
pub use scanner::ScanReport;
pub use store::{ManifestStore, Snapshot, StoreState};
pub use types::{Arch, DiskSize, FloppySize, Record, RecordKey, SortKey};
pub use watcher::WatcherState;
