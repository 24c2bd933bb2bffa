//! Sorted, paginated listing over filtered records.

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{ManifestError, Result};
use crate::filter::{filter, Criteria};
use crate::natural::natural_cmp;
use crate::types::{Record, SortKey};

/// Ordering requested for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

impl Sort {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            descending: false,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            descending: true,
        }
    }
}

/// A window into a result list: `size` records starting at `size * index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    size: usize,
    index: usize,
}

impl Page {
    pub const DEFAULT_SIZE: usize = 10;
    pub const MAX_SIZE: usize = 100;

    pub fn new(size: usize, index: usize) -> Result<Self> {
        if !(1..=Self::MAX_SIZE).contains(&size) {
            return Err(ManifestError::InvalidInput(format!(
                "page size must be between 1 and {}, got {size}",
                Self::MAX_SIZE
            )));
        }
        Ok(Self { size, index })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn offset(&self) -> usize {
        self.size.saturating_mul(self.index)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            size: Self::DEFAULT_SIZE,
            index: 0,
        }
    }
}

/// Filters, optionally sorts, and slices out one page.
///
/// Sorting is stable in both directions: records whose sort values compare
/// equal keep their store order. A page past the end is empty.
pub fn execute<'r, I>(
    records: I,
    criteria: &Criteria,
    sort: Option<Sort>,
    page: Page,
) -> Vec<Arc<Record>>
where
    I: IntoIterator<Item = &'r Arc<Record>>,
{
    let matching = filter(records, criteria);
    let Some(sort) = sort else {
        return matching
            .skip(page.offset())
            .take(page.size)
            .cloned()
            .collect();
    };

    let mut keyed: Vec<(Cow<'r, str>, &'r Arc<Record>)> = matching
        .map(|record| (record.sort_value(sort.key), record))
        .collect();
    if sort.descending {
        keyed.sort_by(|a, b| natural_cmp(&b.0, &a.0));
    } else {
        keyed.sort_by(|a, b| natural_cmp(&a.0, &b.0));
    }

    keyed
        .into_iter()
        .skip(page.offset())
        .take(page.size)
        .map(|(_, record)| Arc::clone(record))
        .collect()
}

/// Number of records satisfying `criteria`.
pub fn count<I>(records: I, criteria: &Criteria) -> usize
where
    I: IntoIterator,
    I::Item: AsRef<Record>,
{
    filter(records, criteria).count()
}
