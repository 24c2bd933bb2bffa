//! Facet filtering and facet-value discovery.
//!
//! ## Narrowing order
//!
//! Facets are evaluated in a fixed precedence order:
//!
//! ```text
//! variant → name → version → diskSize → floppySize → architecture → tag
//! ```
//!
//! Filtering applies every active facet. Discovery (`available_facet_values`)
//! offers, for each facet, the values found among records that pass the
//! search and every facet *earlier* in the order. The facet's own selection
//! and the facets after it are not applied, so picking a variant narrows the
//! names on offer but picking a name never hides other variants.

use fnv::FnvHashSet;
use serde::Serialize;

use crate::natural::natural_sorted;
use crate::types::{Arch, DiskSize, FloppySize, Record};

/// A filterable record attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Variant,
    Name,
    Version,
    DiskSize,
    FloppySize,
    Architecture,
    Tag,
}

impl Facet {
    /// Narrowing order used by facet discovery.
    pub const PRECEDENCE: [Facet; 7] = [
        Facet::Variant,
        Facet::Name,
        Facet::Version,
        Facet::DiskSize,
        Facet::FloppySize,
        Facet::Architecture,
        Facet::Tag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Variant => "variant",
            Self::Name => "name",
            Self::Version => "version",
            Self::DiskSize => "diskSize",
            Self::FloppySize => "floppySize",
            Self::Architecture => "architecture",
            Self::Tag => "tag",
        }
    }
}

/// Per-facet allow-lists plus an optional free-text search.
///
/// An empty list leaves its facet open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub variants: Vec<String>,
    pub names: Vec<String>,
    pub versions: Vec<String>,
    pub disk_sizes: Vec<String>,
    pub floppy_sizes: Vec<String>,
    pub archs: Vec<String>,
    pub tags: Vec<String>,
    pub search: Option<String>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the allow-list for `facet`.
    pub fn with<I, S>(mut self, facet: Facet, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.allowed_mut(facet) = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn allowed(&self, facet: Facet) -> &[String] {
        match facet {
            Facet::Variant => &self.variants,
            Facet::Name => &self.names,
            Facet::Version => &self.versions,
            Facet::DiskSize => &self.disk_sizes,
            Facet::FloppySize => &self.floppy_sizes,
            Facet::Architecture => &self.archs,
            Facet::Tag => &self.tags,
        }
    }

    fn allowed_mut(&mut self, facet: Facet) -> &mut Vec<String> {
        match facet {
            Facet::Variant => &mut self.variants,
            Facet::Name => &mut self.names,
            Facet::Version => &mut self.versions,
            Facet::DiskSize => &mut self.disk_sizes,
            Facet::FloppySize => &mut self.floppy_sizes,
            Facet::Architecture => &mut self.archs,
            Facet::Tag => &mut self.tags,
        }
    }

    /// The search term, if one that constrains anything was given.
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|term| !term.is_empty())
    }
}

/// Criteria prepared for repeated evaluation.
#[derive(Debug)]
pub struct Matcher<'a> {
    criteria: &'a Criteria,
    search: Option<String>,
}

impl<'a> Matcher<'a> {
    pub fn new(criteria: &'a Criteria) -> Self {
        Self {
            criteria,
            search: criteria.search_term().map(str::to_lowercase),
        }
    }

    /// Whether `record` satisfies `facet`'s allow-list.
    pub fn facet_matches(&self, facet: Facet, record: &Record) -> bool {
        let allowed = self.criteria.allowed(facet);
        if allowed.is_empty() {
            return true;
        }
        let contains = |value: &str| allowed.iter().any(|candidate| candidate == value);
        match facet {
            Facet::Variant => contains(&record.variant),
            Facet::Name => contains(&record.name),
            Facet::Version => contains(&record.version),
            Facet::DiskSize => record.disk_size.is_some_and(|size| contains(size.as_str())),
            Facet::FloppySize => record
                .floppy_size
                .is_some_and(|size| contains(size.as_str())),
            Facet::Architecture => record
                .architectures
                .iter()
                .any(|arch| contains(arch.as_str())),
            Facet::Tag => record.tags.iter().any(|tag| contains(tag)),
        }
    }

    /// Whether the lowercase search term occurs in any of the record's facet values.
    pub fn search_matches(&self, record: &Record) -> bool {
        let Some(term) = self.search.as_deref() else {
            return true;
        };
        let hit = |value: &str| value.to_lowercase().contains(term);
        hit(&record.variant)
            || hit(&record.name)
            || hit(&record.version)
            || record.disk_size.is_some_and(|size| hit(size.as_str()))
            || record.floppy_size.is_some_and(|size| hit(size.as_str()))
            || record.architectures.iter().any(|arch| hit(arch.as_str()))
            || record.tags.iter().any(|tag| hit(tag))
    }

    /// Position in [`Facet::PRECEDENCE`] of the first facet `record` fails,
    /// or `PRECEDENCE.len()` if it passes them all.
    fn first_failing_facet(&self, record: &Record) -> usize {
        Facet::PRECEDENCE
            .iter()
            .position(|facet| !self.facet_matches(*facet, record))
            .unwrap_or(Facet::PRECEDENCE.len())
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.search_matches(record)
            && Facet::PRECEDENCE
                .iter()
                .all(|facet| self.facet_matches(*facet, record))
    }
}

/// Whether `record` satisfies every active constraint in `criteria`.
pub fn matches(record: &Record, criteria: &Criteria) -> bool {
    Matcher::new(criteria).matches(record)
}

/// Lazily yields the records satisfying `criteria`, preserving input order.
pub fn filter<'a, I>(records: I, criteria: &'a Criteria) -> impl Iterator<Item = I::Item> + 'a
where
    I: IntoIterator,
    I::IntoIter: 'a,
    I::Item: AsRef<Record>,
{
    let matcher = Matcher::new(criteria);
    records
        .into_iter()
        .filter(move |record| matcher.matches(record.as_ref()))
}

/// Values still selectable for each facet, naturally sorted and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetValues {
    pub variants: Vec<String>,
    pub names: Vec<String>,
    pub versions: Vec<String>,
    pub disk_sizes: Vec<DiskSize>,
    pub floppy_sizes: Vec<FloppySize>,
    pub archs: Vec<Arch>,
    pub tags: Vec<String>,
}

#[derive(Default)]
struct FacetCollector<'r> {
    variants: FnvHashSet<&'r str>,
    names: FnvHashSet<&'r str>,
    versions: FnvHashSet<&'r str>,
    disk_sizes: FnvHashSet<DiskSize>,
    floppy_sizes: FnvHashSet<FloppySize>,
    archs: FnvHashSet<Arch>,
    tags: FnvHashSet<&'r str>,
}

impl<'r> FacetCollector<'r> {
    fn add(&mut self, facet: Facet, record: &'r Record) {
        match facet {
            Facet::Variant => {
                self.variants.insert(&record.variant);
            }
            Facet::Name => {
                self.names.insert(&record.name);
            }
            Facet::Version => {
                self.versions.insert(&record.version);
            }
            Facet::DiskSize => self.disk_sizes.extend(record.disk_size),
            Facet::FloppySize => self.floppy_sizes.extend(record.floppy_size),
            Facet::Architecture => self.archs.extend(record.architectures.iter().copied()),
            Facet::Tag => self.tags.extend(record.tags.iter().map(String::as_str)),
        }
    }

    fn finish(self) -> FacetValues {
        fn strings(set: FnvHashSet<&str>) -> Vec<String> {
            natural_sorted(set.into_iter().map(str::to_string).collect(), |value| {
                value.as_str()
            })
        }
        FacetValues {
            variants: strings(self.variants),
            names: strings(self.names),
            versions: strings(self.versions),
            disk_sizes: natural_sorted(self.disk_sizes.into_iter().collect(), |size| {
                size.as_str()
            }),
            floppy_sizes: natural_sorted(self.floppy_sizes.into_iter().collect(), |size| {
                size.as_str()
            }),
            archs: natural_sorted(self.archs.into_iter().collect(), |arch| arch.as_str()),
            tags: strings(self.tags),
        }
    }
}

/// Computes the selectable values of every facet in one pass over `records`.
///
/// A record contributes to facet `F` when it passes the search and every
/// facet before `F` in [`Facet::PRECEDENCE`].
pub fn available_facet_values<'r, I>(records: I, criteria: &Criteria) -> FacetValues
where
    I: IntoIterator<Item = &'r Record>,
{
    let matcher = Matcher::new(criteria);
    let mut collector = FacetCollector::default();
    for record in records {
        if !matcher.search_matches(record) {
            continue;
        }
        let reach = matcher
            .first_failing_facet(record)
            .min(Facet::PRECEDENCE.len() - 1);
        for facet in &Facet::PRECEDENCE[..=reach] {
            collector.add(*facet, record);
        }
    }
    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_path, ArchiveLayout};
    use std::path::Path;

    fn record(relative: &str) -> Record {
        let layout = ArchiveLayout::new("/archive", "");
        parse_path(&layout, &Path::new("/archive").join(relative), 0).unwrap()
    }

    fn archive() -> Vec<Record> {
        vec![
            record("os/pc/Linux/Ubuntu_20.04_amd64.iso"),
            record("os/pc/Linux/Ubuntu_22.04_amd64,arm64.iso"),
            record("os/pc/Linux/Fedora_38_x86.iso"),
            record("os/pc/DOS/MS-DOS_6.22_3.5_1.44MB_x86_Disk1.img"),
            record("os/pc/DOS/MS-DOS_5.0_5.25_1.2MB_x86_Disk1.img"),
            record("os/pc/DOS/FreeDOS_1.3_x86_live.iso"),
        ]
    }

    fn names<'a>(records: impl Iterator<Item = &'a Record>) -> Vec<String> {
        records
            .map(|record| format!("{} {}", record.name, record.version))
            .collect()
    }

    #[test]
    fn open_criteria_pass_everything() {
        let records = archive();
        assert_eq!(filter(&records, &Criteria::new()).count(), records.len());
    }

    #[test]
    fn single_valued_facets_use_membership() {
        let records = archive();
        let criteria = Criteria::new().with(Facet::Name, ["Ubuntu", "Fedora"]);
        assert_eq!(
            names(filter(&records, &criteria)),
            vec!["Ubuntu 20.04", "Ubuntu 22.04", "Fedora 38"]
        );
    }

    #[test]
    fn multi_valued_facets_use_overlap() {
        let records = archive();
        let criteria = Criteria::new().with(Facet::Architecture, ["arm64", "sparc"]);
        assert_eq!(names(filter(&records, &criteria)), vec!["Ubuntu 22.04"]);

        let criteria = Criteria::new().with(Facet::Tag, ["live", "nope"]);
        assert_eq!(names(filter(&records, &criteria)), vec!["FreeDOS 1.3"]);
    }

    #[test]
    fn absent_floppy_fields_never_match_a_selection() {
        let records = archive();
        let criteria = Criteria::new().with(Facet::DiskSize, ["3.5"]);
        assert_eq!(names(filter(&records, &criteria)), vec!["MS-DOS 6.22"]);

        let criteria = Criteria::new().with(Facet::FloppySize, ["1.2MB", "720KB"]);
        assert_eq!(names(filter(&records, &criteria)), vec!["MS-DOS 5.0"]);
    }

    #[test]
    fn facets_combine_with_and() {
        let records = archive();
        let criteria = Criteria::new()
            .with(Facet::Variant, ["DOS"])
            .with(Facet::Architecture, ["x86"])
            .with(Facet::Tag, ["Disk1"]);
        assert_eq!(
            names(filter(&records, &criteria)),
            vec!["MS-DOS 6.22", "MS-DOS 5.0"]
        );
    }

    #[test]
    fn search_is_case_insensitive_over_all_facets() {
        let records = archive();
        let hits = |term: &str| names(filter(&records, &Criteria::new().with_search(term)));

        assert_eq!(hits("ubuntu"), vec!["Ubuntu 20.04", "Ubuntu 22.04"]);
        assert_eq!(hits("LINUX").len(), 3);
        assert_eq!(hits("1.44mb"), vec!["MS-DOS 6.22"]);
        assert_eq!(hits("ARM64"), vec!["Ubuntu 22.04"]);
        assert_eq!(hits("LIVE"), vec!["FreeDOS 1.3"]);
        assert_eq!(hits("22.04"), vec!["Ubuntu 22.04"]);
        assert!(hits("iso").is_empty(), "extension is not searched");
        assert_eq!(hits("").len(), records.len());
    }

    #[test]
    fn filter_is_idempotent() {
        let records = archive();
        let criteria = Criteria::new()
            .with(Facet::Architecture, ["x86"])
            .with_search("dos");
        let once: Vec<&Record> = filter(&records, &criteria).collect();
        let twice: Vec<&Record> = filter(once.iter().copied(), &criteria).collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn discovery_without_criteria_lists_everything() {
        let records = archive();
        let values = available_facet_values(&records, &Criteria::new());
        assert_eq!(values.variants, vec!["DOS", "Linux"]);
        assert_eq!(values.names, vec!["Fedora", "FreeDOS", "MS-DOS", "Ubuntu"]);
        assert_eq!(values.versions, vec!["1.3", "5.0", "6.22", "20.04", "22.04", "38"]);
        assert_eq!(
            values.disk_sizes,
            vec![DiskSize::ThreeAndAHalf, DiskSize::FiveAndAQuarter]
        );
        assert_eq!(
            values.floppy_sizes,
            vec![FloppySize::FiveAndAQuarterHd, FloppySize::ThreeAndAHalfHd]
        );
        assert_eq!(values.archs, vec![Arch::Amd64, Arch::Arm64, Arch::X86]);
        assert_eq!(values.tags, vec!["Disk1", "live"]);
    }

    #[test]
    fn earlier_facets_narrow_later_ones() {
        let records = archive();
        let criteria = Criteria::new().with(Facet::Variant, ["DOS"]);
        let values = available_facet_values(&records, &criteria);

        // The variant facet ignores its own selection.
        assert_eq!(values.variants, vec!["DOS", "Linux"]);
        assert_eq!(values.names, vec!["FreeDOS", "MS-DOS"]);
        assert_eq!(values.archs, vec![Arch::X86]);
        assert_eq!(values.tags, vec!["Disk1", "live"]);
    }

    #[test]
    fn later_facets_do_not_narrow_earlier_ones() {
        let records = archive();
        let criteria = Criteria::new()
            .with(Facet::Name, ["Ubuntu"])
            .with(Facet::Architecture, ["arm64"]);
        let values = available_facet_values(&records, &criteria);

        assert_eq!(values.variants, vec!["DOS", "Linux"]);
        assert_eq!(values.names, vec!["Fedora", "FreeDOS", "MS-DOS", "Ubuntu"]);
        assert_eq!(values.versions, vec!["20.04", "22.04"]);
        // Architecture ignores its own selection but honours the name.
        assert_eq!(values.archs, vec![Arch::Amd64, Arch::Arm64]);
        // Tags sit after architecture and see only the arm64 Ubuntu build.
        assert!(values.tags.is_empty());
    }

    #[test]
    fn search_constrains_every_facet() {
        let records = archive();
        let values = available_facet_values(&records, &Criteria::new().with_search("fedora"));
        assert_eq!(values.variants, vec!["Linux"]);
        assert_eq!(values.names, vec!["Fedora"]);
        assert_eq!(values.archs, vec![Arch::X86]);
        assert!(values.disk_sizes.is_empty());
    }

    #[test]
    fn discovered_names_match_records_of_the_selected_variant() {
        let records = archive();
        let criteria = Criteria::new().with(Facet::Variant, ["DOS"]);
        let values = available_facet_values(&records, &criteria);

        let expected = natural_sorted(
            records
                .iter()
                .filter(|record| record.variant == "DOS")
                .map(|record| record.name.clone())
                .collect(),
            |name| name.as_str(),
        );
        assert_eq!(values.names, expected);
    }

    #[test]
    fn facet_values_serialize_as_codes() {
        let records = archive();
        let values = available_facet_values(&records, &Criteria::new());
        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(json["diskSizes"], serde_json::json!(["3.5", "5.25"]));
        assert_eq!(json["archs"], serde_json::json!(["amd64", "arm64", "x86"]));
    }
}
