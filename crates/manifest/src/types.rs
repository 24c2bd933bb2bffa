//! Manifest record types and the controlled vocabularies used in filenames.
//!
//! The HTTP layer serializes these directly, so serde names follow the
//! codes that appear in archive filenames.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Physical diskette form factor, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiskSize {
    #[serde(rename = "3.5")]
    ThreeAndAHalf,
    #[serde(rename = "5.25")]
    FiveAndAQuarter,
}

impl DiskSize {
    pub const ALL: [DiskSize; 2] = [DiskSize::ThreeAndAHalf, DiskSize::FiveAndAQuarter];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeAndAHalf => "3.5",
            Self::FiveAndAQuarter => "5.25",
        }
    }
}

/// Formatted diskette capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FloppySize {
    #[serde(rename = "1.44MB")]
    ThreeAndAHalfHd,
    #[serde(rename = "720KB")]
    ThreeAndAHalfDd,
    #[serde(rename = "1.2MB")]
    FiveAndAQuarterHd,
    #[serde(rename = "360KB")]
    FiveAndAQuarterDd,
}

impl FloppySize {
    pub const ALL: [FloppySize; 4] = [
        FloppySize::ThreeAndAHalfHd,
        FloppySize::ThreeAndAHalfDd,
        FloppySize::FiveAndAQuarterHd,
        FloppySize::FiveAndAQuarterDd,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThreeAndAHalfHd => "1.44MB",
            Self::ThreeAndAHalfDd => "720KB",
            Self::FiveAndAQuarterHd => "1.2MB",
            Self::FiveAndAQuarterDd => "360KB",
        }
    }
}

/// CPU architecture vocabulary accepted in the architecture segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Alpha,
    Arm64,
    Arm64e,
    Arm,
    Armv7,
    Mips,
    Mips64,
    X86,
    Amd64,
    Ppc,
    Ppc64,
    Ppc64le,
    M68k,
    Sparc,
    Ia64,
    Hppa,
    S390,
    S390x,
    Riscv,
    Riscv64,
    Loongarch,
    Loongarch64,
}

impl Arch {
    pub const ALL: [Arch; 22] = [
        Arch::Alpha,
        Arch::Arm64,
        Arch::Arm64e,
        Arch::Arm,
        Arch::Armv7,
        Arch::Mips,
        Arch::Mips64,
        Arch::X86,
        Arch::Amd64,
        Arch::Ppc,
        Arch::Ppc64,
        Arch::Ppc64le,
        Arch::M68k,
        Arch::Sparc,
        Arch::Ia64,
        Arch::Hppa,
        Arch::S390,
        Arch::S390x,
        Arch::Riscv,
        Arch::Riscv64,
        Arch::Loongarch,
        Arch::Loongarch64,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Arm64 => "arm64",
            Self::Arm64e => "arm64e",
            Self::Arm => "arm",
            Self::Armv7 => "armv7",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
            Self::X86 => "x86",
            Self::Amd64 => "amd64",
            Self::Ppc => "ppc",
            Self::Ppc64 => "ppc64",
            Self::Ppc64le => "ppc64le",
            Self::M68k => "m68k",
            Self::Sparc => "sparc",
            Self::Ia64 => "ia64",
            Self::Hppa => "hppa",
            Self::S390 => "s390",
            Self::S390x => "s390x",
            Self::Riscv => "riscv",
            Self::Riscv64 => "riscv64",
            Self::Loongarch => "loongarch",
            Self::Loongarch64 => "loongarch64",
        }
    }
}

/// Error returned when a token is not part of a controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown token: {0}")]
pub struct UnknownToken(pub String);

macro_rules! vocabulary_impls {
    ($ty:ty) => {
        impl FromStr for $ty {
            type Err = UnknownToken;

            fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
                <$ty>::ALL
                    .into_iter()
                    .find(|candidate| candidate.as_str() == raw)
                    .ok_or_else(|| UnknownToken(raw.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary_impls!(DiskSize);
vocabulary_impls!(FloppySize);
vocabulary_impls!(Arch);

/// Identity of a record: its path relative to the archive root, `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self(relative_path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this key names `dir` itself or any path below it.
    pub fn is_within(&self, dir: &RecordKey) -> bool {
        if dir.0.is_empty() {
            return true;
        }
        self.0 == dir.0
            || (self.0.starts_with(dir.0.as_str())
                && self.0.as_bytes().get(dir.0.len()) == Some(&b'/'))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One indexed archive file.
///
/// `disk_size` and `floppy_size` are either both set or both absent, and
/// `architectures` is never empty. Both hold for every record produced by the
/// parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub variant: String,
    pub name: String,
    pub version: String,
    pub disk_size: Option<DiskSize>,
    pub floppy_size: Option<FloppySize>,
    pub architectures: Vec<Arch>,
    pub tags: Vec<String>,
    pub extension: String,
    pub size_bytes: u64,
    pub download_url: String,
    #[serde(skip)]
    pub key: RecordKey,
}

impl Record {
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Renders the canonical filename this record was parsed from.
    pub fn file_name(&self) -> String {
        let mut out = format!("{}_{}", self.name, self.version);
        if let (Some(disk), Some(floppy)) = (self.disk_size, self.floppy_size) {
            out.push('_');
            out.push_str(disk.as_str());
            out.push('_');
            out.push_str(floppy.as_str());
        }
        out.push('_');
        out.push_str(&join_codes(self.architectures.iter().map(|arch| arch.as_str())));
        if !self.tags.is_empty() {
            out.push('_');
            out.push_str(&self.tags.join(","));
        }
        out.push('.');
        out.push_str(&self.extension);
        out
    }

    /// Returns the string form of a field for sorting. Absent values are empty.
    pub fn sort_value(&self, key: SortKey) -> Cow<'_, str> {
        match key {
            SortKey::Variant => Cow::Borrowed(&self.variant),
            SortKey::Name => Cow::Borrowed(&self.name),
            SortKey::Version => Cow::Borrowed(&self.version),
            SortKey::DiskSize => Cow::Borrowed(self.disk_size.map_or("", DiskSize::as_str)),
            SortKey::FloppySize => Cow::Borrowed(self.floppy_size.map_or("", FloppySize::as_str)),
            SortKey::Architectures => {
                Cow::Owned(join_codes(self.architectures.iter().map(|arch| arch.as_str())))
            }
            SortKey::Tags => Cow::Owned(self.tags.join(",")),
            SortKey::Extension => Cow::Borrowed(&self.extension),
            SortKey::SizeBytes => Cow::Owned(self.size_bytes.to_string()),
            SortKey::DownloadUrl => Cow::Borrowed(&self.download_url),
        }
    }
}

impl AsRef<Record> for Record {
    fn as_ref(&self) -> &Record {
        self
    }
}

fn join_codes<'a>(codes: impl Iterator<Item = &'a str>) -> String {
    codes.collect::<Vec<_>>().join(",")
}

/// Record fields that results can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Variant,
    Name,
    Version,
    DiskSize,
    FloppySize,
    Architectures,
    Tags,
    Extension,
    SizeBytes,
    DownloadUrl,
}

impl SortKey {
    /// Resolves a serialized field name. Both the record's own field names and
    /// the short names used by query parameters are accepted.
    pub fn from_field(raw: &str) -> Option<Self> {
        match raw {
            "variant" => Some(Self::Variant),
            "name" => Some(Self::Name),
            "version" => Some(Self::Version),
            "diskSize" | "disketteSize" => Some(Self::DiskSize),
            "floppySize" => Some(Self::FloppySize),
            "architectures" | "arch" => Some(Self::Architectures),
            "tags" => Some(Self::Tags),
            "extension" => Some(Self::Extension),
            "sizeBytes" | "size" => Some(Self::SizeBytes),
            "downloadUrl" | "url" => Some(Self::DownloadUrl),
            _ => None,
        }
    }
}
