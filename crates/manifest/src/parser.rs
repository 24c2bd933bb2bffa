//! Filename parser for archive entries.
//!
//! Archive files follow a fixed naming convention:
//!
//! ```text
//! <name>_<version>[_<disk size>_<floppy size>]_<arch>[,<arch>...][_<tag>[,<tag>...]].<extension>
//! ```
//!
//! e.g. `MS-DOS_6.22_3.5_1.44MB_x86_Disk1.img` or `Ubuntu_22.04_amd64,arm64.iso`.
//! The variant is not part of the filename; it is the directory at a fixed
//! depth below the archive root.
//!
//! Architecture and tag tokens may not contain `.`, and the extension may not
//! contain `_`. A name such as `Foo_1_x86.tar_old` therefore does not match at
//! all, rather than parsing with extension `tar_old`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Arch, DiskSize, FloppySize, Record, RecordKey};

static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<name>[^_]+)
        _(?P<version>[^_]+)
        (?:_(?P<disk>[^_]+)_(?P<floppy>[^_]+))?
        _(?P<arch>[^_.]+(?:,[^_.]+)*)
        (?:_(?P<tags>[^_.]+(?:,[^_.]+)*))?
        \.(?P<extension>[^_]+)$",
    )
    .expect("filename pattern is valid")
});

/// Why a path did not produce a record.
///
/// These are expected outcomes for stray files in the archive; callers log
/// them and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("filename does not match the naming convention: {0}")]
    NoMatch(String),

    #[error("unknown architecture `{0}`")]
    UnknownArch(String),

    #[error("unknown disk size `{0}`")]
    UnknownDiskSize(String),

    #[error("unknown floppy size `{0}`")]
    UnknownFloppySize(String),

    #[error("path is outside the archive root: {0}")]
    OutsideRoot(PathBuf),

    #[error("path has no variant directory at depth {depth}: {path}")]
    TooShallow { path: PathBuf, depth: usize },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(PathBuf),

    #[error("unable to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Structured fields taken from a filename alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub name: String,
    pub version: String,
    pub disk_size: Option<DiskSize>,
    pub floppy_size: Option<FloppySize>,
    pub architectures: Vec<Arch>,
    pub tags: Vec<String>,
    pub extension: String,
}

/// Parses a bare filename (no directories).
pub fn parse_file_name(file_name: &str) -> Result<ParsedName, ParseFailure> {
    let captures = FILENAME_PATTERN
        .captures(file_name)
        .ok_or_else(|| ParseFailure::NoMatch(file_name.to_string()))?;

    let (disk_size, floppy_size) = match (captures.name("disk"), captures.name("floppy")) {
        (Some(disk), Some(floppy)) => {
            let disk = disk
                .as_str()
                .parse::<DiskSize>()
                .map_err(|error| ParseFailure::UnknownDiskSize(error.0))?;
            let floppy = floppy
                .as_str()
                .parse::<FloppySize>()
                .map_err(|error| ParseFailure::UnknownFloppySize(error.0))?;
            (Some(disk), Some(floppy))
        }
        _ => (None, None),
    };

    let mut architectures = Vec::new();
    for token in captures["arch"].split(',') {
        let arch = token
            .parse::<Arch>()
            .map_err(|error| ParseFailure::UnknownArch(error.0))?;
        if !architectures.contains(&arch) {
            architectures.push(arch);
        }
    }

    let mut tags: Vec<String> = Vec::new();
    if let Some(raw) = captures.name("tags") {
        for tag in raw.as_str().split(',') {
            if !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_string());
            }
        }
    }

    Ok(ParsedName {
        name: captures["name"].to_string(),
        version: captures["version"].to_string(),
        disk_size,
        floppy_size,
        architectures,
        tags,
        extension: captures["extension"].to_string(),
    })
}

/// Where the archive lives and how its paths map to records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    /// Archive root directory.
    pub root: PathBuf,
    /// Base URL prefixed to the archive-relative path of each file.
    pub base_url: String,
    /// Zero-based index of the path component (relative to the root) that names the variant.
    pub variant_depth: usize,
}

impl ArchiveLayout {
    pub const DEFAULT_VARIANT_DEPTH: usize = 2;

    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
            variant_depth: Self::DEFAULT_VARIANT_DEPTH,
        }
    }

    pub fn with_variant_depth(mut self, depth: usize) -> Self {
        self.variant_depth = depth;
        self
    }

    /// Splits a path into its UTF-8 components relative to the archive root.
    fn relative_components<'a>(&self, path: &'a Path) -> Result<Vec<&'a str>, ParseFailure> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| ParseFailure::OutsideRoot(path.to_path_buf()))?;
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .map(|part| {
                part.to_str()
                    .ok_or_else(|| ParseFailure::NonUtf8(path.to_path_buf()))
            })
            .collect()
    }

    /// Returns the identity a file or directory at `path` would have.
    pub fn key_for(&self, path: &Path) -> Result<RecordKey, ParseFailure> {
        Ok(RecordKey::new(self.relative_components(path)?.join("/")))
    }

    /// Builds the download URL for an archive-relative key.
    pub fn download_url(&self, key: &RecordKey) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key.as_str())
    }
}

/// Parses a path using a caller-supplied size (e.g. from event metadata).
pub fn parse_path(
    layout: &ArchiveLayout,
    path: &Path,
    size_bytes: u64,
) -> Result<Record, ParseFailure> {
    let components = layout.relative_components(path)?;
    // The variant has to be a directory, so the filename cannot be it.
    if components.len() <= layout.variant_depth + 1 {
        return Err(ParseFailure::TooShallow {
            path: path.to_path_buf(),
            depth: layout.variant_depth,
        });
    }
    let variant = components[layout.variant_depth].to_string();
    let file_name = components[components.len() - 1];
    let parsed = parse_file_name(file_name)?;

    let key = RecordKey::new(components.join("/"));
    Ok(Record {
        variant,
        name: parsed.name,
        version: parsed.version,
        disk_size: parsed.disk_size,
        floppy_size: parsed.floppy_size,
        architectures: parsed.architectures,
        tags: parsed.tags,
        extension: parsed.extension,
        size_bytes,
        download_url: layout.download_url(&key),
        key,
    })
}

/// Parses a path that exists on disk, reading its size from the filesystem.
pub fn parse_file(layout: &ArchiveLayout, path: &Path) -> Result<Record, ParseFailure> {
    let metadata = fs::metadata(path).map_err(|error| ParseFailure::Unreadable {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    parse_path(layout, path, metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn layout() -> ArchiveLayout {
        ArchiveLayout::new("/archive", "https://dl.example.org")
    }

    #[test]
    fn parses_minimal_name() {
        let parsed = parse_file_name("Fedora_38_x86.iso").unwrap();
        assert_eq!(parsed.name, "Fedora");
        assert_eq!(parsed.version, "38");
        assert_eq!(parsed.disk_size, None);
        assert_eq!(parsed.floppy_size, None);
        assert_eq!(parsed.architectures, vec![Arch::X86]);
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.extension, "iso");
    }

    #[test]
    fn parses_dotted_version_and_arch_list() {
        let parsed = parse_file_name("Ubuntu_22.04_amd64,arm64.iso").unwrap();
        assert_eq!(parsed.version, "22.04");
        assert_eq!(parsed.architectures, vec![Arch::Amd64, Arch::Arm64]);
        assert_eq!(parsed.extension, "iso");
    }

    #[test]
    fn parses_floppy_pair_and_tags() {
        let parsed = parse_file_name("MS-DOS_6.22_3.5_1.44MB_x86_Disk1,OEM.img").unwrap();
        assert_eq!(parsed.name, "MS-DOS");
        assert_eq!(parsed.version, "6.22");
        assert_eq!(parsed.disk_size, Some(DiskSize::ThreeAndAHalf));
        assert_eq!(parsed.floppy_size, Some(FloppySize::ThreeAndAHalfHd));
        assert_eq!(parsed.architectures, vec![Arch::X86]);
        assert_eq!(parsed.tags, vec!["Disk1".to_string(), "OEM".to_string()]);
        assert_eq!(parsed.extension, "img");
    }

    #[test]
    fn tags_without_floppy_pair() {
        let parsed = parse_file_name("Debian_12_amd64_netinst.iso").unwrap();
        assert_eq!(parsed.disk_size, None);
        assert_eq!(parsed.architectures, vec![Arch::Amd64]);
        assert_eq!(parsed.tags, vec!["netinst".to_string()]);
    }

    #[test]
    fn compound_extension_is_kept_whole() {
        let parsed = parse_file_name("FreeBSD_14.0_amd64.img.xz").unwrap();
        assert_eq!(parsed.architectures, vec![Arch::Amd64]);
        assert_eq!(parsed.extension, "img.xz");
    }

    #[test]
    fn extension_may_not_contain_underscores() {
        assert!(matches!(
            parse_file_name("Foo_1_x86.foo_tag.iso"),
            Err(ParseFailure::NoMatch(_))
        ));
        assert!(matches!(
            parse_file_name("Foo_1_x86.tar_old"),
            Err(ParseFailure::NoMatch(_))
        ));
    }

    #[test]
    fn duplicate_tokens_collapse() {
        let parsed = parse_file_name("Foo_1_x86,x86,amd64_a,a.iso").unwrap();
        assert_eq!(parsed.architectures, vec![Arch::X86, Arch::Amd64]);
        assert_eq!(parsed.tags, vec!["a".to_string()]);
    }

    #[test]
    fn rejects_structural_mismatches() {
        for name in [
            "readme.txt",
            "Ubuntu_22.04.iso",
            "Ubuntu_22.04_amd64",
            "Ubuntu_22.04_amd64.",
            "download_script.py",
        ] {
            assert!(
                matches!(parse_file_name(name), Err(ParseFailure::NoMatch(_)) | Err(ParseFailure::UnknownArch(_))),
                "{name} should not parse"
            );
        }
    }

    #[test]
    fn rejects_unknown_vocabulary() {
        assert_eq!(
            parse_file_name("Ubuntu_22.04_i386.iso"),
            Err(ParseFailure::UnknownArch("i386".to_string()))
        );
        assert_eq!(
            parse_file_name("Ubuntu_22.04_amd64,sparc32.iso"),
            Err(ParseFailure::UnknownArch("sparc32".to_string()))
        );
        assert_eq!(
            parse_file_name("DOS_5_8_1.44MB_x86.img"),
            Err(ParseFailure::UnknownDiskSize("8".to_string()))
        );
        assert_eq!(
            parse_file_name("DOS_5_3.5_2.88MB_x86.img"),
            Err(ParseFailure::UnknownFloppySize("2.88MB".to_string()))
        );
    }

    #[test]
    fn rendered_name_round_trips() {
        for name in [
            "Fedora_38_x86.iso",
            "Ubuntu_22.04_amd64,arm64.iso",
            "MS-DOS_6.22_3.5_1.44MB_x86_Disk1,OEM.img",
            "Windows_3.11_5.25_1.2MB_x86.img",
            "Debian_12_amd64_netinst.iso",
        ] {
            let record =
                parse_path(&layout(), &Path::new("/archive/os/pc/Linux").join(name), 0).unwrap();
            assert_eq!(record.file_name(), name);
        }
    }

    #[test]
    fn variant_and_url_come_from_the_path() {
        let path = Path::new("/archive/os/pc/Linux/Ubuntu/Ubuntu_20.04_amd64.iso");
        let record = parse_path(&layout(), path, 42).unwrap();
        assert_eq!(record.variant, "Linux");
        assert_eq!(record.size_bytes, 42);
        assert_eq!(
            record.download_url,
            "https://dl.example.org/os/pc/Linux/Ubuntu/Ubuntu_20.04_amd64.iso"
        );
        assert_eq!(
            record.key().as_str(),
            "os/pc/Linux/Ubuntu/Ubuntu_20.04_amd64.iso"
        );
    }

    #[test]
    fn variant_depth_is_configurable() {
        let layout = layout().with_variant_depth(0);
        let record =
            parse_path(&layout, Path::new("/archive/DOS/MS-DOS_6.22_x86.img"), 0).unwrap();
        assert_eq!(record.variant, "DOS");
    }

    #[test]
    fn shallow_and_foreign_paths_fail() {
        assert!(matches!(
            parse_path(&layout(), Path::new("/archive/os/Fedora_38_x86.iso"), 0),
            Err(ParseFailure::TooShallow { depth: 2, .. })
        ));
        assert!(matches!(
            parse_path(&layout(), Path::new("/archive/os/pc/Fedora_38_x86.iso"), 0),
            Err(ParseFailure::TooShallow { .. })
        ));
        assert!(matches!(
            parse_path(&layout(), Path::new("/elsewhere/a/b/c/Fedora_38_x86.iso"), 0),
            Err(ParseFailure::OutsideRoot(_))
        ));
    }

    #[test]
    fn trailing_slash_in_base_url_is_ignored() {
        let layout = ArchiveLayout::new("/archive", "https://dl.example.org/");
        let key = RecordKey::new("a/b/c/x.iso");
        assert_eq!(layout.download_url(&key), "https://dl.example.org/a/b/c/x.iso");
        let bare = ArchiveLayout::new("/archive", "");
        assert_eq!(bare.download_url(&key), "/a/b/c/x.iso");
    }

    #[test]
    fn parse_file_reads_size() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("os/pc/Linux");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Fedora_38_x86.iso");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();

        let layout = ArchiveLayout::new(temp.path(), "");
        let record = parse_file(&layout, &path).unwrap();
        assert_eq!(record.size_bytes, 10);
        assert_eq!(record.variant, "Linux");
    }

    #[test]
    fn parse_file_missing_is_unreadable() {
        let temp = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp.path(), "");
        let path = temp.path().join("os/pc/Linux/Fedora_38_x86.iso");
        assert!(matches!(
            parse_file(&layout, &path),
            Err(ParseFailure::Unreadable { .. })
        ));
    }
}
