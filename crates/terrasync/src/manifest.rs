//! The `.dirindex` manifest every remote directory publishes.
//!
//! One entry per line, `kind:name[:hash[:size]]`, with `kind` one of `d`
//! (directory), `f` (file) or `t` (packed tar archive). Header lines such as
//! `version:1` or `path:Terrain` are ignored.

use std::collections::HashMap;

use crate::directory::DirectoryType;

/// File name of the manifest inside each directory, remote and local.
pub const MANIFEST_FILENAME: &str = ".dirindex";

/// Suffix of packed archives when the parent manifest does not name one.
pub const ARCHIVE_SUFFIX: &str = ".txz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
    Archive,
}

impl EntryKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "d" => Some(Self::Directory),
            "f" => Some(Self::File),
            "t" => Some(Self::Archive),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Directory => "d",
            Self::File => "f",
            Self::Archive => "t",
        }
    }
}

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: EntryKind,
    pub name: String,
    /// Lowercase hex SHA-1; absent for directories in some dataset generations.
    pub hash: Option<String>,
    pub size: Option<u64>,
}

impl ManifestEntry {
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.trim_end_matches('\r').split(':');
        let kind = EntryKind::from_tag(fields.next()?)?;
        let name = fields.next().filter(|n| !n.is_empty())?.to_owned();
        let hash = fields
            .next()
            .filter(|h| !h.is_empty())
            .map(str::to_ascii_lowercase);
        let size = fields.next().and_then(|s| s.parse().ok());
        Some(Self {
            kind,
            name,
            hash,
            size,
        })
    }

    /// Name up to the first `.`; parents describe children by it.
    pub fn basename(&self) -> &str {
        basename(&self.name)
    }
}

/// Strip everything from the first `.` on: `e012n45.txz` → `e012n45`.
pub fn basename(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// A parsed manifest, in the order the server listed its entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn parse(text: &str) -> Self {
        Self {
            entries: text.lines().filter_map(ManifestEntry::parse_line).collect(),
        }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with exactly this name.
    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Declared hash of the entry with exactly this name.
    pub fn hash_of(&self, name: &str) -> Option<&str> {
        self.entry(name).and_then(|e| e.hash.as_deref())
    }

    /// Number of file entries, used as the amount of work a directory adds.
    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .count()
    }

    /// Directory types listed by a root manifest.
    pub fn directory_types(&self) -> Vec<DirectoryType> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .filter_map(|e| DirectoryType::from_dirname(&e.name))
            .collect()
    }

    /// Build the by-basename lookups.
    pub fn lookup(&self) -> ManifestLookup {
        let mut lookup = ManifestLookup::default();
        for entry in &self.entries {
            let base = entry.basename();
            let shadowed = entry.kind == EntryKind::File
                && lookup.kinds.get(base).is_some_and(|k| *k != EntryKind::File);
            if shadowed {
                continue;
            }
            lookup.kinds.insert(base.to_owned(), entry.kind);
            match &entry.hash {
                Some(hash) => lookup.hashes.insert(base.to_owned(), hash.clone()),
                None => lookup.hashes.remove(base),
            };
            lookup.full_names.insert(base.to_owned(), entry.name.clone());
        }
        lookup
    }
}

/// Lookups keyed by basename, for resolving a leaf path against its parent.
///
/// When two entries share a basename, a directory or archive is preferred
/// over a file (`d:e012n45` beats `f:e012n45.stg`); otherwise the later one
/// wins.
#[derive(Debug, Clone, Default)]
pub struct ManifestLookup {
    kinds: HashMap<String, EntryKind>,
    hashes: HashMap<String, String>,
    full_names: HashMap<String, String>,
}

impl ManifestLookup {
    pub fn kind_of(&self, basename: &str) -> Option<EntryKind> {
        self.kinds.get(basename).copied()
    }

    pub fn hash_of(&self, basename: &str) -> Option<&str> {
        self.hashes.get(basename).map(String::as_str)
    }

    pub fn full_name_of(&self, basename: &str) -> Option<&str> {
        self.full_names.get(basename).map(String::as_str)
    }
}

/// Parent directory of a slash-separated remote path; `""` for top-level names.
pub fn parent_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Last component of a slash-separated remote path.
pub fn leaf_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Join remote path segments, skipping empty ones.
pub fn join_remote(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_owned(),
        (_, true) => parent.to_owned(),
        _ => format!("{parent}/{child}"),
    }
}
