use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A category of scenery content, stored under its own top-level directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryType {
    Terrain,
    Objects,
    Models,
    Airports,
    Buildings,
    Pylons,
    Roads,
    Details,
    Trees,
    Vpb,
    Navdata,
}

impl DirectoryType {
    pub const ALL: [DirectoryType; 11] = [
        Self::Terrain,
        Self::Objects,
        Self::Models,
        Self::Airports,
        Self::Buildings,
        Self::Pylons,
        Self::Roads,
        Self::Details,
        Self::Trees,
        Self::Vpb,
        Self::Navdata,
    ];

    /// Directory name on the server and on disk.
    pub fn dirname(&self) -> &'static str {
        match self {
            Self::Terrain => "Terrain",
            Self::Objects => "Objects",
            Self::Models => "Models",
            Self::Airports => "Airports",
            Self::Buildings => "Buildings",
            Self::Pylons => "Pylons",
            Self::Roads => "Roads",
            Self::Details => "Details",
            Self::Trees => "Trees",
            Self::Vpb => "vpb",
            Self::Navdata => "NavData",
        }
    }

    /// True if the content is laid out in the 10°/1° tile grid.
    pub fn is_tile(&self) -> bool {
        !matches!(self, Self::Models | Self::Airports | Self::Navdata)
    }

    /// True for the OpenStreetMap-derived layers.
    pub fn is_osm(&self) -> bool {
        matches!(
            self,
            Self::Buildings | Self::Pylons | Self::Roads | Self::Details | Self::Trees
        )
    }

    /// Short label used when listing tile contents.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Terrain => "Terr",
            Self::Objects => "Obj",
            Self::Buildings => "Bui",
            Self::Pylons => "Py",
            Self::Roads => "Rd",
            Self::Details => "Det",
            Self::Trees => "Trs",
            Self::Vpb => "Vpb",
            Self::Models | Self::Airports | Self::Navdata => "",
        }
    }

    /// Parse a directory name as it appears in a root manifest.
    pub fn from_dirname(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.dirname().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for DirectoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dirname())
    }
}

/// The generation of a dataset root, derived from what it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    Ws20,
    Ws30,
    Osm,
    Other,
}

impl RootKind {
    /// Classify a root from the directory types its top-level manifest lists.
    pub fn detect(types: &[DirectoryType]) -> Self {
        if types.contains(&DirectoryType::Vpb) {
            Self::Ws30
        } else if types.contains(&DirectoryType::Pylons) {
            Self::Osm
        } else if types.contains(&DirectoryType::Terrain) {
            Self::Ws20
        } else {
            Self::Other
        }
    }
}

/// An independently versioned dataset with its own mirrors and local tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Name used to look up mirrors, e.g. `ws20`.
    pub name: String,
    /// Local directory the root is materialized into.
    pub local_dir: PathBuf,
    /// Directory types enabled for this root.
    pub directory_types: Vec<DirectoryType>,
}

impl Root {
    pub fn new(
        name: impl Into<String>,
        local_dir: impl Into<PathBuf>,
        directory_types: Vec<DirectoryType>,
    ) -> Self {
        Self {
            name: name.into(),
            local_dir: local_dir.into(),
            directory_types,
        }
    }

    pub fn enables(&self, ty: DirectoryType) -> bool {
        self.directory_types.contains(&ty)
    }

    pub fn kind(&self) -> RootKind {
        RootKind::detect(&self.directory_types)
    }

    /// Enabled types laid out in the tile grid.
    pub fn tile_types(&self) -> impl Iterator<Item = DirectoryType> + '_ {
        self.directory_types.iter().copied().filter(|t| t.is_tile())
    }
}
